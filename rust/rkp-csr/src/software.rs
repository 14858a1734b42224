//! In-process stand-in for a remotely provisioned component.
//!
//! Produces bundles with the same shape as a real component: a canonical
//! DeviceInfo map, a COSE_Encrypt-shaped ProtectedData and an HMAC-SHA256
//! tag over the keys-to-sign MAC_structure. The protected data is not
//! actually encrypted to the EEK; it only carries a challenge-bound
//! placeholder ciphertext.

use rand_core::{OsRng, RngCore};
use tracing::{debug, warn};

use crate::cbor::{self, CborValue};
use crate::cose;
use crate::hal::{
    CertificateRequestBundle, DeviceInfo, EekCurve, ErrorCode, HalStatus, HardwareInfo,
    MacedPublicKey, ProtectedData, RemotelyProvisionedComponent,
};

/// COSE algorithm identifier for AES-GCM with a 256-bit key.
const COSE_ALG_A256GCM: i64 = 3;
/// COSE algorithm identifier for ECDH-ES + HKDF-256.
const COSE_ALG_ECDH_ES_HKDF_256: i64 = -25;
/// COSE header label for the IV.
const COSE_HEADER_IV: i64 = 5;
/// COSE header label for the key identifier.
const COSE_HEADER_KID: i64 = 4;

const IV_SIZE: usize = 12;

/// Build a DeviceInfo map in canonical key order.
///
/// # Arguments
/// * `brand` - Device brand (e.g., "google").
/// * `manufacturer` - Device manufacturer (e.g., "Google").
/// * `product` - Product name (e.g., "husky").
/// * `model` - Model name (e.g., "Pixel 8 Pro").
/// * `device` - Device codename (e.g., "husky").
pub fn device_info_map(
    brand: &str,
    manufacturer: &str,
    product: &str,
    model: &str,
    device: &str,
) -> CborValue {
    let text = |s: &str| CborValue::TextString(s.into());

    let mut map = CborValue::Map(vec![
        (text("brand"), text(brand)),
        (text("manufacturer"), text(manufacturer)),
        (text("product"), text(product)),
        (text("model"), text(model)),
        (text("device"), text(device)),
        (text("vb_state"), text("green")),
        (text("bootloader_state"), text("locked")),
        (text("vbmeta_digest"), CborValue::ByteString(vec![0; 32])),
        (text("os_version"), text("14")),
        (text("system_patch_level"), CborValue::UnsignedInt(202401)),
        (text("boot_patch_level"), CborValue::UnsignedInt(20240105)),
        (text("vendor_patch_level"), CborValue::UnsignedInt(20240105)),
        (text("version"), CborValue::UnsignedInt(2)),
        (text("security_level"), text("tee")),
        (text("fused"), CborValue::UnsignedInt(0)),
    ]);
    map.canonicalize();
    map
}

/// A software-only [`RemotelyProvisionedComponent`].
#[derive(Debug, Clone)]
pub struct SoftwareComponent {
    hardware_info: HardwareInfo,
    hmac_key: [u8; 32],
    device_info: CborValue,
}

impl SoftwareComponent {
    /// A component with a freshly generated MAC key.
    pub fn new() -> Self {
        let mut hmac_key = [0u8; 32];
        OsRng.fill_bytes(&mut hmac_key);
        Self::with_hmac_key(hmac_key)
    }

    pub fn with_hmac_key(hmac_key: [u8; 32]) -> Self {
        Self {
            hardware_info: HardwareInfo {
                version_number: 2,
                rpc_author_name: "rkp-csr software".into(),
                supported_eek_curve: EekCurve::Curve25519,
                unique_id: None,
            },
            hmac_key,
            device_info: device_info_map("generic", "generic", "generic", "generic", "generic"),
        }
    }

    pub fn with_hardware_info(mut self, hardware_info: HardwareInfo) -> Self {
        self.hardware_info = hardware_info;
        self
    }

    pub fn with_device_info(mut self, device_info: CborValue) -> Self {
        self.device_info = device_info;
        self
    }

    /// The key the keys-to-sign tag is computed with.
    pub fn hmac_key(&self) -> &[u8] {
        &self.hmac_key
    }

    fn hmac(&self, data: &[u8]) -> Result<Vec<u8>, HalStatus> {
        cose::compute_hmac(&self.hmac_key, data).map_err(|_| ErrorCode::Failed.into())
    }

    fn protected_data(&self, eek_chain: &[u8], challenge: &[u8]) -> Result<Vec<u8>, HalStatus> {
        let header = |alg: i64| {
            cbor::encode(&CborValue::Map(vec![(
                CborValue::from_int(cose::COSE_HEADER_ALG),
                CborValue::from_int(alg),
            )]))
        };

        let mut iv = self.hmac(&[b"iv".as_slice(), challenge].concat())?;
        iv.truncate(IV_SIZE);
        let ciphertext = self.hmac(&[b"ciphertext".as_slice(), challenge].concat())?;
        let kid = self.hmac(eek_chain)?;

        let recipient = CborValue::Array(vec![
            CborValue::ByteString(header(COSE_ALG_ECDH_ES_HKDF_256)),
            CborValue::Map(vec![(
                CborValue::from_int(COSE_HEADER_KID),
                CborValue::ByteString(kid),
            )]),
            CborValue::Null,
        ]);

        let cose_encrypt = CborValue::Array(vec![
            CborValue::ByteString(header(COSE_ALG_A256GCM)),
            CborValue::Map(vec![(
                CborValue::from_int(COSE_HEADER_IV),
                CborValue::ByteString(iv),
            )]),
            CborValue::ByteString(ciphertext),
            CborValue::Array(vec![recipient]),
        ]);
        Ok(cbor::encode(&cose_encrypt))
    }
}

impl Default for SoftwareComponent {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the COSE_Key payload out of a MACed public key.
fn maced_key_payload(key: &MacedPublicKey) -> Option<CborValue> {
    let mac0 = cbor::decode_exact(&key.maced_key).ok()?;
    let payload = mac0.as_array()?.get(2)?.as_bytes()?;
    cbor::decode_exact(payload).ok()
}

impl RemotelyProvisionedComponent for SoftwareComponent {
    fn hardware_info(&self) -> Result<HardwareInfo, HalStatus> {
        Ok(self.hardware_info.clone())
    }

    fn generate_certificate_request(
        &self,
        test_mode: bool,
        keys_to_sign: &[MacedPublicKey],
        eek_chain: &[u8],
        challenge: &[u8],
    ) -> Result<CertificateRequestBundle, HalStatus> {
        match cbor::decode_exact(eek_chain) {
            Ok(CborValue::Array(certs)) if !certs.is_empty() => {}
            _ => {
                warn!(len = eek_chain.len(), "rejecting malformed EEK chain");
                return Err(ErrorCode::InvalidEek.into());
            }
        }

        let public_keys = keys_to_sign
            .iter()
            .map(maced_key_payload)
            .collect::<Option<Vec<_>>>()
            .ok_or(HalStatus::from(ErrorCode::Failed))?;

        let keys_to_sign_mac = cose::keys_to_sign_tag(&self.hmac_key, &public_keys)
            .map_err(|_| HalStatus::from(ErrorCode::Failed))?;

        debug!(test_mode, keys = public_keys.len(), "generated software bundle");

        Ok(CertificateRequestBundle {
            device_info: DeviceInfo {
                device_info: cbor::encode(&self.device_info),
            },
            protected_data: ProtectedData {
                protected_data: self.protected_data(eek_chain, challenge)?,
            },
            keys_to_sign_mac,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EEK_CHAIN: &[u8] = &[0x81, 0x40];

    #[test]
    fn test_device_info_map_is_canonical() {
        let info = device_info_map("google", "Google", "husky", "Pixel 8 Pro", "husky");
        let encoded = cbor::encode(&info);

        // map of 15 entries
        assert_eq!(encoded[0], 0xAF);
        // Shorter keys first, ties broken bytewise.
        let keys: Vec<_> = info
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| match k {
                CborValue::TextString(s) => s.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(&keys[..3], &["brand", "fused", "model"]);
        assert_eq!(keys.last().unwrap(), "vendor_patch_level");
    }

    #[test]
    fn test_bundle_decodes() {
        let component = SoftwareComponent::with_hmac_key([0x07; 32]);
        let bundle = component
            .generate_certificate_request(false, &[], EEK_CHAIN, &[0x01; 16])
            .unwrap();

        assert!(cbor::decode_exact(&bundle.device_info.device_info).is_ok());
        let protected = cbor::decode_exact(&bundle.protected_data.protected_data).unwrap();
        assert_eq!(protected.as_array().unwrap().len(), 4);
        assert_eq!(bundle.keys_to_sign_mac.len(), 32);
    }

    #[test]
    fn test_tag_covers_empty_key_list() {
        let component = SoftwareComponent::with_hmac_key([0x07; 32]);
        let bundle = component
            .generate_certificate_request(false, &[], EEK_CHAIN, &[0x01; 16])
            .unwrap();

        let structure = cose::build_mac_structure(&cose::encode_protected_headers(), &[0x80]);
        let expected = cose::compute_hmac(component.hmac_key(), &structure).unwrap();
        assert_eq!(bundle.keys_to_sign_mac, expected);
    }

    #[test]
    fn test_protected_data_bound_to_challenge() {
        let component = SoftwareComponent::with_hmac_key([0x07; 32]);
        let a = component
            .generate_certificate_request(false, &[], EEK_CHAIN, &[0x01; 16])
            .unwrap();
        let b = component
            .generate_certificate_request(false, &[], EEK_CHAIN, &[0x02; 16])
            .unwrap();
        assert_ne!(a.protected_data, b.protected_data);
        assert_eq!(a.keys_to_sign_mac, b.keys_to_sign_mac);
    }

    #[test]
    fn test_maced_keys_are_included_in_tag() {
        let component = SoftwareComponent::with_hmac_key([0x07; 32]);
        let cose_key = CborValue::Map(vec![(CborValue::from_int(1), CborValue::from_int(2))]);
        let maced_key = MacedPublicKey {
            maced_key: cbor::encode(&CborValue::Array(vec![
                CborValue::ByteString(cose::encode_protected_headers()),
                CborValue::empty_map(),
                CborValue::ByteString(cbor::encode(&cose_key)),
                CborValue::ByteString(vec![0; 32]),
            ])),
        };

        let bundle = component
            .generate_certificate_request(false, &[maced_key], EEK_CHAIN, &[0x01; 16])
            .unwrap();

        let expected = cose::keys_to_sign_tag(component.hmac_key(), &[cose_key]).unwrap();
        assert_eq!(bundle.keys_to_sign_mac, expected);
    }

    #[test]
    fn test_malformed_inputs_are_rejected() {
        let component = SoftwareComponent::with_hmac_key([0x07; 32]);

        let err = component
            .generate_certificate_request(false, &[], &[0xFF], &[0x01; 16])
            .unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidEek));

        let bad_key = MacedPublicKey {
            maced_key: vec![0x84],
        };
        let err = component
            .generate_certificate_request(false, &[bad_key], EEK_CHAIN, &[0x01; 16])
            .unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::Failed));
    }
}
