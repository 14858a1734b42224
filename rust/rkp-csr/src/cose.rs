//! COSE structure helpers for Android Remote Key Provisioning (RKP).
//!
//! Implements the COSE_Mac0 envelope carried in a certificate request and the
//! MAC_structure the component authenticates when it produces the
//! keys-to-sign tag.
//!
//! Based on RFC 9052 (COSE) and the Android RKP CDDL.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::cbor::{self, CborValue};

type HmacSha256 = Hmac<Sha256>;

/// COSE header label for algorithm.
pub const COSE_HEADER_ALG: i64 = 1;

/// COSE algorithm identifier for HMAC-256/256.
pub const COSE_ALG_HMAC_256_256: i64 = 5;

/// Context string of a COSE_Mac0 MAC_structure.
const MAC0_CONTEXT: &str = "MAC0";

/// Errors that can occur during COSE operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoseError {
    /// The HMAC key has an invalid length.
    #[error("invalid HMAC key length")]
    InvalidKeyLength,
}

/// Encode protected headers for COSE_Mac0 (algorithm = HMAC-256/256).
///
/// Returns the serialized header map `{1: 5}`. COSE requires protected
/// headers to travel as a byte string, so callers embed these bytes with
/// [`CborValue::ByteString`] rather than inlining the map.
pub fn encode_protected_headers() -> Vec<u8> {
    let headers = CborValue::Map(vec![(
        CborValue::from_int(COSE_HEADER_ALG),
        CborValue::from_int(COSE_ALG_HMAC_256_256),
    )]);
    cbor::encode(&headers)
}

/// Build the MACed keys-to-sign envelope.
///
/// MacedKeysToSign = [
///   protected,     // bstr .cbor { 1: 5 }
///   unprotected,   // empty map
///   payload,       // nil, the keys are verified out of band
///   tag            // MAC as returned by the component
/// ]
pub fn maced_keys_to_sign(tag: Vec<u8>) -> CborValue {
    CborValue::Array(vec![
        CborValue::ByteString(encode_protected_headers()),
        CborValue::empty_map(),
        CborValue::Null,
        CborValue::ByteString(tag),
    ])
}

/// Build the COSE_Mac0 MAC structure for computing the MAC tag.
///
/// MAC_structure = [
///   "MAC0",           // context
///   protected,        // serialized protected headers
///   external_aad,     // empty byte string
///   payload           // the payload bytes
/// ]
pub fn build_mac_structure(protected_headers: &[u8], payload: &[u8]) -> Vec<u8> {
    let structure = CborValue::Array(vec![
        CborValue::TextString(MAC0_CONTEXT.into()),
        CborValue::ByteString(protected_headers.to_vec()),
        CborValue::ByteString(vec![]), // external_aad
        CborValue::ByteString(payload.to_vec()),
    ]);
    cbor::encode(&structure)
}

/// Compute HMAC-SHA256 over the given data.
pub fn compute_hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CoseError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CoseError::InvalidKeyLength)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Compute the keys-to-sign tag a component returns alongside its bundle.
///
/// The MACed payload is the CBOR array of the COSE_Key public keys being
/// certified, under the HMAC-SHA256 protected header.
pub fn keys_to_sign_tag(hmac_key: &[u8], public_keys: &[CborValue]) -> Result<Vec<u8>, CoseError> {
    let payload = cbor::encode(&CborValue::Array(public_keys.to_vec()));
    let structure = build_mac_structure(&encode_protected_headers(), &payload);
    compute_hmac(hmac_key, &structure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coset::{iana, CborSerializable, CoseMac0, RegisteredLabelWithPrivate};

    #[test]
    fn test_protected_headers_bytes() {
        assert_eq!(encode_protected_headers(), vec![0xA1, 0x01, 0x05]);
    }

    /// The protected header must stay a byte string wrapping an encoded map.
    /// Inlining the map would produce a structurally different envelope.
    #[test]
    fn test_protected_header_is_double_encoded() {
        let envelope = maced_keys_to_sign(vec![0xAA; 32]);
        let items = envelope.as_array().unwrap();

        let protected = items[0].as_bytes().expect("protected header must be a bstr");
        let inner = cbor::decode_exact(protected).unwrap();
        assert_eq!(
            inner,
            CborValue::Map(vec![(CborValue::UnsignedInt(1), CborValue::UnsignedInt(5))])
        );

        let encoded = cbor::encode(&envelope);
        assert_eq!(&encoded[..5], &[0x84, 0x43, 0xA1, 0x01, 0x05]);
    }

    #[test]
    fn test_maced_keys_to_sign_structure() {
        let tag = vec![0x11; 32];
        let envelope = maced_keys_to_sign(tag.clone());
        let items = envelope.as_array().unwrap();

        assert_eq!(items.len(), 4);
        assert_eq!(items[1], CborValue::empty_map());
        assert_eq!(items[2], CborValue::Null);
        assert_eq!(items[3].as_bytes(), Some(tag.as_slice()));
    }

    #[test]
    fn test_envelope_parses_as_cose_mac0() {
        let tag = vec![0x42; 32];
        let encoded = cbor::encode(&maced_keys_to_sign(tag.clone()));

        let mac0 = CoseMac0::from_slice(&encoded).unwrap();

        assert_eq!(
            mac0.protected.header.alg,
            Some(RegisteredLabelWithPrivate::Assigned(
                iana::Algorithm::HMAC_256_256
            ))
        );
        assert_eq!(mac0.protected.original_data, Some(vec![0xA1, 0x01, 0x05]));
        assert!(mac0.unprotected.is_empty());
        assert_eq!(mac0.payload, None);
        assert_eq!(mac0.tag, tag);
    }

    #[test]
    fn test_mac_structure_layout() {
        let structure = build_mac_structure(&encode_protected_headers(), &[0x80]);
        assert_eq!(
            structure,
            vec![0x84, 0x64, b'M', b'A', b'C', b'0', 0x43, 0xA1, 0x01, 0x05, 0x40, 0x41, 0x80]
        );
    }

    #[test]
    fn test_keys_to_sign_tag_is_deterministic() {
        let key = [0xAA; 32];
        let first = keys_to_sign_tag(&key, &[]).unwrap();
        let second = keys_to_sign_tag(&key, &[]).unwrap();

        assert_eq!(first.len(), 32);
        assert_eq!(first, second, "same inputs should produce same output");
        assert_ne!(first, keys_to_sign_tag(&[0xBB; 32], &[]).unwrap());
    }

    #[test]
    fn test_keys_to_sign_tag_covers_keys() {
        let key = [0x01; 32];
        let public_key = CborValue::Map(vec![(CborValue::from_int(1), CborValue::from_int(2))]);

        let empty = keys_to_sign_tag(&key, &[]).unwrap();
        let one = keys_to_sign_tag(&key, &[public_key]).unwrap();
        assert_ne!(empty, one);
    }
}
