//! Certificate request composition.
//!
//! Combines the device info and protected data produced by a component with
//! the challenge and keys-to-sign MAC into the CBOR document submitted to
//! the provisioning server:
//!
//! ```text
//! CertificateRequest = [
//!   DeviceInfo,        // [ parsed device info, {} ]
//!   challenge,         // bstr
//!   ProtectedData,     // parsed protected data
//!   MacedKeysToSign,   // [ bstr .cbor {1: 5}, {}, nil, bstr tag ]
//! ]
//! ```
//!
//! The server indexes these elements positionally.

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::cbor::{self, CborError, CborValue};
use crate::cose;

/// What to do with bytes left over after a blob's top-level CBOR item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrailingBytes {
    /// Treat leftover bytes as a malformed blob.
    #[default]
    Reject,
    /// Drop leftover bytes and log a warning.
    Ignore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeOptions {
    pub trailing_bytes: TrailingBytes,
}

/// A component produced a blob that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("error parsing device info: {0}")]
    DeviceInfo(#[source] CborError),
    #[error("error parsing protected data: {0}")]
    ProtectedData(#[source] CborError),
}

/// A composed certificate request, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest(CborValue);

impl CertificateRequest {
    pub fn value(&self) -> &CborValue {
        &self.0
    }

    pub fn into_value(self) -> CborValue {
        self.0
    }

    /// Serialize the request to CBOR.
    pub fn to_bytes(&self) -> Vec<u8> {
        cbor::encode(&self.0)
    }
}

/// Decode a component-supplied blob under the trailing-bytes policy.
fn parse_blob(what: &str, blob: &[u8], options: &ComposeOptions) -> Result<CborValue, CborError> {
    let (value, remaining) = cbor::decode(blob)?;
    if remaining > 0 {
        match options.trailing_bytes {
            TrailingBytes::Reject => return Err(CborError::TrailingBytes { remaining }),
            TrailingBytes::Ignore => warn!(what, remaining, "ignoring trailing bytes"),
        }
    }
    Ok(value)
}

/// Compose a certificate request from a component's bundle.
///
/// Both blobs must decode before anything is assembled. The device info is
/// checked first and its error wins if both are malformed.
pub fn compose_certificate_request(
    protected_data: &[u8],
    device_info: &[u8],
    challenge: Vec<u8>,
    keys_to_sign_mac: Vec<u8>,
    options: &ComposeOptions,
) -> Result<CertificateRequest, ComposeError> {
    let parsed_device_info = parse_blob("device info", device_info, options).map_err(|err| {
        error!(%err, "error parsing device info");
        ComposeError::DeviceInfo(err)
    })?;

    let parsed_protected_data =
        parse_blob("protected data", protected_data, options).map_err(|err| {
            error!(%err, "error parsing protected data");
            ComposeError::ProtectedData(err)
        })?;

    let maced_keys_to_sign = cose::maced_keys_to_sign(keys_to_sign_mac);

    // The second element is reserved for unverified device info.
    let device_info = CborValue::Array(vec![parsed_device_info, CborValue::empty_map()]);

    debug!(
        challenge_len = challenge.len(),
        protected_data_len = protected_data.len(),
        "composed certificate request"
    );

    Ok(CertificateRequest(CborValue::Array(vec![
        device_info,
        CborValue::ByteString(challenge),
        parsed_protected_data,
        maced_keys_to_sign,
    ])))
}
