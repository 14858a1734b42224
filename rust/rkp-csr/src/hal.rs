//! Interface to a remotely provisioned component (IRPC).
//!
//! Local equivalents of the IRemotelyProvisionedComponent HAL types. A
//! binder-backed implementation lives outside this crate; in-process code can
//! use [`crate::software::SoftwareComponent`].

use std::fmt;

/// Curve of the endorsement encryption key (EEK) a component accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum EekCurve {
    None = 0,
    P256 = 1,
    Curve25519 = 2,
}

impl TryFrom<i32> for EekCurve {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EekCurve::None),
            1 => Ok(EekCurve::P256),
            2 => Ok(EekCurve::Curve25519),
            other => Err(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HardwareInfo {
    pub version_number: i32,
    pub rpc_author_name: String,
    pub supported_eek_curve: EekCurve,
    pub unique_id: Option<String>,
}

/// Service-specific error codes returned by an IRPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum ErrorCode {
    Failed = 1,
    InvalidMac = 2,
    ProductionKeyInTestRequest = 3,
    TestKeyInProductionRequest = 4,
    InvalidEek = 5,
    Removed = 6,
}

impl TryFrom<i32> for ErrorCode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ErrorCode::Failed),
            2 => Ok(ErrorCode::InvalidMac),
            3 => Ok(ErrorCode::ProductionKeyInTestRequest),
            4 => Ok(ErrorCode::TestKeyInProductionRequest),
            5 => Ok(ErrorCode::InvalidEek),
            6 => Ok(ErrorCode::Removed),
            other => Err(other),
        }
    }
}

/// A non-ok status from an IRPC call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HalStatus {
    service_specific_error: i32,
}

impl HalStatus {
    pub fn new(service_specific_error: i32) -> Self {
        Self {
            service_specific_error,
        }
    }

    pub fn service_specific_error(&self) -> i32 {
        self.service_specific_error
    }

    /// The known error code, if the component returned one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::try_from(self.service_specific_error).ok()
    }
}

impl From<ErrorCode> for HalStatus {
    fn from(code: ErrorCode) -> Self {
        Self::new(code as i32)
    }
}

impl fmt::Display for HalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_code() {
            Some(code) => write!(f, "{} ({:?})", self.service_specific_error, code),
            None => write!(f, "{}", self.service_specific_error),
        }
    }
}

/// A public key MACed by the component, as a COSE_Mac0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacedPublicKey {
    pub maced_key: Vec<u8>,
}

/// CBOR-encoded device info map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_info: Vec<u8>,
}

/// CBOR-encoded, EEK-encrypted protected data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtectedData {
    pub protected_data: Vec<u8>,
}

/// Everything `generateCertificateRequest` hands back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertificateRequestBundle {
    pub device_info: DeviceInfo,
    pub protected_data: ProtectedData,
    pub keys_to_sign_mac: Vec<u8>,
}

pub trait RemotelyProvisionedComponent {
    fn hardware_info(&self) -> Result<HardwareInfo, HalStatus>;

    /// Produce the provisioning bundle for `keys_to_sign`, encrypted to the
    /// leaf of `eek_chain` and bound to `challenge`.
    fn generate_certificate_request(
        &self,
        test_mode: bool,
        keys_to_sign: &[MacedPublicKey],
        eek_chain: &[u8],
        challenge: &[u8],
    ) -> Result<CertificateRequestBundle, HalStatus>;
}

impl<T: RemotelyProvisionedComponent + ?Sized> RemotelyProvisionedComponent for &T {
    fn hardware_info(&self) -> Result<HardwareInfo, HalStatus> {
        (**self).hardware_info()
    }

    fn generate_certificate_request(
        &self,
        test_mode: bool,
        keys_to_sign: &[MacedPublicKey],
        eek_chain: &[u8],
        challenge: &[u8],
    ) -> Result<CertificateRequestBundle, HalStatus> {
        (**self).generate_certificate_request(test_mode, keys_to_sign, eek_chain, challenge)
    }
}
