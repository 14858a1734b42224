//! Factory CSR builder for Android Remote Key Provisioning (RKP).
//!
//! Queries a remotely provisioned component for its provisioning bundle,
//! binds it to a fresh challenge and composes the CBOR certificate request
//! the provisioning server expects. Implements the RFC 8949 (CBOR) subset and
//! the COSE_Mac0 envelope required by the RKP certificate request format.

pub mod cbor;
pub mod challenge;
pub mod cose;
pub mod csr;
pub mod eek;
pub mod ffi;
pub mod hal;
pub mod provision;
pub mod software;

pub use challenge::{generate_challenge, Challenge, EntropySource, SystemEntropy, CHALLENGE_SIZE};
pub use csr::{compose_certificate_request, CertificateRequest, ComposeError, ComposeOptions, TrailingBytes};
pub use provision::{get_csr, get_csrs, FatalError, ProvisioningError, ProvisioningOptions};
