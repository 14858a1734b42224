//! Drives a remotely provisioned component from hardware query to finished CSR.
//!
//! Failures talking to the component, looking up the EEK chain or reading
//! entropy are [`FatalError`]s: no usable CSR can come out of the
//! environment, and the caller is expected to stop. A bundle that arrives but
//! does not decode is a recoverable [`ProvisioningError::Compose`], so runs
//! over several components can skip the bad one and continue.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::challenge::{self, ChallengeError, EntropySource};
use crate::csr::{self, CertificateRequest, ComposeError, ComposeOptions};
use crate::eek::EekChainProvider;
use crate::hal::{EekCurve, HalStatus, RemotelyProvisionedComponent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisioningOptions {
    /// Ask the component for a test-mode bundle.
    pub test_mode: bool,
    pub compose: ComposeOptions,
}

/// The environment cannot produce a CSR at all.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to get hardware info for '{component}'. Error code: {status}")]
    HardwareInfo { component: String, status: HalStatus },
    #[error("no EEK chain for curve {curve:?} supported by '{component}'")]
    EekChainUnavailable { component: String, curve: EekCurve },
    #[error("failed to generate challenge: {0}")]
    Entropy(#[from] ChallengeError),
    #[error("bundle extraction failed for '{component}'. Error code: {status}")]
    BundleExtraction { component: String, status: HalStatus },
    #[error("error getting base64 length for {len} bytes. Size overflow?")]
    Base64Overflow { len: usize },
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error(transparent)]
    Fatal(#[from] FatalError),
    #[error("malformed bundle from '{component}': {source}")]
    Compose {
        component: String,
        #[source]
        source: ComposeError,
    },
}

impl ProvisioningError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProvisioningError::Fatal(_))
    }
}

/// Request a bundle from `component` and compose it into a CSR.
pub fn get_csr<C, P, E>(
    component_name: &str,
    component: &C,
    eek_chains: &P,
    entropy: &mut E,
    options: &ProvisioningOptions,
) -> Result<CertificateRequest, ProvisioningError>
where
    C: RemotelyProvisionedComponent + ?Sized,
    P: EekChainProvider + ?Sized,
    E: EntropySource + ?Sized,
{
    let hw_info = component.hardware_info().map_err(|status| {
        error!(component = component_name, %status, "failed to get hardware info");
        FatalError::HardwareInfo {
            component: component_name.to_owned(),
            status,
        }
    })?;
    info!(
        component = component_name,
        author = %hw_info.rpc_author_name,
        version = hw_info.version_number,
        curve = ?hw_info.supported_eek_curve,
        "got hardware info"
    );

    let curve = hw_info.supported_eek_curve;
    let eek_chain = eek_chains.eek_chain(curve).ok_or_else(|| {
        error!(component = component_name, ?curve, "no EEK chain for curve");
        FatalError::EekChainUnavailable {
            component: component_name.to_owned(),
            curve,
        }
    })?;

    let challenge = challenge::generate_challenge(entropy).map_err(FatalError::from)?;

    let bundle = component
        .generate_certificate_request(options.test_mode, &[], eek_chain, challenge.as_bytes())
        .map_err(|status| {
            error!(component = component_name, %status, "bundle extraction failed");
            FatalError::BundleExtraction {
                component: component_name.to_owned(),
                status,
            }
        })?;

    csr::compose_certificate_request(
        &bundle.protected_data.protected_data,
        &bundle.device_info.device_info,
        challenge.into_vec(),
        bundle.keys_to_sign_mac,
        &options.compose,
    )
    .map_err(|source| ProvisioningError::Compose {
        component: component_name.to_owned(),
        source,
    })
}

/// Outcome for one component of a multi-component run.
#[derive(Debug)]
pub struct ComponentCsr {
    pub component: String,
    pub result: Result<CertificateRequest, ComposeError>,
}

/// Produce a CSR for each named component, in order.
///
/// A malformed bundle is recorded and the run continues with the next
/// component. The first fatal error ends the run.
pub fn get_csrs<'a, I, C, P, E>(
    components: I,
    eek_chains: &P,
    entropy: &mut E,
    options: &ProvisioningOptions,
) -> Result<Vec<ComponentCsr>, FatalError>
where
    I: IntoIterator<Item = (&'a str, C)>,
    C: RemotelyProvisionedComponent,
    P: EekChainProvider + ?Sized,
    E: EntropySource + ?Sized,
{
    let mut csrs = Vec::new();
    for (name, component) in components {
        let result = match get_csr(name, &component, eek_chains, entropy, options) {
            Ok(csr) => Ok(csr),
            Err(ProvisioningError::Compose { component, source }) => {
                warn!(%component, err = %source, "skipping component with malformed bundle");
                Err(source)
            }
            Err(ProvisioningError::Fatal(err)) => return Err(err),
        };
        csrs.push(ComponentCsr {
            component: name.to_owned(),
            result,
        });
    }
    Ok(csrs)
}

/// Length of the padded base64 text for `len` input bytes.
fn base64_len(len: usize) -> Result<usize, FatalError> {
    base64::encoded_len(len, true).ok_or(FatalError::Base64Overflow { len })
}

/// Base64-encode a serialized CSR for logs and text transports.
pub fn to_base64(bytes: &[u8]) -> Result<String, FatalError> {
    let mut text = String::with_capacity(base64_len(bytes.len())?);
    STANDARD.encode_string(bytes, &mut text);
    Ok(text)
}
