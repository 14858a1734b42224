//! Endorsement encryption key (EEK) chain lookup.

use crate::hal::EekCurve;

/// Supplies the fixed EEK certificate chain for a curve.
pub trait EekChainProvider {
    /// The CBOR-encoded EEK chain for `curve`, or `None` if none is known.
    fn eek_chain(&self, curve: EekCurve) -> Option<&[u8]>;
}

/// An offline table of EEK chains, one per supported curve.
#[derive(Debug, Clone, Default)]
pub struct StaticEekChains {
    p256: Option<Vec<u8>>,
    curve25519: Option<Vec<u8>>,
}

impl StaticEekChains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, curve: EekCurve, chain: Vec<u8>) -> Self {
        match curve {
            EekCurve::P256 => self.p256 = Some(chain),
            EekCurve::Curve25519 => self.curve25519 = Some(chain),
            EekCurve::None => {}
        }
        self
    }
}

impl EekChainProvider for StaticEekChains {
    fn eek_chain(&self, curve: EekCurve) -> Option<&[u8]> {
        match curve {
            EekCurve::P256 => self.p256.as_deref(),
            EekCurve::Curve25519 => self.curve25519.as_deref(),
            EekCurve::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_curve() {
        let chains = StaticEekChains::new()
            .with_chain(EekCurve::P256, vec![0x82, 0x01])
            .with_chain(EekCurve::Curve25519, vec![0x82, 0x02]);

        assert_eq!(chains.eek_chain(EekCurve::P256), Some(&[0x82, 0x01][..]));
        assert_eq!(chains.eek_chain(EekCurve::Curve25519), Some(&[0x82, 0x02][..]));
        assert_eq!(chains.eek_chain(EekCurve::None), None);
    }

    #[test]
    fn test_missing_chain() {
        let chains = StaticEekChains::new().with_chain(EekCurve::P256, vec![0x80]);
        assert_eq!(chains.eek_chain(EekCurve::Curve25519), None);
    }
}
