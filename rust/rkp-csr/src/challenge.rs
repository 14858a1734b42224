//! Challenge generation for certificate requests.
//!
//! The challenge binds a CSR to one provisioning run. It is read from an
//! injected [`EntropySource`] so tests can supply deterministic or failing
//! sources; production code uses [`SystemEntropy`].

use std::io;

use thiserror::Error;
use tracing::{debug, error};

/// Number of random bytes in a challenge.
pub const CHALLENGE_SIZE: usize = 16;

/// A source of cryptographically secure random bytes.
pub trait EntropySource {
    /// Write random bytes into the front of `buf`, returning how many were written.
    ///
    /// May write fewer than `buf.len()` bytes. An error of kind
    /// [`io::ErrorKind::Interrupted`] means the request can be retried.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// The kernel entropy pool via `getrandom(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEntropy;

#[cfg(any(target_os = "linux", target_os = "android"))]
impl EntropySource for SystemEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a valid, writable region of `buf.len()` bytes.
        let ret = unsafe { libc::getrandom(buf.as_mut_ptr().cast(), buf.len(), 0) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl EntropySource for SystemEntropy {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use rand_core::{OsRng, RngCore};

        OsRng
            .try_fill_bytes(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        Ok(buf.len())
    }
}

/// Errors that make it impossible to produce a challenge.
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// The entropy source failed with a non-retryable error.
    #[error("entropy source failed: {0}")]
    Source(#[from] io::Error),
    /// The entropy source reported success without writing anything.
    #[error("entropy source returned no bytes")]
    Exhausted,
}

/// A freshly generated, fully entropy-filled challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge([u8; CHALLENGE_SIZE]);

impl Challenge {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl AsRef<[u8]> for Challenge {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Challenge> for Vec<u8> {
    fn from(challenge: Challenge) -> Self {
        challenge.into_vec()
    }
}

/// Fill a new challenge from `source`.
///
/// Interrupted reads are retried for the unfilled remainder. Any other
/// failure is returned; a partially filled buffer is never handed out.
pub fn generate_challenge<E: EntropySource + ?Sized>(
    source: &mut E,
) -> Result<Challenge, ChallengeError> {
    let mut challenge = [0u8; CHALLENGE_SIZE];
    let mut filled = 0;

    while filled < CHALLENGE_SIZE {
        match source.fill(&mut challenge[filled..]) {
            Ok(0) => {
                error!(filled, "entropy source returned no bytes");
                return Err(ChallengeError::Exhausted);
            }
            Ok(read) => filled += read.min(CHALLENGE_SIZE - filled),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                debug!(filled, "entropy read interrupted, retrying");
            }
            Err(err) => {
                error!(%err, "entropy source failed");
                return Err(ChallengeError::Source(err));
            }
        }
    }

    Ok(Challenge(challenge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted results, writing `0x5A` for successful reads.
    struct ScriptedEntropy {
        script: VecDeque<io::Result<usize>>,
        calls: usize,
    }

    impl ScriptedEntropy {
        fn new(script: Vec<io::Result<usize>>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
            }
        }
    }

    impl EntropySource for ScriptedEntropy {
        fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            let step = self.script.pop_front().unwrap_or(Ok(buf.len()))?;
            let step = step.min(buf.len());
            buf[..step].fill(0x5A);
            Ok(step)
        }
    }

    #[test]
    fn test_system_challenges_differ() {
        let first = generate_challenge(&mut SystemEntropy).unwrap();
        let second = generate_challenge(&mut SystemEntropy).unwrap();

        assert_eq!(first.as_bytes().len(), CHALLENGE_SIZE);
        assert_eq!(second.as_bytes().len(), CHALLENGE_SIZE);
        assert_ne!(first, second, "two challenges should not collide");
        assert!(first.as_bytes().iter().any(|&b| b != 0));
        assert!(second.as_bytes().iter().any(|&b| b != 0));
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        let mut source = ScriptedEntropy::new(vec![
            Err(io::ErrorKind::Interrupted.into()),
            Ok(5),
            Err(io::ErrorKind::Interrupted.into()),
            Ok(11),
        ]);

        let challenge = generate_challenge(&mut source).unwrap();

        assert_eq!(source.calls, 4);
        assert_eq!(challenge.as_bytes(), &[0x5A; CHALLENGE_SIZE]);
    }

    #[test]
    fn test_short_reads_fill_remainder() {
        let mut source = ScriptedEntropy::new(vec![Ok(1), Ok(1), Ok(1)]);
        let challenge = generate_challenge(&mut source).unwrap();

        // Three single-byte reads, then one read for the remaining 13.
        assert_eq!(source.calls, 4);
        assert!(challenge.as_bytes().iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let mut source = ScriptedEntropy::new(vec![
            Ok(4),
            Err(io::ErrorKind::PermissionDenied.into()),
        ]);

        let err = generate_challenge(&mut source).unwrap_err();

        assert!(matches!(err, ChallengeError::Source(e) if e.kind() == io::ErrorKind::PermissionDenied));
        assert_eq!(source.calls, 2);
    }

    #[test]
    fn test_zero_length_read_is_an_error() {
        let mut source = ScriptedEntropy::new(vec![Ok(0)]);
        assert!(matches!(
            generate_challenge(&mut source),
            Err(ChallengeError::Exhausted)
        ));
    }
}
