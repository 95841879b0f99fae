//! Event join codes: `EVT-` followed by four characters from `A-Z0-9`.

use super::RegistryError;
use anyhow::anyhow;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Mutex;
use tracing::debug;

pub const CODE_PREFIX: &str = "EVT-";
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_SUFFIX_LEN: usize = 4;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 32;

/// Build one candidate code, sampling the suffix uniformly with replacement.
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", CODE_PREFIX, suffix)
}

/// Whether `code` has the shape of a generated event code
pub fn is_well_formed(code: &str) -> bool {
    match code.strip_prefix(CODE_PREFIX) {
        Some(suffix) => {
            suffix.len() == CODE_SUFFIX_LEN
                && suffix
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        }
        None => false,
    }
}

/// Produces unique event codes by rejection sampling with a retry ceiling.
///
/// The random source is injected so tests can seed it or force collisions.
pub struct CodeGenerator {
    rng: Mutex<Box<dyn RngCore + Send>>,
    max_attempts: u32,
}

impl CodeGenerator {
    /// Generator backed by an OS-seeded `StdRng`
    pub fn new(max_attempts: u32) -> Self {
        Self::with_rng(StdRng::from_entropy(), max_attempts)
    }

    pub fn with_rng<R: RngCore + Send + 'static>(rng: R, max_attempts: u32) -> Self {
        Self {
            rng: Mutex::new(Box::new(rng)),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn next_candidate(&self) -> Result<String, RegistryError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| anyhow!("Event code generator mutex poisoned"))?;
        Ok(random_code(&mut *rng))
    }

    /// Offer candidates to `claim` until it accepts one.
    ///
    /// `claim` returns `Ok(Some(_))` once a candidate is taken and `Ok(None)`
    /// when the candidate is already in use. After `max_attempts` rejections
    /// this fails with `RegistryError::CodeSpaceExhausted`.
    pub fn generate<T, F>(&self, mut claim: F) -> Result<T, RegistryError>
    where
        F: FnMut(&str) -> anyhow::Result<Option<T>>,
    {
        for attempt in 1..=self.max_attempts {
            let candidate = self.next_candidate()?;
            if let Some(claimed) = claim(&candidate)? {
                return Ok(claimed);
            }
            debug!(attempt, code = %candidate, "Event code collision, retrying");
        }

        Err(RegistryError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}
