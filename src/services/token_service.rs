use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Random bytes per token (256 bits), hex encoded to 64 characters.
pub const TOKEN_BYTES: usize = 32;

/// Cryptographically secure byte source.
pub trait EntropySource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        OsRng.try_fill_bytes(dest)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub acceptance_token: String,
    pub reschedule_token: String,
}

/// Issues the acceptance/reschedule token pair for an interview.
#[derive(Clone)]
pub struct TokenIssuer {
    source: Arc<dyn EntropySource>,
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new(Arc::new(OsEntropy))
    }
}

impl TokenIssuer {
    pub fn new(source: Arc<dyn EntropySource>) -> Self {
        Self { source }
    }

    pub fn issue(&self) -> Result<IssuedTokens> {
        Ok(IssuedTokens {
            acceptance_token: self.token()?,
            reschedule_token: self.token()?,
        })
    }

    fn token(&self) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.source.fill(&mut bytes).map_err(|e| {
            tracing::error!(error = %e, "secure random source unavailable");
            Error::EntropySourceUnavailable(e.to_string())
        })?;
        Ok(hex::encode(bytes))
    }
}

/// Cheap shape check so malformed link values can skip the database lookup.
pub fn looks_like_token(value: &str) -> bool {
    value.len() == TOKEN_BYTES * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct BrokenSource;

    impl EntropySource for BrokenSource {
        fn fill(&self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "getrandom failed",
            )))
        }
    }

    #[test]
    fn ten_thousand_pairs_never_collide() {
        let issuer = TokenIssuer::default();
        let mut seen = HashSet::with_capacity(20_000);
        for _ in 0..10_000 {
            let pair = issuer.issue().unwrap();
            assert_ne!(pair.acceptance_token, pair.reschedule_token);
            assert!(seen.insert(pair.acceptance_token));
            assert!(seen.insert(pair.reschedule_token));
        }
        assert_eq!(seen.len(), 20_000);
    }

    #[test]
    fn tokens_carry_256_bits_as_lowercase_hex() {
        let pair = TokenIssuer::default().issue().unwrap();
        for token in [&pair.acceptance_token, &pair.reschedule_token] {
            assert_eq!(token.len(), 64);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            assert!(looks_like_token(token));
        }
    }

    #[test]
    fn failing_entropy_source_aborts_issuance() {
        let issuer = TokenIssuer::new(Arc::new(BrokenSource));
        let err = issuer.issue().unwrap_err();
        assert!(matches!(err, Error::EntropySourceUnavailable(_)));
    }

    #[test]
    fn shape_check_rejects_malformed_values() {
        assert!(!looks_like_token("short"));
        assert!(!looks_like_token(&"g".repeat(64)));
        assert!(looks_like_token(&"a".repeat(64)));
    }
}
