use std::fmt::{self, Display};

use sha2::{Digest, Sha256};
use sgpt_model::ModelRequest;

/// The fingerprint of a request.
///
/// Computed from the canonical JSON form of the request, so two requests
/// built independently from the same values share a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key of `req`.
    pub fn of(req: &ModelRequest) -> Result<Self, serde_json::Error> {
        let canonical = serde_json::to_vec(req)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Returns the hex digest.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
