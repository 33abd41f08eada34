//! Build version token
//!
//! Master and slave exchange this token in the handshake and accept each other
//! only on bytewise equality. It is derived once from the crate version and the
//! build timestamp, so two separately built binaries never match by accident.

use once_cell::sync::Lazy;
use std::fmt;

static BUILD_TOKEN: Lazy<VersionToken> = Lazy::new(|| {
    VersionToken(format!(
        "{}-{}+{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("REMOTE_ACTORS_BUILD_TIMESTAMP")
    ))
});

/// Opaque compatibility token compared during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    /// Token identifying this build
    pub fn build() -> Self {
        BUILD_TOKEN.clone()
    }

    /// Explicit token, for deployments that pin compatibility by hand
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytewise comparison against a token received from a peer
    pub fn matches(&self, peer: &str) -> bool {
        self.0.as_bytes() == peer.as_bytes()
    }
}

impl Default for VersionToken {
    fn default() -> Self {
        Self::build()
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
