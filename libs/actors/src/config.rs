//! Settings shared by both protocol roles

use crate::version::VersionToken;
use network::TcpLinkConfig;

/// Per-role settings
#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    /// Token sent by masters and required by slaves
    pub version_token: VersionToken,
    /// Timeouts, socket options and frame limits for every link
    pub link: TcpLinkConfig,
}

impl RemoteConfig {
    pub fn with_token(mut self, token: VersionToken) -> Self {
        self.version_token = token;
        self
    }

    pub fn with_link(mut self, link: TcpLinkConfig) -> Self {
        self.link = link;
        self
    }
}
