//! Connection and session configuration.

use std::time::Duration;

use smart_default::SmartDefault;

use crate::constant::HANDSHAKE_VERSION_COUNT;

/// Authentication credentials sent in INIT's auth token map. `Basic` covers
/// the common username/password scheme; `None` sends an empty auth map.
#[derive(Debug, Clone, SmartDefault)]
pub enum Auth {
    #[default]
    None,
    Basic { principal: String, credentials: String },
}

#[derive(Debug, Clone, SmartDefault)]
pub struct ConnectOpts {
    /// Version proposals sent during the handshake, highest preference
    /// first. Unused slots should be zero.
    #[default([1, 0, 0, 0])]
    pub preferred_versions: [u32; HANDSHAKE_VERSION_COUNT],

    #[default(Duration::from_secs(10))]
    pub connect_timeout: Duration,

    pub read_timeout: Option<Duration>,

    #[default(1024)]
    pub snd_min_chunk: u16,

    #[default(16 * 1024)]
    pub snd_max_chunk: u16,

    #[default = "bolt-client/0.1"]
    pub user_agent: String,

    pub auth: Auth,
}

impl ConnectOpts {
    pub fn with_basic_auth(mut self, principal: impl Into<String>, credentials: impl Into<String>) -> Self {
        self.auth = Auth::Basic {
            principal: principal.into(),
            credentials: credentials.into(),
        };
        self
    }
}
