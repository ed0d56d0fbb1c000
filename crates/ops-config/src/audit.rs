//! Audit feed configuration.

use serde::{Deserialize, Serialize};

/// Default result limit for audit feeds.
const fn default_feed_limit() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Default number of entries returned by history and feed queries when
    /// the caller does not supply a count.
    #[serde(default = "default_feed_limit")]
    pub default_feed_limit: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            default_feed_limit: default_feed_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = AuditConfig::default();
        assert_eq!(config.default_feed_limit, 10);
    }
}
