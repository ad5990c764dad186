//! Mount-time parameters for the data path.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tetherfs_proto::TransportLimits;

fn default_cache_enabled() -> bool {
    true
}

fn default_attr_ttl() -> Duration {
    Duration::from_secs(1)
}

/// Negotiated and configured parameters fixed for a mount's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountParams {
    /// Per-exchange limits announced by the remote service.
    pub limits: TransportLimits,
    /// Mount-wide caching switch. Individual nodes can still opt out.
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    /// How long an installed attribute snapshot stays fresh.
    #[serde(default = "default_attr_ttl", with = "humantime_serde")]
    pub attr_ttl: Duration,
}

impl MountParams {
    /// Parameters with defaults for everything but the limits.
    pub fn new(limits: TransportLimits) -> Self {
        Self {
            limits,
            cache_enabled: default_cache_enabled(),
            attr_ttl: default_attr_ttl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_fields_are_omitted() {
        let params: MountParams = serde_json::from_str(
            r#"{"limits": {"max_read": 65536, "max_write": 65536, "io_size": 4096}}"#,
        )
        .unwrap();
        assert!(params.cache_enabled);
        assert_eq!(params.attr_ttl, Duration::from_secs(1));
    }

    #[test]
    fn test_human_readable_ttl() {
        let params: MountParams = serde_json::from_str(
            r#"{
                "limits": {"max_read": 65536, "max_write": 65536, "io_size": 4096},
                "cache_enabled": false,
                "attr_ttl": "30s"
            }"#,
        )
        .unwrap();
        assert!(!params.cache_enabled);
        assert_eq!(params.attr_ttl, Duration::from_secs(30));
    }
}
