use std::time::Duration;

/// Maximum number of tabs holding a connection at the same time
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
/// Idle time after which a connection is considered expired
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Time given to the store to open before giving up
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
/// Time after which a lock is considered abandoned
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PoolConfig {
    pub max_connections: usize,
    #[serde(with = "duration_ms")]
    pub connection_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub open_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> PoolConfig {
        PoolConfig {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LockConfig {
    #[serde(with = "duration_ms")]
    pub lock_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> LockConfig {
        LockConfig {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// (De)serializes a [`Duration`] as a whole number of milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let c: PoolConfig = serde_json::from_str(r#"{"maxConnections": 3}"#).unwrap();
        assert_eq!(c.max_connections, 3);
        assert_eq!(c.connection_timeout, DEFAULT_CONNECTION_TIMEOUT);
        assert_eq!(c.open_timeout, Duration::from_secs(10));

        let c: LockConfig = serde_json::from_str(r#"{"lockTimeout": 1500}"#).unwrap();
        assert_eq!(c.lock_timeout, Duration::from_millis(1500));
        assert_eq!(
            serde_json::to_value(LockConfig::default()).unwrap(),
            serde_json::json!({ "lockTimeout": 300_000 })
        );
    }
}
