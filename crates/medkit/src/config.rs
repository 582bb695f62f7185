use medkit_core::ResultExt;
use medkit_pool::{LockConfig, PoolConfig};
use std::{str::FromStr, time::Duration};

/// Application-wide settings, every field of which has a default
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub pool: PoolConfig,
    pub locks: LockConfig,
    /// One of `trace`, `debug`, `info`, `warn` or `error`
    pub log_level: String,
    /// Recorded as `exportedBy` in full backups
    pub exported_by: String,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            pool: PoolConfig::default(),
            locks: LockConfig::default(),
            log_level: String::from("info"),
            exported_by: String::from("medkit"),
        }
    }
}

impl Config {
    /// Parses and validates a settings blob, missing fields keeping their default
    pub fn from_json(json: &str) -> medkit_core::Result<Config> {
        let config = serde_json::from_str::<Config>(json).wrap_context("parsing configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> medkit_core::Result<()> {
        if self.pool.max_connections == 0 {
            return Err(medkit_core::Error::InvalidArgument {
                what: "pool.maxConnections",
                value: String::from("0"),
                reason: "must allow at least one connection",
            });
        }
        check_timeout("pool.connectionTimeout", self.pool.connection_timeout)?;
        check_timeout("pool.openTimeout", self.pool.open_timeout)?;
        check_timeout("locks.lockTimeout", self.locks.lock_timeout)?;
        self.max_level()?;
        Ok(())
    }

    pub fn max_level(&self) -> medkit_core::Result<tracing::Level> {
        tracing::Level::from_str(&self.log_level).map_err(|_| medkit_core::Error::InvalidArgument {
            what: "logLevel",
            value: self.log_level.clone(),
            reason: "not a tracing level",
        })
    }
}

fn check_timeout(what: &'static str, timeout: Duration) -> medkit_core::Result<()> {
    if timeout.is_zero() {
        return Err(medkit_core::Error::InvalidArgument {
            what,
            value: String::from("0"),
            reason: "timeouts must be positive",
        });
    }
    Ok(())
}
