use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::time::Duration;
use ulid::Ulid;
use web_time::SystemTime;

pub trait SystemTimeExt: Sized {
    fn ms_since_posix(&self) -> crate::Result<i64>;

    fn from_ms_since_posix(ms: i64) -> crate::Result<Self>;

    /// The UTC calendar day this instant falls on
    fn utc_date(&self) -> crate::Result<NaiveDate> {
        Ok(self.utc_datetime()?.date_naive())
    }

    fn utc_datetime(&self) -> crate::Result<DateTime<Utc>>;

    fn to_rfc3339(&self) -> crate::Result<String> {
        Ok(self
            .utc_datetime()?
            .to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl SystemTimeExt for SystemTime {
    fn ms_since_posix(&self) -> crate::Result<i64> {
        self.duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|_| {
                crate::Error::Other(anyhow!("Failed computing duration since unix epoch"))
            })?
            .as_millis()
            .try_into()
            .map_err(|_| {
                crate::Error::Other(anyhow!(
                    "Failed converting duration into reasonably-bound milliseconds"
                ))
            })
    }

    fn from_ms_since_posix(ms: i64) -> crate::Result<SystemTime> {
        let ms = u64::try_from(ms).map_err(|_| {
            crate::Error::Other(anyhow!(
                "Cannot convert negative milliseconds into SystemTime"
            ))
        })?;
        Ok(SystemTime::UNIX_EPOCH + Duration::from_millis(ms))
    }

    fn utc_datetime(&self) -> crate::Result<DateTime<Utc>> {
        let ms = self.ms_since_posix()?;
        DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
            crate::Error::Other(anyhow!("{ms}ms since epoch is out of the calendar range"))
        })
    }
}

/// Builds a ULID with the timestamp part set to `at`
///
/// Goes through milliseconds rather than `Ulid::new()`, which would read the wall clock and is
/// not available on wasm32.
pub fn ulid_at(at: SystemTime) -> Ulid {
    let ms = at
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let at = std::time::SystemTime::UNIX_EPOCH + Duration::from_millis(ms);
    Ulid::from_datetime(at)
}

/// Age of `since` at `now`, with clocks going backwards counted as zero
pub fn elapsed_between(since: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or_default()
}
