use crate::{RecordKey, SystemTimeExt};
use std::{fmt, str::FromStr};
use ulid::Ulid;
use web_time::SystemTime;

macro_rules! ulid_ids {
    ($($type:ident),* $(,)?) => {
        $(
            #[derive(
                Clone,
                Copy,
                Eq,
                Hash,
                Ord,
                PartialEq,
                PartialOrd,
                educe::Educe,
                serde::Deserialize,
                serde::Serialize,
            )]
            #[educe(Debug)]
            pub struct $type(#[educe(Debug(method(std::fmt::Display::fmt)))] pub Ulid);

            impl $type {
                /// Generates a new id whose timestamp part is `at`
                pub fn generate(at: SystemTime) -> Self {
                    Self(crate::ulid_at(at))
                }

                pub fn created_at(&self) -> SystemTime {
                    SystemTime::from_ms_since_posix(self.0.timestamp_ms() as i64)
                        .unwrap_or(SystemTime::UNIX_EPOCH)
                }
            }

            impl fmt::Display for $type {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(f)
                }
            }

            impl FromStr for $type {
                type Err = ulid::DecodeError;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    Ulid::from_string(s).map(Self)
                }
            }

            impl RecordKey for $type {}
        )*
    };
}

ulid_ids!(
    MedicineId,
    BatchId,
    ItemId,
    LocationId,
    MovementId,
    UserId,
    ConnectionId,
    LockId,
);

/// Identifier of a browser tab for pooling and locking purposes
#[derive(
    Clone, Eq, Hash, Ord, PartialEq, PartialOrd, educe::Educe, serde::Deserialize, serde::Serialize,
)]
#[educe(Debug)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(#[educe(Debug(method(fmt::Display::fmt)))] String);

impl SessionId {
    pub fn parse(s: &str) -> crate::Result<SessionId> {
        crate::check_session_id(s)?;
        Ok(SessionId(s.to_string()))
    }

    pub fn generate(at: SystemTime) -> SessionId {
        SessionId(format!("session-{}", crate::ulid_at(at)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The creation time encoded in generated ids, if this id was generated by [`Self::generate`]
    pub fn embedded_time(&self) -> Option<SystemTime> {
        let ulid = Ulid::from_string(self.0.strip_prefix("session-")?).ok()?;
        SystemTime::from_ms_since_posix(ulid.timestamp_ms() as i64).ok()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for SessionId {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<SessionId> {
        crate::check_session_id(&s)?;
        Ok(SessionId(s))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> String {
        id.0
    }
}
