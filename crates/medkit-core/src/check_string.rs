use std::ops::RangeInclusive;

pub const SESSION_ID_LENGTH: RangeInclusive<usize> = 8..=128;
pub const OPERATION_NAME_LENGTH: RangeInclusive<usize> = 1..=50;

/// Checks that `s` only uses letters, digits, `-` and `_`, with a length in `len`.
///
/// These identifiers end up as keys in tab-scoped storage and in lock tables, so they are kept
/// to a restricted alphabet.
pub fn check_identifier(
    what: &'static str,
    s: &str,
    len: RangeInclusive<usize>,
) -> crate::Result<()> {
    let invalid = |reason| crate::Error::InvalidArgument {
        what,
        value: s.chars().take(*len.end() + 1).collect(),
        reason,
    };
    if s.len() < *len.start() {
        return Err(invalid("too short"));
    }
    if s.len() > *len.end() {
        return Err(invalid("too long"));
    }
    if !s
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(invalid("only letters, digits, '-' and '_' are allowed"));
    }
    Ok(())
}

pub fn check_session_id(s: &str) -> crate::Result<()> {
    check_identifier("session id", s, SESSION_ID_LENGTH)
}

pub fn check_operation_name(s: &str) -> crate::Result<()> {
    check_identifier("operation name", s, OPERATION_NAME_LENGTH)
}
