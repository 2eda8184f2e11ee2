use crate::ledger::Error;

/// Shortest accepted cause label, in bytes.
pub const MIN_CAUSE_LEN: usize = 1;

/// Longest accepted cause label, in bytes.
pub const MAX_CAUSE_LEN: usize = 32;

/// Checks that a cause label is between 1 and 32 bytes long.
///
/// Applied to every donation and every balance query, so a cause
/// that could never have been donated to cannot be queried either.
pub fn validate(cause: &str) -> Result<(), Error> {
  if (MIN_CAUSE_LEN..=MAX_CAUSE_LEN).contains(&cause.len()) {
    Ok(())
  } else {
    Err(Error::InvalidCause(cause.len()))
  }
}
