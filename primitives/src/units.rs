//! Native currency amounts and their human readable forms.
//!
//! All amounts are integers denominated in wei, the smallest
//! indivisible unit of the native currency. Human facing values
//! (CLI flags, log lines) are decimal strings in a larger
//! denomination, like "0.01" ether or "2.5" gwei.

use {
  rust_decimal::Decimal,
  std::str::FromStr,
  thiserror::Error,
};

/// Amount of native currency in wei.
pub type Amount = u128;

pub const GWEI_DECIMALS: u32 = 9;
pub const ETHER_DECIMALS: u32 = 18;

pub const GWEI: Amount = 10u128.pow(GWEI_DECIMALS);
pub const ETHER: Amount = 10u128.pow(ETHER_DECIMALS);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("Empty amount")]
  Empty,

  #[error("Invalid digit in amount '{0}'")]
  InvalidDigit(String),

  #[error("Amount '{0}' has more than {1} fractional digits")]
  TooManyDecimals(String, u32),

  #[error("Amount '{0}' is out of range")]
  Overflow(String),
}

/// Parses a decimal string denominated in a unit with `decimals`
/// fractional digits into wei.
///
/// `parse_units("2.5", GWEI_DECIMALS)` is 2_500_000_000.
pub fn parse_units(value: &str, decimals: u32) -> Result<Amount, Error> {
  let value = value.trim();
  if value.is_empty() || value == "." {
    return Err(Error::Empty);
  }

  let parsed = Decimal::from_str(value)
    .map_err(|_| Error::InvalidDigit(value.into()))?;
  if parsed.is_sign_negative() && !parsed.is_zero() {
    return Err(Error::InvalidDigit(value.into()));
  }

  // trailing zeros carry no precision
  if parsed.normalize().scale() > decimals {
    return Err(Error::TooManyDecimals(value.into(), decimals));
  }

  let overflow = || Error::Overflow(value.into());
  let unit = 10u64
    .checked_pow(decimals)
    .map(Decimal::from)
    .ok_or_else(overflow)?;

  // the scale check above leaves an integral number of wei
  parsed
    .checked_mul(unit)
    .and_then(|wei| u128::try_from(wei.normalize().mantissa()).ok())
    .ok_or_else(overflow)
}

/// Renders wei as a decimal string in a unit with `decimals`
/// fractional digits. Trailing zeros are trimmed but at least
/// one fractional digit is kept, so 76 gwei renders as "76.0".
///
/// Amounts wider than 96 bits fall back to `<wei>e-<decimals>`.
pub fn format_units(amount: Amount, decimals: u32) -> String {
  let value = i128::try_from(amount)
    .ok()
    .and_then(|mantissa| {
      Decimal::try_from_i128_with_scale(mantissa, decimals).ok()
    })
    .map(|value| value.normalize());

  match value {
    Some(value) if value.scale() == 0 => format!("{value}.0"),
    Some(value) => value.to_string(),
    None => format!("{amount}e-{decimals}"),
  }
}

pub fn parse_ether(value: &str) -> Result<Amount, Error> {
  parse_units(value, ETHER_DECIMALS)
}

pub fn parse_gwei(value: &str) -> Result<Amount, Error> {
  parse_units(value, GWEI_DECIMALS)
}

pub fn format_ether(amount: Amount) -> String {
  format_units(amount, ETHER_DECIMALS)
}

pub fn format_gwei(amount: Amount) -> String {
  format_units(amount, GWEI_DECIMALS)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_decimal_strings() -> anyhow::Result<()> {
    assert_eq!(parse_ether("10")?, 10 * ETHER);
    assert_eq!(parse_ether("0.01")?, ETHER / 100);
    assert_eq!(parse_ether("10.01")?, 10 * ETHER + ETHER / 100);
    assert_eq!(parse_ether("0.5")?, ETHER / 2);
    assert_eq!(parse_gwei("2.5")?, 2_500_000_000);
    assert_eq!(parse_gwei("76")?, 76 * GWEI);
    assert_eq!(parse_units("0", 0)?, 0);

    // trailing zeros beyond the unit precision are harmless
    assert_eq!(parse_gwei("1.5000000000")?, 1_500_000_000);
    Ok(())
  }

  #[test]
  fn rejects_malformed_amounts() {
    assert_eq!(parse_ether(""), Err(Error::Empty));
    assert_eq!(parse_ether("."), Err(Error::Empty));
    assert!(matches!(parse_ether("1,5"), Err(Error::InvalidDigit(_))));
    assert!(matches!(parse_ether("-1"), Err(Error::InvalidDigit(_))));
    assert!(matches!(
      parse_gwei("0.0000000001"),
      Err(Error::TooManyDecimals(_, 9))
    ));
    assert!(matches!(
      parse_ether("100000000000"),
      Err(Error::Overflow(_))
    ));
  }

  #[test]
  fn formats_like_it_parses() -> anyhow::Result<()> {
    assert_eq!(format_ether(10 * ETHER), "10.0");
    assert_eq!(format_ether(parse_ether("10.01")?), "10.01");
    assert_eq!(format_ether(1), "0.000000000000000001");
    assert_eq!(format_gwei(parse_gwei("2.5")?), "2.5");
    assert_eq!(format_gwei(0), "0.0");
    assert_eq!(format_ether(u128::MAX), format!("{}e-18", u128::MAX));
    Ok(())
  }
}
