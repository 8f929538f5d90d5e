//! Fixed-point token amounts.
//!
//! Every amount the client handles (machine prices, balances, allowances,
//! airdrops) is an 18-decimal fixed-point integer on chain. Amounts enter and
//! leave the client as decimal strings, so parsing and rendering are the only
//! places precision can be lost; both are exact here. A decimal string with
//! more fractional digits than the token supports is rejected rather than
//! truncated.

use crate::errors::{MachinaError, MachinaResult};
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Decimals of the payment token and of the native currency.
pub const TOKEN_DECIMALS: usize = 18;

/// Base units in one whole token (10^18).
const UNITS_PER_TOKEN: u128 = 1_000_000_000_000_000_000;

fn units_per_token() -> U256 {
    U256::from(UNITS_PER_TOKEN)
}

/// An 18-decimal token amount stored as its integer base-unit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(U256);

impl TokenAmount {
    /// The zero amount.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Wrap a raw base-unit value as returned by a contract.
    pub const fn from_base_units(units: U256) -> Self {
        Self(units)
    }

    /// A whole number of tokens.
    pub fn from_tokens(tokens: u64) -> Self {
        Self(U256::from(tokens) * units_per_token())
    }

    /// The raw base-unit value passed to contract calls.
    pub const fn base_units(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse a decimal string such as `"0.11"`, `"1"` or `".5"`.
    ///
    /// Rejects signs, exponents, separators, more than [`TOKEN_DECIMALS`]
    /// fractional digits, and values that overflow 256 bits.
    pub fn parse(input: &str) -> MachinaResult<Self> {
        let trimmed = input.trim();
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(MachinaError::invalid_amount(input, "empty amount"));
        }
        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !is_digits(whole) || !is_digits(fraction) {
            return Err(MachinaError::invalid_amount(input, "not a decimal number"));
        }
        if fraction.len() > TOKEN_DECIMALS {
            return Err(MachinaError::invalid_amount(
                input,
                format!("more than {TOKEN_DECIMALS} fractional digits"),
            ));
        }

        let overflow = || MachinaError::invalid_amount(input, "amount exceeds 256 bits");

        let whole_units = if whole.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(whole, 10).map_err(|_| overflow())?
        };
        let padded = format!("{fraction:0<width$}", width = TOKEN_DECIMALS);
        let fraction_units = U256::from_str_radix(&padded, 10).map_err(|_| overflow())?;

        whole_units
            .checked_mul(units_per_token())
            .and_then(|units| units.checked_add(fraction_units))
            .map(Self)
            .ok_or_else(overflow)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl fmt::Display for TokenAmount {
    /// Shortest exact decimal form: `0.11`, `1`, `0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = units_per_token();
        let whole = self.0 / unit;
        let fraction = self.0 % unit;
        if fraction.is_zero() {
            return write!(f, "{whole}");
        }
        let digits = format!("{:0>width$}", fraction.to_string(), width = TOKEN_DECIMALS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for TokenAmount {
    type Err = MachinaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<U256> for TokenAmount {
    fn from(units: U256) -> Self {
        Self(units)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn parses_common_prices() {
        assert_eq!(
            TokenAmount::parse("0.1").unwrap().base_units(),
            U256::from(100_000_000_000_000_000u128)
        );
        assert_eq!(TokenAmount::parse("1").unwrap(), TokenAmount::from_tokens(1));
        assert_eq!(
            TokenAmount::parse(".5").unwrap(),
            TokenAmount::parse("0.5").unwrap()
        );
        assert_eq!(TokenAmount::parse("  2.50 ").unwrap().to_string(), "2.5");
    }

    #[test]
    fn price_plus_buffer_is_exact() {
        let price = TokenAmount::parse("0.1").unwrap();
        let buffer = TokenAmount::parse("0.01").unwrap();
        let total = price.checked_add(buffer).unwrap();
        assert_eq!(total, TokenAmount::parse("0.11").unwrap());
        assert_eq!(total.to_string(), "0.11");
    }

    #[test]
    fn rejects_precision_loss_and_garbage() {
        assert_matches!(
            TokenAmount::parse("0.0000000000000000001"),
            Err(MachinaError::InvalidAmount { .. })
        );
        for bad in ["", ".", "-1", "1e18", "1,5", "0x10", "abc", "1.2.3"] {
            assert!(TokenAmount::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overflow() {
        let huge = "9".repeat(80);
        assert_matches!(
            TokenAmount::parse(&huge),
            Err(MachinaError::InvalidAmount { .. })
        );
    }

    #[test]
    fn renders_smallest_unit() {
        let one_wei = TokenAmount::from_base_units(U256::from(1u8));
        assert_eq!(one_wei.to_string(), "0.000000000000000001");
        assert_eq!(TokenAmount::ZERO.to_string(), "0");
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let amount = TokenAmount::parse("0.25").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"0.25\"");
        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    proptest! {
        #[test]
        fn decimal_round_trip_is_lossless(
            whole in 0u64..1_000_000_000,
            fraction in 0u64..1_000_000_000_000_000_000,
            width in 1usize..=TOKEN_DECIMALS,
        ) {
            let digits = format!("{fraction:018}");
            let text = format!("{whole}.{}", &digits[..width]);
            let amount = TokenAmount::parse(&text).unwrap();
            let rendered = amount.to_string();
            prop_assert_eq!(TokenAmount::parse(&rendered).unwrap(), amount);

            let units = amount.base_units();
            prop_assert_eq!(TokenAmount::from_base_units(units), amount);
        }
    }
}
