//! Machine identifiers and the registry's machine record.

use crate::amount::TokenAmount;
use crate::errors::{MachinaError, MachinaResult};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do with a machine id that contains no usable digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFallback {
    /// Reject the id with [`MachinaError::InvalidMachineId`].
    #[default]
    Strict,
    /// Address machine `1`, matching ids already used against deployed
    /// registries. A wrong id addresses the wrong machine, so every use is
    /// logged.
    Legacy,
}

/// On-chain registry index of a machine (`uint256` in the contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MachineIndex(U256);

impl MachineIndex {
    /// Index used by the legacy fallback.
    pub const LEGACY_DEFAULT: u64 = 1;

    pub fn new(index: impl Into<U256>) -> Self {
        Self(index.into())
    }

    pub const fn as_u256(&self) -> U256 {
        self.0
    }

    /// Derive the registry index from an app-level machine id.
    ///
    /// Ids of the form `<prefix>-<digits>` (`"robo-cafe-001"`, `"machine-42"`)
    /// use the trailing digit run; otherwise the whole string is parsed as an
    /// integer; otherwise `policy` decides.
    pub fn parse(id: &str, policy: IdFallback) -> MachinaResult<Self> {
        let trimmed = id.trim();
        let digits_start = trimmed
            .bytes()
            .rposition(|b| !b.is_ascii_digit())
            .map_or(0, |pos| pos + 1);
        let trailing = &trimmed[digits_start..];

        if !trailing.is_empty() {
            if let Ok(value) = U256::from_str_radix(trailing, 10) {
                return Ok(Self(value));
            }
        }
        if !trimmed.is_empty() {
            if let Ok(value) = U256::from_str_radix(trimmed, 10) {
                return Ok(Self(value));
            }
        }

        match policy {
            IdFallback::Strict => Err(MachinaError::InvalidMachineId {
                input: id.to_string(),
            }),
            IdFallback::Legacy => {
                tracing::warn!(
                    machine_id = id,
                    fallback = Self::LEGACY_DEFAULT,
                    "machine id has no numeric part, using legacy fallback index"
                );
                Ok(Self(U256::from(Self::LEGACY_DEFAULT)))
            }
        }
    }

    /// [`MachineIndex::parse`] with the [`IdFallback::Legacy`] policy.
    pub fn from_legacy_id(id: &str) -> Self {
        Self::parse(id, IdFallback::Legacy).unwrap_or(Self(U256::from(Self::LEGACY_DEFAULT)))
    }
}

impl fmt::Display for MachineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MachineIndex {
    fn from(index: u64) -> Self {
        Self(U256::from(index))
    }
}

/// A machine as registered in the `MachineManager` contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub index: MachineIndex,
    pub name: String,
    /// Address of the controller device.
    pub machine_addr: Address,
    pub price: TokenAmount,
    pub platform_fee_bps: u16,
    /// Liveness flag kept by the registry.
    pub exists: bool,
}

impl Machine {
    /// Safe stand-in for an entry that could not be read, so listings still
    /// render the remaining machines.
    pub fn placeholder(index: MachineIndex) -> Self {
        Self {
            index,
            name: format!("Machine {index}"),
            machine_addr: Address::ZERO,
            price: TokenAmount::ZERO,
            platform_fee_bps: 0,
            exists: false,
        }
    }

    /// Platform fee share of the price.
    pub fn platform_fee(&self) -> TokenAmount {
        let fee = self.price.base_units() * U256::from(self.platform_fee_bps) / U256::from(10_000u32);
        TokenAmount::from_base_units(fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn prefixed_ids_use_trailing_digits() {
        assert_eq!(
            MachineIndex::parse("robo-cafe-001", IdFallback::Strict).unwrap(),
            MachineIndex::from(1)
        );
        assert_eq!(
            MachineIndex::parse("machine-42", IdFallback::Strict).unwrap(),
            MachineIndex::from(42)
        );
        assert_eq!(
            MachineIndex::parse("humanoid-007", IdFallback::Strict).unwrap(),
            MachineIndex::from(7)
        );
    }

    #[test]
    fn numeric_ids_are_unchanged() {
        assert_eq!(
            MachineIndex::parse("7", IdFallback::Strict).unwrap(),
            MachineIndex::from(7)
        );
        assert_eq!(
            MachineIndex::parse("0", IdFallback::Strict).unwrap(),
            MachineIndex::from(0)
        );
    }

    #[test]
    fn digitless_ids_fall_back_to_one_under_legacy_policy() {
        // Silently addressing machine 1 is suspicious; strict is the default.
        assert_eq!(MachineIndex::from_legacy_id("coffee"), MachineIndex::from(1));
        assert_eq!(
            MachineIndex::parse("robo-cafe", IdFallback::Legacy).unwrap(),
            MachineIndex::from(1)
        );
        assert_eq!(MachineIndex::from_legacy_id(""), MachineIndex::from(1));
    }

    #[test]
    fn digitless_ids_are_rejected_under_strict_policy() {
        assert_matches!(
            MachineIndex::parse("coffee", IdFallback::Strict),
            Err(MachinaError::InvalidMachineId { input }) if input == "coffee"
        );
        assert_eq!(IdFallback::default(), IdFallback::Strict);
    }

    #[test]
    fn interior_digits_do_not_count() {
        assert_matches!(
            MachineIndex::parse("v2-coffee", IdFallback::Strict),
            Err(MachinaError::InvalidMachineId { .. })
        );
    }

    #[test]
    fn placeholder_is_inert() {
        let machine = Machine::placeholder(MachineIndex::from(3));
        assert_eq!(machine.name, "Machine 3");
        assert!(machine.price.is_zero());
        assert!(!machine.exists);
    }

    #[test]
    fn platform_fee_uses_basis_points() {
        let machine = Machine {
            index: MachineIndex::from(1),
            name: "RoboCafe".into(),
            machine_addr: Address::ZERO,
            price: TokenAmount::parse("0.1").unwrap(),
            platform_fee_bps: 250,
            exists: true,
        };
        assert_eq!(machine.platform_fee().to_string(), "0.0025");
    }

    proptest! {
        #[test]
        fn prefix_dash_digits_yields_trailing_value(
            prefix in "[a-z]{1,8}(-[a-z]{1,8})?",
            value in 0u64..1_000_000,
            pad in 0usize..4,
        ) {
            let id = format!("{prefix}-{value:0width$}", width = pad + 1);
            prop_assert_eq!(
                MachineIndex::parse(&id, IdFallback::Strict).unwrap(),
                MachineIndex::from(value)
            );
        }
    }
}
