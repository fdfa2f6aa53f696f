//! Attribute access classes.
//!
//! Every declared field belongs to one or more classes. Snapshot dumps and
//! restores select fields by intersecting a mask with the field's class.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Bitmask of attribute access classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeClass(u32);

impl AttributeClass {
    /// No class at all.
    pub const NONE: Self = Self(0);
    /// Defined by configuration; runtime changes are tracked in the overlay.
    pub const CONFIG: Self = Self(1 << 0);
    /// Runtime state that survives restarts through the snapshot.
    pub const STATE: Self = Self(1 << 1);
    /// Every class.
    pub const ALL: Self = Self(Self::CONFIG.0 | Self::STATE.0);

    /// Raw bit value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds a mask from raw bits, dropping unknown bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether `self` and `other` share at least one bit.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AttributeClass {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AttributeClass {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for AttributeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::CONFIG) {
            names.push("config");
        }
        if self.contains(Self::STATE) {
            names.push("state");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

impl FromStr for AttributeClass {
    type Err = Error;

    /// Parses `config`, `state`, `all`, `none` or a `|`-separated combination.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut class = Self::NONE;
        for part in s.split('|').map(str::trim) {
            class |= match part.to_ascii_lowercase().as_str() {
                "config" => Self::CONFIG,
                "state" => Self::STATE,
                "all" => Self::ALL,
                "none" => Self::NONE,
                _ => return Err(Error::UnknownClass(part.to_string())),
            };
        }
        Ok(class)
    }
}
