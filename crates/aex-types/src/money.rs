//! Integer micro-unit amounts. 1 USD = 1,000,000 micro-units (`Micro`).
//!
//! No floating point appears anywhere amounts are stored or compared;
//! every arithmetic path here is checked so a bug surfaces as an error
//! or a panic in debug builds rather than a silently wrapped balance.

use std::fmt;
use std::ops::{Add, Sub};

/// An amount expressed in integer micro-units of USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Micro(pub u64);

impl Micro {
    pub const ZERO: Micro = Micro(0);

    pub fn checked_add(self, other: Micro) -> Option<Micro> {
        self.0.checked_add(other.0).map(Micro)
    }

    pub fn checked_sub(self, other: Micro) -> Option<Micro> {
        self.0.checked_sub(other.0).map(Micro)
    }

    pub fn saturating_sub(self, other: Micro) -> Micro {
        Micro(self.0.saturating_sub(other.0))
    }
}

impl Add for Micro {
    type Output = Micro;
    fn add(self, rhs: Micro) -> Micro {
        Micro(self.0 + rhs.0)
    }
}

impl Sub for Micro {
    type Output = Micro;
    fn sub(self, rhs: Micro) -> Micro {
        Micro(self.0 - rhs.0)
    }
}

impl fmt::Display for Micro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\u{00b5}", self.0)
    }
}

impl From<u64> for Micro {
    fn from(v: u64) -> Self {
        Micro(v)
    }
}
