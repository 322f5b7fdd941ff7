use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------       Price       -----------------------------------------------------------
/// A monetary amount expressed in minor currency units (e.g. cents). The marketplace is
/// currency-agnostic; whatever currency the payment gateway settles in, prices are carried around
/// as plain integral minor units.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Price(i64);

op!(binary Price, Add, add);
op!(binary Price, Sub, sub);
op!(inplace Price, SubAssign, sub_assign);

impl Mul<i64> for Price {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a price: {0}")]
pub struct PriceConversionError(String);

impl From<i64> for Price {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Price {}

impl TryFrom<u64> for Price {
    type Error = PriceConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(PriceConversionError(format!("Value {} is too large to convert to a price", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 as f64 / 100.0;
        write!(f, "{units:0.2}")
    }
}

impl Price {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    /// A price is only saleable if it is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}
