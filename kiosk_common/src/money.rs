use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op;

pub const BAKERY_CURRENCY_CODE: &str = "THB";

const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------       Money         ---------------------------------------------------------
/// An amount of money in minor currency units (satang). All prices, QR amounts and webhook amounts travel as integer
/// minor units on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Value cannot be represented as an amount of money: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value).map(Self).map_err(|_| MoneyConversionError(format!("{value} is too large")))
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Parses a decimal major-unit amount such as `"45"`, `"45.5"` or `"-12.05"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (major, minor) = digits.split_once('.').unwrap_or((digits, ""));
        if major.is_empty() || minor.len() > 2 || !major.chars().chain(minor.chars()).all(|c| c.is_ascii_digit()) {
            return Err(MoneyConversionError(s.to_string()));
        }
        let major = major.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}. {e}")))?;
        let minor = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))? * 10,
            _ => minor.parse::<i64>().map_err(|e| MoneyConversionError(e.to_string()))?,
        };
        let value = major
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .and_then(|v| v.checked_add(minor))
            .ok_or_else(|| MoneyConversionError(format!("{s} overflows")))?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_UNITS_PER_MAJOR as u64;
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_major(amount: i64) -> Self {
        Self(amount * MINOR_UNITS_PER_MAJOR)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Money::from(4550).to_string(), "45.50");
        assert_eq!(Money::from(5).to_string(), "0.05");
        assert_eq!(Money::from(-1205).to_string(), "-12.05");
        assert_eq!(Money::from_major(120).to_string(), "120.00");
    }

    #[test]
    fn parse() {
        assert_eq!("45".parse::<Money>().unwrap(), Money::from(4500));
        assert_eq!("45.5".parse::<Money>().unwrap(), Money::from(4550));
        assert_eq!("-12.05".parse::<Money>().unwrap(), Money::from(-1205));
        assert!("12.345".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
    }

    #[test]
    fn arithmetic() {
        let total: Money = [Money::from(100), Money::from(250)].into_iter().sum();
        assert_eq!(total, Money::from(350));
        let mut t = total * 2;
        t -= Money::from(50);
        assert_eq!(t, Money::from(650));
        assert_eq!(-t, Money::from(-650));
        assert_eq!(t - Money::from(700), Money::from(-50));
    }

    #[test]
    fn serializes_as_minor_units() {
        let json = serde_json::to_string(&Money::from(4550)).unwrap();
        assert_eq!(json, "4550");
    }
}
