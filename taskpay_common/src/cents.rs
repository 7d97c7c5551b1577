use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------       Cents         ---------------------------------------------------------
/// A currency amount in integer hundredths of a unit. All escrow arithmetic happens on this type, so balances can
/// never pick up floating-point drift.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, AddAssign, add_assign);
op!(inplace Cents, SubAssign, sub_assign);
op!(unary Cents, Neg, neg);

impl Mul<i64> for Cents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct CentsConversionError(String);

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Cents {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Cents {}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / 100;
        let frac = (self.0 % 100).abs();
        write!(f, "{whole}.{frac:02}")
    }
}

impl FromStr for Cents {
    type Err = CentsConversionError;

    /// Accepts amounts as entered by users: `300`, `12.34` or `12,34`. At most two fractional digits. Values that
    /// do not fit in an `i64` cent count are conversion errors, never wraparounds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().replace(',', ".");
        // The sign comes from the raw string. A parsed whole part of 0 cannot carry it for inputs like "-0.50".
        let negative = s.starts_with('-');
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s.as_str(), ""),
        };
        if frac.len() > 2 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(CentsConversionError(s.clone()));
        }
        let whole = whole.parse::<i64>().map_err(|_| CentsConversionError(s.clone()))?;
        let frac = if frac.is_empty() { 0 } else { format!("{frac:0<2}").parse::<i64>().map_err(|_| CentsConversionError(s.clone()))? };
        let frac = if negative { -frac } else { frac };
        let cents = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| CentsConversionError(s.clone()))?;
        Ok(Self(cents))
    }
}

impl Cents {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_whole(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_amounts() {
        assert_eq!("300".parse::<Cents>().unwrap(), Cents::from_whole(300));
        assert_eq!("12.34".parse::<Cents>().unwrap(), Cents::from(1234));
        assert_eq!("12,5".parse::<Cents>().unwrap(), Cents::from(1250));
        assert_eq!("0.07".parse::<Cents>().unwrap(), Cents::from(7));
        assert!("12.345".parse::<Cents>().is_err());
        assert!("abc".parse::<Cents>().is_err());
        assert!("12.3x".parse::<Cents>().is_err());
    }

    #[test]
    fn parse_negative_amounts_keep_their_sign() {
        assert_eq!("-12.34".parse::<Cents>().unwrap(), Cents::from(-1234));
        // The whole part is zero here; the sign must still survive.
        assert_eq!("-0.50".parse::<Cents>().unwrap(), Cents::from(-50));
        assert_eq!("-0.50".parse::<Cents>().unwrap().is_positive(), false);
    }

    #[test]
    fn parse_rejects_amounts_that_overflow_cents() {
        // Fits in an i64 as units, but not once scaled to cents.
        assert!("922337203685477581".parse::<Cents>().is_err());
        assert!("-922337203685477581".parse::<Cents>().is_err());
        assert!("92233720368547758.08".parse::<Cents>().is_err());
        // The largest representable amounts still parse.
        assert_eq!("92233720368547758.07".parse::<Cents>().unwrap(), Cents::from(i64::MAX));
    }

    #[test]
    fn display_amounts() {
        assert_eq!(Cents::from_whole(300).to_string(), "300.00");
        assert_eq!(Cents::from(1205).to_string(), "12.05");
        assert_eq!(Cents::from(7).to_string(), "0.07");
    }

    #[test]
    fn arithmetic() {
        let a = Cents::from_whole(10);
        let b = Cents::from(250);
        assert_eq!(a + b, Cents::from(1250));
        assert_eq!(a - b, Cents::from(750));
        assert_eq!(-b, Cents::from(-250));
        assert_eq!(b * 4, Cents::from_whole(10));
        assert_eq!(vec![a, b].into_iter().sum::<Cents>(), Cents::from(1250));
    }
}
