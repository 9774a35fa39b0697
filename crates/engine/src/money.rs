use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Amount of coins represented as **integer hundredths**.
///
/// Use this type for **all** monetary values in the engine (balances, caps,
/// transfer bounds, fees) to avoid floating-point drift.
///
/// # Examples
///
/// ```rust
/// use engine::Coins;
///
/// let amount = Coins::new(12_34);
/// assert_eq!(amount.hundredths(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator; rejects >
/// 2 decimals):
///
/// ```rust
/// use engine::Coins;
///
/// assert_eq!("10".parse::<Coins>().unwrap().hundredths(), 1000);
/// assert_eq!("10,5".parse::<Coins>().unwrap().hundredths(), 1050);
/// assert!("12.345".parse::<Coins>().is_err());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "f64", into = "f64")]
#[repr(transparent)]
pub struct Coins(i64);

impl Coins {
    pub const ZERO: Coins = Coins(0);

    /// Largest representable amount.
    pub const MAX: Coins = Coins(i64::MAX);

    /// Creates a new amount from integer hundredths.
    #[must_use]
    pub const fn new(hundredths: i64) -> Self {
        Self(hundredths)
    }

    /// Creates an amount from whole coins.
    #[must_use]
    pub const fn whole(coins: i64) -> Self {
        Self(coins * 100)
    }

    /// Returns the raw value in hundredths.
    #[must_use]
    pub const fn hundredths(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Saturating addition, never wraps.
    #[must_use]
    pub const fn saturating_add(self, rhs: Coins) -> Coins {
        Coins(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction, never wraps.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Coins) -> Coins {
        Coins(self.0.saturating_sub(rhs.0))
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Coins) -> Option<Coins> {
        self.0.checked_add(rhs.0).map(Coins)
    }

    /// Restricts the amount to `[0, max]`.
    #[must_use]
    pub fn clamp_to(self, max: Coins) -> Coins {
        Coins(self.0.clamp(0, max.0.max(0)))
    }

    /// Returns `percentage`% of the amount, rounded half away from zero to
    /// the nearest hundredth.
    ///
    /// `percentage` is itself expressed in hundredths of a percent, so `5%`
    /// is `Coins::whole(5)` and `2.5%` is `Coins::new(250)`.
    #[must_use]
    pub fn percent(self, percentage: Coins) -> Coins {
        // amount[1/100] * pct[1/100 %] / 10_000 = result[1/100]
        let product = i128::from(self.0) * i128::from(percentage.0);
        let half = if product < 0 { -5_000 } else { 5_000 };
        let rounded = (product + half) / 10_000;
        Coins(i64::try_from(rounded).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / 100;
        let frac = abs % 100;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

impl From<i64> for Coins {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Coins> for i64 {
    fn from(value: Coins) -> Self {
        value.0
    }
}

impl From<Coins> for f64 {
    fn from(value: Coins) -> Self {
        value.0 as f64 / 100.0
    }
}

impl TryFrom<f64> for Coins {
    type Error = EngineError;

    /// Converts a decimal amount (as found in settings files) by rounding to
    /// the nearest hundredth.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(EngineError::InvalidAmount(format!(
                "amount must be finite, got {value}"
            )));
        }
        let scaled = (value * 100.0).round();
        if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
            return Err(EngineError::InvalidAmount("amount too large".to_string()));
        }
        Ok(Coins(scaled as i64))
    }
}

impl Add for Coins {
    type Output = Coins;

    fn add(self, rhs: Coins) -> Self::Output {
        Coins(self.0 + rhs.0)
    }
}

impl AddAssign for Coins {
    fn add_assign(&mut self, rhs: Coins) {
        self.0 += rhs.0;
    }
}

impl Sub for Coins {
    type Output = Coins;

    fn sub(self, rhs: Coins) -> Self::Output {
        Coins(self.0 - rhs.0)
    }
}

impl SubAssign for Coins {
    fn sub_assign(&mut self, rhs: Coins) {
        self.0 -= rhs.0;
    }
}

impl Sum for Coins {
    fn sum<I: Iterator<Item = Coins>>(iter: I) -> Self {
        iter.fold(Coins::ZERO, Coins::saturating_add)
    }
}

impl FromStr for Coins {
    type Err = EngineError;

    /// Parses a decimal string into hundredths.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
    ///
    /// Validation rules:
    /// - max 2 fractional digits (rejects `12.345`)
    /// - rejects empty/invalid strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || EngineError::InvalidAmount("empty amount".to_string());
        let invalid = || EngineError::InvalidAmount("invalid amount".to_string());
        let overflow = || EngineError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (true, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (false, stripped)
        } else {
            (false, trimmed)
        };

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(empty());
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let whole_str = parts.next().ok_or_else(invalid)?;
        let frac_str = parts.next();

        if parts.next().is_some() {
            return Err(invalid());
        }

        if whole_str.is_empty() || !whole_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i64 = whole_str.parse().map_err(|_| overflow())?;

        let frac: i64 = match frac_str {
            None | Some("") => 0,
            Some(frac) => {
                if !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid());
                }
                match frac.len() {
                    1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
                    2 => frac.parse::<i64>().map_err(|_| invalid())?,
                    _ => return Err(EngineError::InvalidAmount("too many decimals".to_string())),
                }
            }
        };

        let total = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(overflow)?;

        Ok(Coins(if negative { -total } else { total }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Coins::new(0).to_string(), "0.00");
        assert_eq!(Coins::new(1).to_string(), "0.01");
        assert_eq!(Coins::new(1050).to_string(), "10.50");
        assert_eq!(Coins::new(-1050).to_string(), "-10.50");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<Coins>().unwrap().hundredths(), 1000);
        assert_eq!("10.5".parse::<Coins>().unwrap().hundredths(), 1050);
        assert_eq!("10,50".parse::<Coins>().unwrap().hundredths(), 1050);
        assert_eq!("-0.01".parse::<Coins>().unwrap().hundredths(), -1);
        assert_eq!("  2.30 ".parse::<Coins>().unwrap().hundredths(), 230);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("12.345".parse::<Coins>().is_err());
        assert!("".parse::<Coins>().is_err());
        assert!("1.2.3".parse::<Coins>().is_err());
        assert!("abc".parse::<Coins>().is_err());
    }

    #[test]
    fn from_f64_rounds_to_hundredths() {
        assert_eq!(Coins::try_from(100.0).unwrap(), Coins::whole(100));
        assert_eq!(Coins::try_from(1.999).unwrap(), Coins::new(200));
        assert_eq!(Coins::try_from(999_999_999.0).unwrap(), Coins::whole(999_999_999));
        assert!(Coins::try_from(f64::NAN).is_err());
        assert!(Coins::try_from(f64::INFINITY).is_err());
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Coins::whole(100).percent(Coins::whole(5)), Coins::whole(5));
        assert_eq!(Coins::whole(100).percent(Coins::ZERO), Coins::ZERO);
        // 0.33 * 2.5% = 0.00825 -> 0.01
        assert_eq!(Coins::new(33).percent(Coins::new(250)), Coins::new(1));
        // 0.10 * 2.5% = 0.0025 -> 0.00
        assert_eq!(Coins::new(10).percent(Coins::new(250)), Coins::ZERO);
    }

    #[test]
    fn clamp_to_bounds() {
        assert_eq!(Coins::new(-5).clamp_to(Coins::whole(10)), Coins::ZERO);
        assert_eq!(Coins::whole(11).clamp_to(Coins::whole(10)), Coins::whole(10));
        assert_eq!(Coins::whole(3).clamp_to(Coins::whole(10)), Coins::whole(3));
    }
}
