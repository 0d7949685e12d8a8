use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of fractional digits carried by every [`Amount`].
pub const SCALE: u32 = 10;

const UNIT: i128 = 10_000_000_000;

/// Base-10 fixed-point amount with ten fractional digits.
///
/// Backed by an `i128` count of 1e-10 units. Ledger amounts arrive as decimal
/// strings and every arithmetic result is rounded back to ten fractional
/// digits, so totals never drift the way binary floating point would over
/// millions of records.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i128);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("numeric overflow in amount arithmetic")]
    Overflow,
    #[error("division by zero")]
    DivideByZero,
    #[error("invalid decimal literal '{0}'")]
    Parse(String),
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Raw 1e-10 units.
    pub const fn raw(self) -> i128 {
        self.0
    }

    pub const fn from_raw(raw: i128) -> Self {
        Amount(raw)
    }

    /// Whole units, no fractional part.
    pub const fn from_units(units: i64) -> Self {
        Amount(units as i128 * UNIT)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn max(self, other: Amount) -> Amount {
        if self.0 >= other.0 { self } else { other }
    }

    pub fn checked_add(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_add(rhs.0)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_sub(rhs.0)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    /// Decimal multiplication, rounded half-away-from-zero to ten digits.
    ///
    /// Splits the left operand around the scale unit so the intermediate
    /// product stays inside `i128` for any realistic ledger magnitude.
    pub fn checked_mul(self, rhs: Amount) -> Result<Amount, AmountError> {
        let negative = (self.0 < 0) != (rhs.0 < 0);
        let a = self.0.unsigned_abs();
        let b = rhs.0.unsigned_abs();

        let a_hi = a / UNIT as u128;
        let a_lo = a % UNIT as u128;

        let term_hi = a_hi.checked_mul(b).ok_or(AmountError::Overflow)?;
        let term_lo_full = a_lo.checked_mul(b).ok_or(AmountError::Overflow)?;
        let mut term_lo = term_lo_full / UNIT as u128;
        let rem = term_lo_full % UNIT as u128;
        if rem * 2 >= UNIT as u128 {
            term_lo += 1;
        }

        let total = term_hi.checked_add(term_lo).ok_or(AmountError::Overflow)?;
        if total > i128::MAX as u128 {
            return Err(AmountError::Overflow);
        }
        let raw = if negative {
            -(total as i128)
        } else {
            total as i128
        };
        Ok(Amount(raw))
    }

    /// Multiply by an integer count (exact up to overflow).
    pub fn checked_mul_count(self, count: u64) -> Result<Amount, AmountError> {
        self.0
            .checked_mul(count as i128)
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }

    /// Divide by an integer count, rounded half-away-from-zero.
    pub fn checked_div_count(self, count: u64) -> Result<Amount, AmountError> {
        if count == 0 {
            return Err(AmountError::DivideByZero);
        }
        let negative = self.0 < 0;
        let a = self.0.unsigned_abs();
        let n = count as u128;
        let mut q = a / n;
        if (a % n) * 2 >= n {
            q += 1;
        }
        if q > i128::MAX as u128 {
            return Err(AmountError::Overflow);
        }
        let raw = if negative { -(q as i128) } else { q as i128 };
        Ok(Amount(raw))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let int = abs / UNIT as u128;
        let frac = abs % UNIT as u128;
        write!(f, "{sign}{int}.{frac:010}")
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({self})")
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || AmountError::Parse(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if digits.is_empty() {
            return Err(parse_err());
        }

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(parse_err());
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(parse_err());
        }

        let int_units: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| parse_err())?
        };

        // Keep ten fractional digits; round half-up on the eleventh.
        let mut frac_units: i128 = 0;
        for (idx, c) in frac_part.chars().enumerate() {
            let digit = (c as u8 - b'0') as i128;
            if idx < SCALE as usize {
                frac_units = frac_units * 10 + digit;
            } else {
                if idx == SCALE as usize && digit >= 5 {
                    frac_units += 1;
                }
                break;
            }
        }
        let missing = SCALE as usize - frac_part.len().min(SCALE as usize);
        frac_units *= 10_i128.pow(missing as u32);

        let raw = int_units
            .checked_mul(UNIT)
            .and_then(|v| v.checked_add(frac_units))
            .ok_or(AmountError::Overflow)?;
        Ok(Amount(if negative { -raw } else { raw }))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().expect("parse amount")
    }

    #[test]
    fn parse_and_display_round_trip() {
        assert_eq!(amt("10.0000000000").to_string(), "10.0000000000");
        assert_eq!(amt("5").to_string(), "5.0000000000");
        assert_eq!(amt("0.5").to_string(), "0.5000000000");
        assert_eq!(amt("-3.25").to_string(), "-3.2500000000");
        assert_eq!(amt(".5").to_string(), "0.5000000000");
    }

    #[test]
    fn parse_rounds_excess_digits_half_up() {
        assert_eq!(amt("1.00000000004").to_string(), "1.0000000000");
        assert_eq!(amt("1.00000000005").to_string(), "1.0000000001");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Amount::from_str("").is_err());
        assert!(Amount::from_str("abc").is_err());
        assert!(Amount::from_str("1.2.3").is_err());
        assert!(Amount::from_str("-").is_err());
        assert!(Amount::from_str(".").is_err());
    }

    #[test]
    fn addition_has_no_drift() {
        let mut total = Amount::ZERO;
        for _ in 0..1_000_000 {
            total = total.checked_add(amt("0.0000000001")).unwrap();
        }
        assert_eq!(total.to_string(), "0.0001000000");
    }

    #[test]
    fn mul_rounds_to_ten_digits() {
        let a = amt("5.0000000000");
        let r = amt("2.0000000000");
        assert_eq!(a.checked_mul(r).unwrap().to_string(), "10.0000000000");

        let third = amt("0.3333333333");
        let product = third.checked_mul(third).unwrap();
        assert_eq!(product.to_string(), "0.1111111111");
    }

    #[test]
    fn mul_handles_signs() {
        let a = amt("-2.5");
        let b = amt("4");
        assert_eq!(a.checked_mul(b).unwrap().to_string(), "-10.0000000000");
        assert_eq!(a.checked_mul(amt("-4")).unwrap().to_string(), "10.0000000000");
    }

    #[test]
    fn count_mul_and_div() {
        let a = amt("10.0000000000");
        assert_eq!(a.checked_mul_count(3).unwrap().to_string(), "30.0000000000");
        assert_eq!(a.checked_div_count(4).unwrap().to_string(), "2.5000000000");
        assert_eq!(
            amt("10").checked_div_count(3).unwrap().to_string(),
            "3.3333333333"
        );
        assert!(a.checked_div_count(0).is_err());
    }

    #[test]
    fn max_clamps_negative_to_zero() {
        let negative = amt("-1.5");
        assert_eq!(negative.max(Amount::ZERO), Amount::ZERO);
        assert_eq!(amt("1.5").max(Amount::ZERO), amt("1.5"));
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let a = amt("15.0000000000");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"15.0000000000\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
