use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::{Currency, Uint128, Uint128Error};

/// Decimal places with a pre-computed scale
const SCALE_TABLE_LEN: usize = 31;
/// Used for decimal places beyond the scale table
const FALLBACK_SCALE: u128 = 1_000_000_000_000_000_000;
/// `2^64` as a float; scaled decimals have to stay below it
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

static SCALES: [u128; SCALE_TABLE_LEN] = scale_table();

const fn scale_table() -> [u128; SCALE_TABLE_LEN] {
    let mut table = [1u128; SCALE_TABLE_LEN];
    let mut i = 1;
    while i < SCALE_TABLE_LEN {
        table[i] = table[i - 1] * 10;
        i += 1;
    }
    table
}

/// The factor between a human readable value and its smallest unit, `10^decimal_places`
///
/// Precisions above 30 are clamped to `10^18`. [`Currency::new`] warns once
/// when such a currency is created.
pub fn scale_for(decimal_places: u8) -> u128 {
    match SCALES.get(decimal_places as usize) {
        Some(scale) => *scale,
        None => {
            tracing::debug!(decimal_places, "decimal precision exceeds the scale table, using 10^18");
            FALLBACK_SCALE
        }
    }
}

/// Possible errors to occur during amount conversions and arithmetic
#[derive(Debug, thiserror::Error)]
pub enum AmountError {
    #[error("The result does not fit into the target integer")]
    ArithmeticOverflow,
    #[error("The result would be negative")]
    ArithmeticUnderflow,
    #[error("Cannot divide by {0}")]
    InvalidDivisor(f64),
    #[error(transparent)]
    Conversion(#[from] Uint128Error),
}

/// Checked arithmetic and ordering over scaled amounts
///
/// The left hand operand is always the implementor's own scaled value.
pub trait Arithmetic {
    /// Adds `other`, failing if the sum exceeds 128 bits
    fn checked_add(&self, other: Uint128) -> Result<Uint128, AmountError>;

    /// Subtracts `other`, failing if the difference would be negative
    fn checked_sub(&self, other: Uint128) -> Result<Uint128, AmountError>;

    /// Multiplies by `multiplier` and truncates the result
    ///
    /// Negative multipliers are treated as zero.
    fn checked_mul(&self, multiplier: f64) -> Result<Uint128, AmountError>;

    /// Divides by `divisor` and truncates the result towards zero
    fn checked_div(&self, divisor: f64) -> Result<Uint128, AmountError>;

    /// Takes `percent` percent, e.g. `0.7` is 0.7%
    fn percentage(&self, percent: f64) -> Result<Uint128, AmountError> {
        self.checked_mul(percent / 100.0)
    }

    /// Orders the scaled value against `other`
    fn compare(&self, other: Uint128) -> Ordering;

    /// Whether the scaled value is zero
    fn is_zero(&self) -> bool;

    /// Whether the scaled value equals `other`
    fn equal(&self, other: Uint128) -> bool {
        self.compare(other) == Ordering::Equal
    }

    /// Whether the scaled value is greater than `other`
    fn greater_than(&self, other: Uint128) -> bool {
        self.compare(other) == Ordering::Greater
    }

    /// Whether the scaled value is at least `other`
    fn greater_than_or_equal(&self, other: Uint128) -> bool {
        self.compare(other) != Ordering::Less
    }

    /// Whether the scaled value is less than `other`
    fn less_than(&self, other: Uint128) -> bool {
        self.compare(other) == Ordering::Less
    }

    /// Whether the scaled value is at most `other`
    fn less_than_or_equal(&self, other: Uint128) -> bool {
        self.compare(other) != Ordering::Greater
    }

    /// The smaller of the scaled value and `other`
    fn min(&self, other: Uint128) -> Uint128;

    /// The larger of the scaled value and `other`
    fn max(&self, other: Uint128) -> Uint128;
}

/// A monetary amount bound to a currency
///
/// An amount carries either a human readable decimal value or a raw value
/// scaled to the currency's smallest unit. Amounts are never changed in place;
/// the `with_*` methods return a new amount.
#[derive(Clone, Debug, PartialEq)]
pub struct Amount {
    currency: Currency,
    decimal: f64,
    raw: Uint128,
}

impl Currency {
    /// A zero amount of this currency
    pub fn amount(&self) -> Amount {
        Amount {
            currency: self.clone(),
            decimal: 0.0,
            raw: Uint128::ZERO,
        }
    }

    /// An amount of this currency from a human readable value, e.g. `12.34`
    pub fn amount_from_decimal(&self, value: f64) -> Amount {
        self.amount().with_decimal(value)
    }

    /// An amount of this currency from a value in the smallest unit
    pub fn amount_from_raw(&self, raw: Uint128) -> Amount {
        self.amount().with_raw(raw)
    }
}

impl Amount {
    /// The currency of this amount
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// The human readable value, if this amount was created from one
    pub fn decimal(&self) -> f64 {
        self.decimal
    }

    /// The scaled value, if this amount was created from one
    pub fn raw(&self) -> Uint128 {
        self.raw
    }

    /// A copy of this amount holding the scaled value `raw`
    pub fn with_raw(&self, raw: Uint128) -> Self {
        Self {
            currency: self.currency.clone(),
            decimal: 0.0,
            raw,
        }
    }

    /// A copy of this amount holding the human readable value `value`
    pub fn with_decimal(&self, value: f64) -> Self {
        Self {
            currency: self.currency.clone(),
            decimal: value,
            raw: Uint128::ZERO,
        }
    }

    /// Scales the decimal value to the currency's smallest unit
    ///
    /// Rounds half away from zero. Negative, infinite and NaN values are
    /// clamped to zero. Fails if the scaled value does not fit into 64 bits.
    ///
    /// For IDR (2 decimal places), `20000.50` becomes `2000050`.
    pub fn decimal_to_scaled(&self) -> Result<Uint128, AmountError> {
        if !self.decimal.is_finite() || self.decimal <= 0.0 {
            return Ok(Uint128::ZERO);
        }

        let scale = scale_for(self.currency.decimal_places()) as f64;
        let scaled = (self.decimal * scale).round();
        if scaled >= U64_LIMIT {
            return Err(AmountError::ArithmeticOverflow);
        }

        Ok(Uint128::from_u64(scaled as u64))
    }

    /// The scaled value of this amount
    ///
    /// A positive decimal value takes priority over the raw value.
    pub fn value(&self) -> Result<Uint128, AmountError> {
        match self.decimal > 0.0 {
            true => self.decimal_to_scaled(),
            false => Ok(self.raw),
        }
    }

    /// Converts the raw value back to a human readable value
    ///
    /// For IDR (2 decimal places), `2000050` becomes `20000.50`.
    pub fn to_decimal(&self) -> f64 {
        let decimal_places = self.currency.decimal_places();

        let value = match self.raw.to_u64() {
            Some(0) => return 0.0,
            Some(value) => value as f64,
            None => return self.to_decimal_wide(),
        };

        match decimal_places {
            0 => value,
            1 => value / 10.0,
            2 => value / 100.0,
            6 => value / 1_000_000.0,
            8 => value / 100_000_000.0,
            18 => value / 1_000_000_000_000_000_000.0,
            _ => value / scale_for(decimal_places) as f64,
        }
    }

    fn to_decimal_wide(&self) -> f64 {
        let raw = self.raw.to_biguint();
        let scale = BigUint::from(scale_for(self.currency.decimal_places()));
        let integer = (&raw / &scale).to_f64().unwrap_or(f64::INFINITY);
        let fraction = (&raw % &scale).to_f64().unwrap_or_default();
        integer + fraction / scale.to_f64().unwrap_or(1.0)
    }
}

impl Arithmetic for Amount {
    fn checked_add(&self, other: Uint128) -> Result<Uint128, AmountError> {
        if let (Some(a), Some(b)) = (self.raw.to_u64(), other.to_u64()) {
            if let Some(sum) = a.checked_add(b) {
                return Ok(Uint128::from_u64(sum));
            }
        }

        self.raw
            .as_u128()
            .checked_add(other.as_u128())
            .map(Uint128::from)
            .ok_or(AmountError::ArithmeticOverflow)
    }

    fn checked_sub(&self, other: Uint128) -> Result<Uint128, AmountError> {
        if let (Some(a), Some(b)) = (self.raw.to_u64(), other.to_u64()) {
            return a
                .checked_sub(b)
                .map(Uint128::from_u64)
                .ok_or(AmountError::ArithmeticUnderflow);
        }

        self.raw
            .as_u128()
            .checked_sub(other.as_u128())
            .map(Uint128::from)
            .ok_or(AmountError::ArithmeticUnderflow)
    }

    fn checked_mul(&self, multiplier: f64) -> Result<Uint128, AmountError> {
        if self.raw.is_zero() || multiplier.is_nan() || multiplier <= 0.0 {
            return Ok(Uint128::ZERO);
        }
        if multiplier.is_infinite() {
            return Err(AmountError::ArithmeticOverflow);
        }

        let (mantissa, exponent) = decompose(multiplier);
        let product = self.raw.to_biguint() * mantissa;
        let product = match exponent >= 0 {
            true => product << exponent as usize,
            false => product >> exponent.unsigned_abs() as usize,
        };

        Uint128::from_biguint(&product).map_err(|_| AmountError::ArithmeticOverflow)
    }

    fn checked_div(&self, divisor: f64) -> Result<Uint128, AmountError> {
        if divisor == 0.0 || !divisor.is_finite() {
            return Err(AmountError::InvalidDivisor(divisor));
        }

        let (mantissa, exponent) = decompose(divisor.abs());
        let quotient = match exponent >= 0 {
            true => self.raw.to_biguint() / (BigUint::from(mantissa) << exponent as usize),
            false => (self.raw.to_biguint() << exponent.unsigned_abs() as usize) / mantissa,
        };

        // a negative divisor only yields a valid amount if the quotient truncates to zero
        if divisor < 0.0 && !quotient.is_zero() {
            return Err(AmountError::ArithmeticUnderflow);
        }

        Uint128::from_biguint(&quotient).map_err(|_| AmountError::ArithmeticOverflow)
    }

    fn compare(&self, other: Uint128) -> Ordering {
        match (self.raw.to_u64(), other.to_u64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self.raw.cmp(&other),
        }
    }

    fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    fn min(&self, other: Uint128) -> Uint128 {
        match self.less_than(other) {
            true => self.raw,
            false => other,
        }
    }

    fn max(&self, other: Uint128) -> Uint128 {
        match self.greater_than(other) {
            true => self.raw,
            false => other,
        }
    }
}

/// Formats the raw value as `<CODE> <grouped integer>[.<fraction>]`
///
/// For IDR, `2000050` becomes `IDR 20,000.50`.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimal_places = self.currency.decimal_places() as usize;
        let raw = self.raw.as_u128();

        if raw == 0 {
            write!(f, "{} 0", self.currency.code())?;
            if decimal_places > 0 {
                write!(f, ".{}", "0".repeat(decimal_places))?;
            }
            return Ok(());
        }

        let scale = scale_for(self.currency.decimal_places());
        write!(f, "{} {}", self.currency.code(), group_thousands(raw / scale))?;
        if decimal_places > 0 {
            write!(f, ".{:0>width$}", raw % scale, width = decimal_places)?;
        }

        Ok(())
    }
}

/// Inserts a `,` between every group of three digits
fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    grouped
}

/// Splits a finite, positive float into `mantissa * 2^exponent`
fn decompose(value: f64) -> (u64, i32) {
    let bits = value.to_bits();
    let biased_exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1 << 52) - 1);

    match biased_exponent {
        // subnormal
        0 => (fraction, -1074),
        _ => (fraction | 1 << 52, biased_exponent - 1075),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::currency::{BTC, ETH, IDR, USD, USDT, VND};

    fn raw(value: u64) -> Uint128 {
        Uint128::from_u64(value)
    }

    macro_rules! display_test {
        ($name:ident $currency:expr, $raw:expr => $expected:literal) => {
            #[test]
            fn $name() {
                let amount = $currency.amount_from_raw(Uint128::from($raw));
                assert_eq!(amount.to_string(), $expected);
            }
        };
    }

    display_test!(display_usd USD, 1_234_567u64 => "USD 12,345.67");
    display_test!(display_idr IDR, 50_000_000u64 => "IDR 500,000.00");
    display_test!(display_vnd VND, 1_000_000u64 => "VND 1,000,000");
    display_test!(display_small USD, 99u64 => "USD 0.99");
    display_test!(display_fraction_padding USD, 100_005u64 => "USD 1,000.05");
    display_test!(display_zero USD, 0u64 => "USD 0.00");
    display_test!(display_zero_no_decimals VND, 0u64 => "VND 0");
    display_test!(display_btc BTC, 123_456_789u64 => "BTC 1.23456789");
    display_test!(display_wide ETH, u128::MAX => "ETH 340,282,366,920,938,463,463.374607431768211455");

    macro_rules! scale_test {
        ($name:ident $currency:expr, $decimal:expr => Ok($expected:expr)) => {
            #[test]
            fn $name() {
                let scaled = $currency.amount_from_decimal($decimal).decimal_to_scaled().unwrap();
                assert_eq!(scaled, Uint128::from_u64($expected));
            }
        };
        ($name:ident $currency:expr, $decimal:expr => Err($err:pat)) => {
            #[test]
            fn $name() {
                let err = $currency.amount_from_decimal($decimal).decimal_to_scaled().unwrap_err();
                assert!(matches!(err, $err), "unexpected error {:?}", err);
            }
        };
    }

    scale_test!(scale_usd USD, 100.50 => Ok(10_050));
    scale_test!(scale_idr IDR, 1_000_000.75 => Ok(100_000_075));
    scale_test!(scale_vnd VND, 50_000.0 => Ok(50_000));
    scale_test!(scale_btc BTC, 0.000_000_01 => Ok(1));
    scale_test!(scale_rounds_half_away USD, 0.125 => Ok(13));
    scale_test!(scale_negative_clamps USD, -100.50 => Ok(0));
    scale_test!(scale_zero USD, 0.0 => Ok(0));
    scale_test!(scale_infinity_clamps USD, f64::INFINITY => Ok(0));
    scale_test!(scale_negative_infinity_clamps USD, f64::NEG_INFINITY => Ok(0));
    scale_test!(scale_nan_clamps USD, f64::NAN => Ok(0));
    scale_test!(scale_overflow ETH, 100.0 => Err(AmountError::ArithmeticOverflow));

    #[test]
    fn to_decimal_fast_paths() {
        assert_eq!(USD.amount_from_raw(raw(10_050)).to_decimal(), 100.50);
        assert_eq!(IDR.amount_from_raw(raw(100_000_075)).to_decimal(), 1_000_000.75);
        assert_eq!(VND.amount_from_raw(raw(50_000)).to_decimal(), 50_000.0);
        assert!((BTC.amount_from_raw(raw(1)).to_decimal() - 0.000_000_01).abs() < 1e-15);
        assert_eq!(USDT.amount_from_raw(raw(2_500_000)).to_decimal(), 2.5);
        assert_eq!(USD.amount().to_decimal(), 0.0);
    }

    #[test]
    fn to_decimal_wide_values() {
        let value = Uint128::from(5u128 * 10u128.pow(18) * 10u128.pow(6));
        let decimal = ETH.amount_from_raw(value).to_decimal();
        assert!((decimal - 5_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn value_prefers_positive_decimals() {
        let amount = USD.amount_from_raw(raw(42));
        assert_eq!(amount.value().unwrap(), raw(42));
        assert_eq!(amount.with_decimal(1.5).value().unwrap(), raw(150));
        assert_eq!(amount.with_decimal(-1.5).value().unwrap(), Uint128::ZERO);
    }

    #[test]
    fn mutators_return_new_amounts() {
        let original = USD.amount_from_raw(raw(10));
        let changed = original.with_raw(raw(20));
        assert_eq!(original.raw(), raw(10));
        assert_eq!(changed.raw(), raw(20));
        assert_eq!(changed.currency(), &USD);
    }

    #[test]
    fn add_and_sub() {
        let amount = USD.amount_from_raw(raw(10_000));
        assert_eq!(amount.checked_add(raw(5_050)).unwrap(), raw(15_050));
        assert_eq!(amount.checked_sub(raw(5_050)).unwrap(), raw(4_950));
        assert!(matches!(
            USD.amount_from_raw(raw(5_000)).checked_sub(raw(10_000)),
            Err(AmountError::ArithmeticUnderflow),
        ));
    }

    #[test]
    fn add_past_64_bits() {
        let amount = USD.amount_from_raw(raw(u64::MAX));
        assert_eq!(amount.checked_add(raw(1)).unwrap(), Uint128::from_parts(1, 0));
        assert!(matches!(
            USD.amount_from_raw(Uint128::MAX).checked_add(raw(1)),
            Err(AmountError::ArithmeticOverflow),
        ));
    }

    #[test]
    fn sub_wide_values() {
        let amount = USD.amount_from_raw(Uint128::from_parts(1, 0));
        assert_eq!(amount.checked_sub(raw(1)).unwrap(), raw(u64::MAX));
        assert!(matches!(
            USD.amount_from_raw(raw(1)).checked_sub(Uint128::from_parts(1, 0)),
            Err(AmountError::ArithmeticUnderflow),
        ));
    }

    #[test]
    fn mul() {
        let amount = USD.amount_from_raw(raw(10_000));
        assert_eq!(amount.checked_mul(1.5).unwrap(), raw(15_000));
        assert_eq!(amount.checked_mul(0.333).unwrap(), raw(3_330));
        assert_eq!(amount.checked_mul(-2.0).unwrap(), Uint128::ZERO);
        assert_eq!(amount.checked_mul(f64::NAN).unwrap(), Uint128::ZERO);
        assert!(matches!(amount.checked_mul(f64::INFINITY), Err(AmountError::ArithmeticOverflow)));
        assert!(matches!(
            USD.amount_from_raw(Uint128::MAX).checked_mul(2.0),
            Err(AmountError::ArithmeticOverflow),
        ));
        assert_eq!(USD.amount_from_raw(Uint128::MAX).checked_mul(0.5).unwrap(), Uint128::from(u128::MAX >> 1));
    }

    #[test]
    fn div() {
        let amount = USD.amount_from_raw(raw(10_000));
        assert_eq!(amount.checked_div(2.0).unwrap(), raw(5_000));
        assert_eq!(amount.checked_div(3.0).unwrap(), raw(3_333));
        assert_eq!(amount.checked_div(0.5).unwrap(), raw(20_000));
        assert!(matches!(amount.checked_div(-2.0), Err(AmountError::ArithmeticUnderflow)));
        assert_eq!(USD.amount_from_raw(raw(1)).checked_div(-2.0).unwrap(), Uint128::ZERO);
        assert!(matches!(
            USD.amount_from_raw(Uint128::MAX).checked_div(0.5),
            Err(AmountError::ArithmeticOverflow),
        ));
    }

    #[test]
    fn div_invalid_divisors() {
        let amount = USD.amount_from_raw(raw(10_000));
        for divisor in [0.0, -0.0, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            assert!(matches!(amount.checked_div(divisor), Err(AmountError::InvalidDivisor(_))));
        }
    }

    #[test]
    fn percentage() {
        let cases = [
            (10_000, 1.0, 100, 1),
            (20_000, 2.5, 500, 1),
            (100_000, 0.7, 700, 1),
            (5_000, 10.0, 500, 0),
        ];
        for (value, percent, expected, tolerance) in cases {
            let result = USD.amount_from_raw(raw(value)).percentage(percent).unwrap();
            let result = result.to_u64().unwrap();
            assert!(result.abs_diff(expected) <= tolerance, "{}% of {} gave {}", percent, value, result);
        }
    }

    #[test]
    fn comparisons() {
        let a = USD.amount_from_raw(raw(10_000));
        let b = raw(5_000);
        let c = raw(10_000);

        assert_eq!(a.compare(b), Ordering::Greater);
        assert_eq!(USD.amount_from_raw(b).compare(c), Ordering::Less);
        assert_eq!(a.compare(c), Ordering::Equal);
        assert!(a.equal(c));
        assert!(!a.equal(b));
        assert!(a.greater_than(b));
        assert!(!a.greater_than(c));
        assert!(a.greater_than_or_equal(c));
        assert!(a.less_than(Uint128::from_parts(1, 0)));
        assert!(a.less_than_or_equal(c));
        assert_eq!(a.min(b), b);
        assert_eq!(a.max(b), c);
        assert!(USD.amount().is_zero());
        assert!(!a.is_zero());
    }

    #[test]
    fn scales() {
        assert_eq!(scale_for(0), 1);
        assert_eq!(scale_for(2), 100);
        assert_eq!(scale_for(8), 100_000_000);
        assert_eq!(scale_for(18), 1_000_000_000_000_000_000);
        assert_eq!(scale_for(30), 10u128.pow(30));
        assert_eq!(scale_for(31), 1_000_000_000_000_000_000);
        assert_eq!(scale_for(99), 1_000_000_000_000_000_000);
    }

    #[test]
    fn precision_beyond_scale_table_uses_fallback() {
        let currency = Currency::new("WEI", 40).unwrap();
        let amount = currency.amount_from_decimal(2.5);
        assert_eq!(amount.value().unwrap(), raw(2_500_000_000_000_000_000));
        let amount = currency.amount_from_raw(raw(2_500_000_000_000_000_000));
        assert_eq!(amount.checked_add(raw(1)).unwrap(), raw(2_500_000_000_000_000_001));
        assert_eq!(amount.to_decimal(), 2.5);
    }

    #[test]
    fn thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(123), "123");
        assert_eq!(group_thousands(1_234), "1,234");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
        assert_eq!(group_thousands(1_000_000_000), "1,000,000,000");
    }

    proptest! {
        #[test]
        fn add_then_sub_restores(a in any::<u128>(), b in any::<u128>()) {
            let amount = USD.amount_from_raw(Uint128::from(a));
            match a.checked_add(b) {
                Some(sum) => {
                    let result = amount.checked_add(Uint128::from(b)).unwrap();
                    prop_assert_eq!(result, Uint128::from(sum));
                    let restored = USD.amount_from_raw(result).checked_sub(Uint128::from(b)).unwrap();
                    prop_assert_eq!(restored, Uint128::from(a));
                }
                None => prop_assert!(matches!(
                    amount.checked_add(Uint128::from(b)),
                    Err(AmountError::ArithmeticOverflow),
                )),
            }
        }

        #[test]
        fn sub_underflows_when_smaller(a in any::<u128>(), b in any::<u128>()) {
            prop_assume!(a < b);
            let result = USD.amount_from_raw(Uint128::from(a)).checked_sub(Uint128::from(b));
            prop_assert!(matches!(result, Err(AmountError::ArithmeticUnderflow)));
        }

        #[test]
        fn compare_matches_integer_order(a in any::<u128>(), b in any::<u128>()) {
            let amount = USD.amount_from_raw(Uint128::from(a));
            prop_assert_eq!(amount.compare(Uint128::from(b)), a.cmp(&b));
        }

        #[test]
        fn mul_by_integers_is_exact(a in any::<u64>(), m in 0u32..1000) {
            let result = USD.amount_from_raw(Uint128::from_u64(a)).checked_mul(m as f64).unwrap();
            prop_assert_eq!(result, Uint128::from(a as u128 * m as u128));
        }
    }
}
