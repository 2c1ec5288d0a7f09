use std::borrow::Cow;
use std::fmt;

/// The shortest accepted currency code
pub const MIN_CODE_LEN: usize = 1;
/// The longest accepted currency code
pub const MAX_CODE_LEN: usize = 6;
/// The highest decimal precision a ledger code can express
pub const MAX_DECIMAL_PLACES: u8 = 99;

/// The highest decimal precision with an exact scale
const MAX_SCALED_DECIMAL_PLACES: u8 = 30;
const DECIMAL_OFFSET: u32 = 100;
const CODE_SPACE: u32 = 1_000_000;
const HASHED_CODE_OFFSET: u32 = 500_000;

/// Possible errors to occur while creating a currency
#[derive(Debug, thiserror::Error)]
pub enum CurrencyError {
    #[error("Supported decimal places are 0-99, got {0}")]
    InvalidDecimalPlaces(u8),
    #[error("Supported currency code length is 1-6 characters, got {0}")]
    InvalidCodeLength(usize),
}

/// A currency: its code and the number of decimal places of its smallest unit
///
/// Codes are stored trimmed and upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Currency {
    code: Cow<'static, str>,
    decimal_places: u8,
}

/// Vietnamese Dong
pub const VND: Currency = Currency::builtin("VND", 0);
/// Indonesian Rupiah
pub const IDR: Currency = Currency::builtin("IDR", 2);
/// Malaysian Ringgit
pub const MYR: Currency = Currency::builtin("MYR", 2);
/// Singapore Dollar
pub const SGD: Currency = Currency::builtin("SGD", 2);
/// Thai Baht
pub const THB: Currency = Currency::builtin("THB", 2);
/// Philippine Peso
pub const PHP: Currency = Currency::builtin("PHP", 2);
/// US Dollar
pub const USD: Currency = Currency::builtin("USD", 2);
/// Euro
pub const EUR: Currency = Currency::builtin("EUR", 2);
/// Tether
pub const USDT: Currency = Currency::builtin("USDT", 6);
/// Bitcoin
pub const BTC: Currency = Currency::builtin("BTC", 8);
/// Binance Coin
pub const BNB: Currency = Currency::builtin("BNB", 12);
/// Ether
pub const ETH: Currency = Currency::builtin("ETH", 18);

/// All built-in currencies
pub static BUILTIN_CURRENCIES: [Currency; 12] = [VND, IDR, MYR, SGD, THB, PHP, USD, EUR, USDT, BTC, BNB, ETH];

impl Currency {
    /// Creates a new currency
    ///
    /// The code is trimmed and upper-cased. It has to be 1-6 characters long,
    /// and the decimal places have to be within 0-99.
    pub fn new(code: &str, decimal_places: u8) -> Result<Self, CurrencyError> {
        if decimal_places > MAX_DECIMAL_PLACES {
            return Err(CurrencyError::InvalidDecimalPlaces(decimal_places));
        }

        let code = code.trim();
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len()) {
            return Err(CurrencyError::InvalidCodeLength(code.len()));
        }
        if decimal_places > MAX_SCALED_DECIMAL_PLACES {
            tracing::warn!(code, decimal_places, "decimal precision exceeds the scale table, amounts use 10^18");
        }

        Ok(Self {
            code: Cow::Owned(code.to_uppercase()),
            decimal_places,
        })
    }

    const fn builtin(code: &'static str, decimal_places: u8) -> Self {
        Self {
            code: Cow::Borrowed(code),
            decimal_places,
        }
    }

    /// Finds a built-in currency by its code
    pub fn lookup(code: &str) -> Option<&'static Currency> {
        let code = code.trim();
        BUILTIN_CURRENCIES
            .iter()
            .find(|currency| currency.code.eq_ignore_ascii_case(code))
    }

    /// The normalized currency code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The number of decimal places of the smallest unit
    pub fn decimal_places(&self) -> u8 {
        self.decimal_places
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// A numeric ledger identifier derived from a currency
///
/// The nine decimal digits are laid out as `[decimal places + 100][6-digit code]`.
/// Codes of up to three characters are encoded positionally below 500000 and
/// can be decoded again, longer codes are hashed into 500000-999999.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct LedgerCode(u32);

impl LedgerCode {
    /// Wraps a raw ledger code, e.g. one read from the external ledger
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw ledger code
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// The decimal precision stored in the top three digits
    ///
    /// Returns `None` if the prefix is outside 100-199.
    pub fn decimal_places(&self) -> Option<u8> {
        let prefix = self.0 / CODE_SPACE;
        prefix
            .checked_sub(DECIMAL_OFFSET)
            .filter(|decimal| *decimal <= MAX_DECIMAL_PLACES as u32)
            .map(|decimal| decimal as u8)
    }

    /// The currency part stored in the bottom six digits
    pub const fn code_value(&self) -> u32 {
        self.0 % CODE_SPACE
    }

    /// Recovers a positionally encoded currency code
    ///
    /// Returns `None` for hashed codes, which cannot be reversed.
    pub fn short_code(&self) -> Option<String> {
        let mut value = self.code_value();
        if value >= HASHED_CODE_OFFSET {
            return None;
        }

        let mut slots = [0u32; 3];
        for slot in slots.iter_mut().rev() {
            *slot = value % 100;
            value /= 100;
        }

        let code = slots
            .iter()
            .filter_map(|slot| match slot {
                1..=9 => char::from_digit(*slot, 10),
                10..=35 => Some((b'A' + (*slot - 10) as u8) as char),
                _ => None,
            })
            .collect();
        Some(code)
    }
}

impl From<LedgerCode> for u32 {
    fn from(code: LedgerCode) -> Self {
        code.0
    }
}

impl fmt::Display for LedgerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps a value to and from the external ledger's numeric ledger code
pub trait LedgerCodec {
    /// The deterministic ledger code
    fn encode_ledger(&self) -> LedgerCode;

    /// A human readable description of the ledger code,
    /// formatted as `decimal=<places>, currency=<code>`
    fn decode_ledger(&self) -> String;
}

impl LedgerCodec for Currency {
    fn encode_ledger(&self) -> LedgerCode {
        let decimal_part = self.decimal_places as u32 + DECIMAL_OFFSET;

        let code_value = if self.code.len() <= 3 {
            let bytes = self.code.as_bytes();
            (0..3).fold(0, |acc, i| {
                let slot = match bytes.get(i) {
                    Some(c @ b'A'..=b'Z') => (c - b'A') as u32 + 10,
                    Some(c @ b'0'..=b'9') => (c - b'0') as u32,
                    // padding and unsupported characters
                    _ => 0,
                };
                acc * 100 + slot
            })
        } else {
            HASHED_CODE_OFFSET + fnv1a(&self.code) % HASHED_CODE_OFFSET
        };

        LedgerCode(decimal_part * CODE_SPACE + code_value)
    }

    fn decode_ledger(&self) -> String {
        let ledger = self.encode_ledger();
        let decimal_places = ledger.decimal_places().unwrap_or(self.decimal_places);
        // hashed codes fall back to the stored code
        let code = ledger
            .short_code()
            .unwrap_or_else(|| self.code.to_string());

        format!("decimal={}, currency={}", decimal_places, code)
    }
}

/// 32-bit FNV-1a over the characters of `code`
fn fnv1a(code: &str) -> u32 {
    code.chars().fold(2_166_136_261u32, |hash, c| {
        (hash ^ c as u32).wrapping_mul(16_777_619)
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    macro_rules! currency_test {
        ($name:ident $code:literal, $decimal:literal => Ok($expected:literal)) => {
            #[test]
            fn $name() {
                let currency = Currency::new($code, $decimal).unwrap();
                assert_eq!(currency.code(), $expected);
                assert_eq!(currency.decimal_places(), $decimal);
            }
        };
        ($name:ident $code:literal, $decimal:literal => Err($err:pat)) => {
            #[test]
            fn $name() {
                let err = Currency::new($code, $decimal).unwrap_err();
                assert!(matches!(err, $err), "unexpected error {:?}", err);
            }
        };
    }

    currency_test!(new_usd "USD", 2 => Ok("USD"));
    currency_test!(new_zero_decimals "VND", 0 => Ok("VND"));
    currency_test!(new_trimmed "  usd  ", 2 => Ok("USD"));
    currency_test!(new_single_char "a", 1 => Ok("A"));
    currency_test!(new_max_length "custom", 12 => Ok("CUSTOM"));
    currency_test!(new_beyond_scale_table "WEI", 31 => Ok("WEI"));
    currency_test!(new_max_decimals "DOGE", 99 => Ok("DOGE"));
    currency_test!(new_decimals_too_high "USD", 100 => Err(CurrencyError::InvalidDecimalPlaces(100)));
    currency_test!(new_empty "", 2 => Err(CurrencyError::InvalidCodeLength(0)));
    currency_test!(new_blank "   ", 2 => Err(CurrencyError::InvalidCodeLength(0)));
    currency_test!(new_too_long "TOOLONG", 2 => Err(CurrencyError::InvalidCodeLength(7)));

    #[test]
    fn builtin_table() {
        let expected = [
            ("VND", 0), ("IDR", 2), ("MYR", 2), ("SGD", 2), ("THB", 2), ("PHP", 2),
            ("USD", 2), ("EUR", 2), ("USDT", 6), ("BTC", 8), ("BNB", 12), ("ETH", 18),
        ];
        assert_eq!(BUILTIN_CURRENCIES.len(), expected.len());
        for (code, decimal) in expected {
            let currency = Currency::lookup(code).unwrap();
            assert_eq!(currency.code(), code);
            assert_eq!(currency.decimal_places(), decimal);
        }
        assert_eq!(Currency::lookup(" eth "), Some(&ETH));
        assert_eq!(Currency::lookup("DOGE"), None);
    }

    #[test]
    fn encode_prefixes() {
        assert_eq!(USD.encode_ledger().value() / 1_000_000, 102);
        assert_eq!(IDR.encode_ledger().value() / 1_000_000, 102);
        assert_eq!(VND.encode_ledger().value() / 1_000_000, 100);
        assert_eq!(ETH.encode_ledger().value() / 1_000_000, 118);
    }

    #[test]
    fn encode_short_codes() {
        // U=30 S=28 D=13
        assert_eq!(USD.encode_ledger(), LedgerCode::new(102_302_813));
        // E=14 T=29 H=17
        assert_eq!(ETH.encode_ledger(), LedgerCode::new(118_142_917));
        assert_eq!(Currency::new("A", 1).unwrap().encode_ledger(), LedgerCode::new(101_100_000));
        assert_eq!(Currency::new("A1", 0).unwrap().encode_ledger(), LedgerCode::new(100_100_100));
        // unsupported characters count as padding
        assert_eq!(Currency::new("A-B", 0).unwrap().encode_ledger(), LedgerCode::new(100_100_011));
    }

    #[test]
    fn encode_long_codes_are_hashed() {
        let ledger = USDT.encode_ledger();
        assert_eq!(ledger.decimal_places(), Some(6));
        assert!((500_000..1_000_000).contains(&ledger.code_value()));
        assert_eq!(ledger.short_code(), None);
        assert_eq!(Currency::new("usdt", 6).unwrap().encode_ledger(), ledger);
        assert_eq!(ledger.code_value(), 500_000 + fnv1a("USDT") % 500_000);
    }

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(""), 2_166_136_261);
        assert_eq!(fnv1a("a"), 0xe40c292c);
    }

    #[test]
    fn decode_builtins() {
        for currency in &BUILTIN_CURRENCIES {
            let decoded = currency.decode_ledger();
            assert_eq!(
                decoded,
                format!("decimal={}, currency={}", currency.decimal_places(), currency.code()),
            );
        }
    }

    #[test]
    fn decode_invalid_prefix() {
        assert_eq!(LedgerCode::new(42).decimal_places(), None);
        assert_eq!(LedgerCode::new(200_000_000).decimal_places(), None);
        assert_eq!(LedgerCode::new(199_000_000).decimal_places(), Some(99));
    }

    proptest! {
        #[test]
        fn short_codes_round_trip(code in "[A-Z1-9]{1,3}", decimal in 0u8..=99) {
            let currency = Currency::new(&code, decimal).unwrap();
            let ledger = currency.encode_ledger();
            prop_assert_eq!(ledger.decimal_places(), Some(decimal));
            prop_assert_eq!(ledger.short_code(), Some(code.clone()));
            prop_assert_eq!(currency.decode_ledger(), format!("decimal={}, currency={}", decimal, code));
        }

        #[test]
        fn long_codes_stay_in_hash_range(code in "[A-Z0-9]{4,6}", decimal in 0u8..=99) {
            let ledger = Currency::new(&code, decimal).unwrap().encode_ledger();
            prop_assert!(ledger.code_value() >= 500_000);
            prop_assert_eq!(ledger.decimal_places(), Some(decimal));
        }
    }
}
