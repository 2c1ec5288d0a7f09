use crate::{AccountFlags, Amount, Currency, LedgerCode, Uint128};

/// Possible errors to occur while preparing account creation
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Unknown account category {0}")]
    UnknownCategory(u16),
    #[error("The flags debits_must_not_exceed_credits and credits_must_not_exceed_debits are mutually exclusive")]
    ConflictingBalanceConstraints,
    #[error("The account code must not be zero")]
    ZeroCode,
}

/// An account as stored by the external ledger
///
/// Balances are raw values in the smallest unit of the account's currency.
/// See [`Account::balances`] to bind them to a currency.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Account {
    pub id: Uint128,
    pub debits_pending: Uint128,
    pub debits_posted: Uint128,
    pub credits_pending: Uint128,
    pub credits_posted: Uint128,
    pub user_data_128: Uint128,
    pub user_data_64: u64,
    pub user_data_32: u32,
    pub reserved: u32,
    pub ledger: LedgerCode,
    /// The account type, e.g. an [`AccountCategory`]
    pub code: u16,
    pub flags: AccountFlags,
    /// Creation time, in nanoseconds since the UNIX epoch
    pub timestamp: u64,
}

/// The four balances of an account, bound to its currency
#[derive(Clone, Debug, PartialEq)]
pub struct AccountBalances {
    pub debits_pending: Amount,
    pub debits_posted: Amount,
    pub credits_pending: Amount,
    pub credits_posted: Amount,
}

impl Account {
    /// Binds the raw balances of this account to `currency`
    pub fn balances(&self, currency: &Currency) -> AccountBalances {
        AccountBalances {
            debits_pending: currency.amount_from_raw(self.debits_pending),
            debits_posted: currency.amount_from_raw(self.debits_posted),
            credits_pending: currency.amount_from_raw(self.credits_pending),
            credits_posted: currency.amount_from_raw(self.credits_posted),
        }
    }
}

/// A looked up account together with its currency bound balances
#[derive(Clone, Debug, PartialEq)]
pub struct CurrencyAccount {
    pub account: Account,
    pub balances: AccountBalances,
}

/// Account categories, stored as the account code
///
/// Every category implies a set of account flags, see [`AccountCategory::flags`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AccountCategory {
    /// Source and/or destination of funds
    Control = 1000,
    /// A customer's asset account, which can never be overdrawn
    Balance = 1001,
    /// An income account, which can never be overdrawn
    Income = 1002,
    Liabilities = 1003,
    /// Accounts for tests, without history
    Testing = 9999,
}

impl AccountCategory {
    /// The account code of this category
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// The account flags every account of this category is created with
    pub fn flags(&self) -> AccountFlags {
        match self {
            Self::Control | Self::Liabilities => AccountFlags {
                history: true,
                ..AccountFlags::default()
            },
            Self::Balance | Self::Income => AccountFlags {
                history: true,
                debits_must_not_exceed_credits: true,
                ..AccountFlags::default()
            },
            Self::Testing => AccountFlags::default(),
        }
    }
}

impl TryFrom<u16> for AccountCategory {
    type Error = AccountError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1000 => Ok(Self::Control),
            1001 => Ok(Self::Balance),
            1002 => Ok(Self::Income),
            1003 => Ok(Self::Liabilities),
            9999 => Ok(Self::Testing),
            _ => Err(AccountError::UnknownCategory(code)),
        }
    }
}

/// The caller supplied part of a new account
#[derive(Clone, Debug, PartialEq)]
pub struct NewAccount {
    /// The account id; a new id is generated if it is zero
    pub id: Uint128,
    pub user_data_128: Uint128,
    pub user_data_64: u64,
    pub user_data_32: u32,
    /// The currency the account is kept in, which determines its ledger
    pub currency: Currency,
}

impl NewAccount {
    /// A new account of `currency` with a generated id
    pub fn new(currency: Currency) -> Self {
        Self {
            id: Uint128::ZERO,
            user_data_128: Uint128::ZERO,
            user_data_64: 0,
            user_data_32: 0,
            currency,
        }
    }
}

/// A new account as part of a batch
#[derive(Clone, Debug, PartialEq)]
pub struct AccountEntry {
    pub account: NewAccount,
    pub code: u16,
    pub flags: AccountFlags,
    /// Only used for imported accounts
    pub timestamp: u64,
}

impl AccountEntry {
    /// Checks the flags and code of a stand-alone account
    pub(crate) fn validate(&self) -> Result<(), AccountError> {
        if self.flags.debits_must_not_exceed_credits && self.flags.credits_must_not_exceed_debits {
            return Err(AccountError::ConflictingBalanceConstraints);
        }
        if self.code == 0 {
            return Err(AccountError::ZeroCode);
        }

        Ok(())
    }
}

/// A lookup of an account by id, and the currency to read its balances in
#[derive(Clone, Debug, PartialEq)]
pub struct AccountLookup {
    pub id: Uint128,
    pub currency: Currency,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::IDR;

    #[test]
    fn category_codes() {
        for category in [
            AccountCategory::Control,
            AccountCategory::Balance,
            AccountCategory::Income,
            AccountCategory::Liabilities,
            AccountCategory::Testing,
        ] {
            assert_eq!(AccountCategory::try_from(category.code()).unwrap(), category);
        }
        assert!(matches!(AccountCategory::try_from(1004), Err(AccountError::UnknownCategory(1004))));
        assert!(matches!(AccountCategory::try_from(0), Err(AccountError::UnknownCategory(0))));
    }

    #[test]
    fn category_flags() {
        assert_eq!(AccountCategory::Control.flags().to_string(), "history");
        assert_eq!(AccountCategory::Liabilities.flags().to_string(), "history");
        assert_eq!(AccountCategory::Balance.flags().to_string(), "debits_must_not_exceed_credits,history");
        assert_eq!(AccountCategory::Income.flags().to_string(), "debits_must_not_exceed_credits,history");
        assert!(AccountCategory::Testing.flags().is_empty());
    }

    #[test]
    fn entry_validation() {
        let mut entry = AccountEntry {
            account: NewAccount::new(IDR),
            code: AccountCategory::Balance.code(),
            flags: AccountCategory::Balance.flags(),
            timestamp: 0,
        };
        assert!(entry.validate().is_ok());

        entry.flags.credits_must_not_exceed_debits = true;
        assert!(matches!(entry.validate(), Err(AccountError::ConflictingBalanceConstraints)));

        entry.flags.credits_must_not_exceed_debits = false;
        entry.code = 0;
        assert!(matches!(entry.validate(), Err(AccountError::ZeroCode)));
    }

    #[test]
    fn balances_are_bound_to_the_currency() {
        let account = Account {
            credits_posted: Uint128::from_u64(2_000_050),
            debits_pending: Uint128::from_u64(50),
            ..Account::default()
        };
        let balances = account.balances(&IDR);
        assert_eq!(balances.credits_posted.to_string(), "IDR 20,000.50");
        assert_eq!(balances.debits_pending.to_string(), "IDR 0.50");
        assert_eq!(balances.debits_posted.to_string(), "IDR 0.00");
    }
}
