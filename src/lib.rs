pub use self::{
    account::{
        Account, AccountBalances, AccountCategory, AccountEntry, AccountError, AccountLookup, CurrencyAccount,
        NewAccount,
    },
    amount::{scale_for, Amount, AmountError, Arithmetic},
    client::{
        AccountFilter, ClientError, CreateFailure, CreateStatus, EventResult, EventResults, Ledger, LedgerService,
        StatementFilter, MAX_BATCH,
    },
    currency::{Currency, CurrencyError, LedgerCode, LedgerCodec, BUILTIN_CURRENCIES},
    flags::{AccountFilterFlags, AccountFlags, TransferFlags},
    statement::{
        reconstruct, reconstruct_with, AccountBalance, LineKey, SkipReason, SkippedTransfer, Statement,
        StatementLine,
    },
    transfer::{NewTransfer, PendingTransfer, ResolveState, Transfer},
    uint128::{Uint128, Uint128Error},
};

mod account;
mod amount;
mod client;
/// Currency descriptors and the built-in currencies
pub mod currency;
mod flags;
mod statement;
mod transfer;
mod uint128;
