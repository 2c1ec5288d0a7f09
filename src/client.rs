use std::collections::HashMap;
use std::error::Error;

use chrono::{DateTime, Utc};

use crate::{
    reconstruct_with, transfer::mark_pending, Account, AccountBalance, AccountCategory, AccountEntry, AccountError,
    AccountFilterFlags, AccountFlags, AccountLookup, AmountError, Currency, CurrencyAccount, LedgerCodec, LineKey, NewAccount,
    NewTransfer, PendingTransfer, Statement, Transfer, Uint128,
};

/// The maximum number of records the external ledger accepts or returns per request
pub const MAX_BATCH: usize = 8190;

/// Possible errors to occur while talking to the external ledger
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("The ledger service failed: {0}")]
    Service(#[source] Box<dyn Error + Send + Sync>),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("The batch holds {len} items, at most 8190 are allowed")]
    ExceedsMaxBatch { len: usize },
    #[error("The batch is empty")]
    EmptyBatch,
    #[error("Invalid filter: {0}")]
    Validation(&'static str),
}

/// The outcome of a single record of a create request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateStatus {
    Created,
    /// A record with the same id and fields already exists
    Exists,
    /// The ledger rejected the record, with its reason
    Rejected(String),
}

/// A record of a create request that was not simply created
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateFailure {
    /// The index of the record in the request
    pub index: usize,
    pub status: CreateStatus,
}

/// The query sent to the external ledger for balance and transfer lookups
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AccountFilter {
    pub account_id: Uint128,
    pub user_data_128: Uint128,
    pub user_data_64: u64,
    pub user_data_32: u32,
    pub code: u16,
    /// Inclusive lower bound, in nanoseconds since the UNIX epoch
    pub timestamp_min: u64,
    /// Inclusive upper bound, in nanoseconds since the UNIX epoch
    pub timestamp_max: u64,
    pub limit: u32,
    pub flags: AccountFilterFlags,
}

/// The external ledger service
///
/// Create calls only report the records that were not created, the same way
/// the ledger's wire protocol does.
pub trait LedgerService {
    type Error: Error + Send + Sync + 'static;

    fn create_accounts(&self, accounts: &[Account]) -> Result<Vec<CreateFailure>, Self::Error>;

    fn create_transfers(&self, transfers: &[Transfer]) -> Result<Vec<CreateFailure>, Self::Error>;

    fn lookup_accounts(&self, ids: &[Uint128]) -> Result<Vec<Account>, Self::Error>;

    fn get_account_balances(&self, filter: &AccountFilter) -> Result<Vec<AccountBalance>, Self::Error>;

    fn get_account_transfers(&self, filter: &AccountFilter) -> Result<Vec<Transfer>, Self::Error>;
}

/// The outcome of one record of a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventResult {
    pub index: usize,
    /// The id of the record, generated if none was given
    pub id: Uint128,
    pub status: CreateStatus,
}

impl EventResult {
    pub fn is_success(&self) -> bool {
        self.status == CreateStatus::Created
    }
}

/// The outcome of a whole batch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventResults {
    pub success_count: usize,
    pub failed_count: usize,
    /// One result per record, in request order
    pub results: Vec<EventResult>,
}

impl EventResults {
    /// Merges the failures reported by the ledger into per record results
    ///
    /// `exists_is_success` decides whether an already existing record counts
    /// as a success. Failures with an index outside of `ids` are ignored.
    fn new(ids: Vec<Uint128>, failures: Vec<CreateFailure>, exists_is_success: bool) -> Self {
        let mut results = Self {
            success_count: ids.len(),
            failed_count: 0,
            results: ids
                .into_iter()
                .enumerate()
                .map(|(index, id)| EventResult {
                    index,
                    id,
                    status: CreateStatus::Created,
                })
                .collect(),
        };

        for failure in failures {
            let result = match results.results.get_mut(failure.index) {
                Some(result) => result,
                None => continue,
            };

            let failed = match failure.status {
                CreateStatus::Created => false,
                CreateStatus::Exists => !exists_is_success,
                CreateStatus::Rejected(_) => true,
            };
            if failed && result.status == CreateStatus::Created {
                results.success_count -= 1;
                results.failed_count += 1;
            }
            result.status = failure.status;
        }

        results
    }
}

/// The filter of balance, transfer and statement queries
#[derive(Clone, Debug, PartialEq)]
pub struct StatementFilter {
    /// Inclusive lower time bound; required
    pub time_min: Option<DateTime<Utc>>,
    /// Inclusive upper time bound; required
    pub time_max: Option<DateTime<Utc>>,
    /// Must be neither zero nor `2^128 - 1`
    pub account_id: Uint128,
    /// Zero disables the filter
    pub user_data_128: Uint128,
    /// Zero disables the filter
    pub user_data_64: u64,
    /// Zero disables the filter
    pub user_data_32: u32,
    /// Clamped to `1..=8190`
    pub limit: u32,
    /// Zero disables the filter
    pub code: u16,
    /// The currency the account is kept in
    pub currency: Currency,
    /// No flags, or only `reversed`, query both debits and credits
    pub flags: AccountFilterFlags,
}

impl StatementFilter {
    /// A filter for all transfers of `account_id` between `time_min` and `time_max`
    pub fn new(account_id: Uint128, currency: Currency, time_min: DateTime<Utc>, time_max: DateTime<Utc>) -> Self {
        Self {
            time_min: Some(time_min),
            time_max: Some(time_max),
            account_id,
            user_data_128: Uint128::ZERO,
            user_data_64: 0,
            user_data_32: 0,
            limit: MAX_BATCH as u32,
            code: 0,
            currency,
            flags: AccountFilterFlags::default(),
        }
    }

    /// Validates this filter and converts it into the ledger's query
    pub fn to_account_filter(&self) -> Result<AccountFilter, ClientError> {
        if self.account_id.is_zero() {
            return Err(ClientError::Validation("account id must not be zero"));
        }
        if self.account_id == Uint128::MAX {
            return Err(ClientError::Validation("account id must not be 2^128 - 1"));
        }
        let timestamp_min = nanos(self.time_min).ok_or(ClientError::Validation("time min is required"))?;
        let timestamp_max = nanos(self.time_max).ok_or(ClientError::Validation("time max is required"))?;

        let mut flags = self.flags;
        if !flags.debits && !flags.credits {
            flags.debits = true;
            flags.credits = true;
        }

        Ok(AccountFilter {
            account_id: self.account_id,
            user_data_128: self.user_data_128,
            user_data_64: self.user_data_64,
            user_data_32: self.user_data_32,
            code: self.code,
            timestamp_min,
            timestamp_max,
            limit: self.limit.clamp(1, MAX_BATCH as u32),
            flags,
        })
    }
}

/// Nanoseconds since the UNIX epoch, if set and representable
fn nanos(time: Option<DateTime<Utc>>) -> Option<u64> {
    time.and_then(|time| time.timestamp_nanos_opt())
        .and_then(|nanos| u64::try_from(nanos).ok())
        .filter(|nanos| *nanos != 0)
}

/// A client of the external ledger, working in currencies and amounts
#[derive(Debug)]
pub struct Ledger<S> {
    service: S,
}

impl<S: LedgerService> Ledger<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// The wrapped service
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Creates a batch of accounts
    ///
    /// Accounts without an id get a generated one. Already existing accounts
    /// count as successes.
    pub fn create_account_batch(&self, entries: &[AccountEntry]) -> Result<EventResults, ClientError> {
        check_batch(entries.len())?;

        let records = entries
            .iter()
            .map(|entry| Account {
                id: id_or_new(entry.account.id),
                user_data_128: entry.account.user_data_128,
                user_data_64: entry.account.user_data_64,
                user_data_32: entry.account.user_data_32,
                ledger: entry.account.currency.encode_ledger(),
                code: entry.code,
                flags: entry.flags,
                timestamp: entry.timestamp,
                ..Account::default()
            })
            .collect::<Vec<_>>();

        let failures = self.service.create_accounts(&records).map_err(service_error)?;
        let results = EventResults::new(records.iter().map(|record| record.id).collect(), failures, true);
        tracing::debug!(
            success = results.success_count,
            failed = results.failed_count,
            "accounts created"
        );

        Ok(results)
    }

    /// Creates a single, stand-alone account
    ///
    /// The `linked` and `imported` flags are cleared.
    pub fn create_account(&self, account: NewAccount, code: u16, mut flags: AccountFlags) -> Result<EventResult, ClientError> {
        flags.linked = false;
        flags.imported = false;
        let entry = AccountEntry {
            account,
            code,
            flags,
            timestamp: 0,
        };
        entry.validate()?;

        self.create_account_batch(std::slice::from_ref(&entry))?
            .results
            .pop()
            .ok_or(ClientError::EmptyBatch)
    }

    /// Creates accounts of the category `code`, with the flags of that category
    ///
    /// Multiple accounts are created atomically: if one fails, all fail.
    pub fn create_accounts_with_category(&self, code: u16, accounts: Vec<NewAccount>) -> Result<EventResults, ClientError> {
        check_batch(accounts.len())?;
        let category = AccountCategory::try_from(code)?;
        let flags = category.flags();

        if accounts.len() == 1 {
            let account = accounts.into_iter().next().ok_or(ClientError::EmptyBatch)?;
            let result = self.create_account(account, category.code(), flags)?;
            let failed = !matches!(result.status, CreateStatus::Created | CreateStatus::Exists);
            return Ok(EventResults {
                success_count: usize::from(!failed),
                failed_count: usize::from(failed),
                results: vec![result],
            });
        }

        let last = accounts.len() - 1;
        let entries = accounts
            .into_iter()
            .enumerate()
            .map(|(i, account)| AccountEntry {
                account,
                code: category.code(),
                flags: AccountFlags {
                    linked: i != last,
                    ..flags
                },
                timestamp: 0,
            })
            .collect::<Vec<_>>();

        self.create_account_batch(&entries)
    }

    /// Looks up accounts and binds their balances to the currency of each lookup
    ///
    /// Unknown accounts are missing from the result.
    pub fn lookup_accounts(&self, lookups: &[AccountLookup]) -> Result<Vec<CurrencyAccount>, ClientError> {
        if lookups.len() > MAX_BATCH {
            return Err(ClientError::ExceedsMaxBatch { len: lookups.len() });
        }

        let currencies = lookups
            .iter()
            .map(|lookup| (lookup.id, &lookup.currency))
            .collect::<HashMap<_, _>>();
        let ids = lookups.iter().map(|lookup| lookup.id).collect::<Vec<_>>();

        let accounts = self.service.lookup_accounts(&ids).map_err(service_error)?;
        let accounts = accounts
            .into_iter()
            .filter_map(|account| match currencies.get(&account.id) {
                Some(currency) => Some(CurrencyAccount {
                    balances: account.balances(currency),
                    account,
                }),
                None => {
                    tracing::warn!(id = %account.id, "no currency for looked up account");
                    None
                }
            })
            .collect();

        Ok(accounts)
    }

    /// Creates a batch of transfers
    ///
    /// Transfers without an id get a generated one. Already existing transfers
    /// count as failures.
    pub fn create_transfers(&self, transfers: &[NewTransfer]) -> Result<EventResults, ClientError> {
        check_batch(transfers.len())?;

        let records = transfers
            .iter()
            .map(|transfer| transfer.to_record(id_or_new(transfer.id)))
            .collect::<Result<Vec<_>, _>>()?;

        let failures = self.service.create_transfers(&records).map_err(service_error)?;
        let results = EventResults::new(records.iter().map(|record| record.id).collect(), failures, false);
        tracing::debug!(
            success = results.success_count,
            failed = results.failed_count,
            "transfers created"
        );

        Ok(results)
    }

    /// Creates pending transfers with `code`, which reserve funds until resolved
    ///
    /// Linked transfers succeed or fail together.
    pub fn create_pending_transfers(
        &self,
        mut transfers: Vec<NewTransfer>,
        linked: bool,
        code: u16,
    ) -> Result<EventResults, ClientError> {
        mark_pending(&mut transfers, linked, code);
        self.create_transfers(&transfers)
    }

    /// Posts or voids pending transfers
    pub fn resolve_pending_transfers(&self, pendings: &[PendingTransfer]) -> Result<EventResults, ClientError> {
        let transfers = pendings.iter().map(PendingTransfer::to_transfer).collect::<Vec<_>>();
        self.create_transfers(&transfers)
    }

    /// The balance snapshots of an account, at most 8190
    pub fn historical_balances(&self, filter: &StatementFilter) -> Result<Vec<AccountBalance>, ClientError> {
        let filter = filter.to_account_filter()?;
        self.service.get_account_balances(&filter).map_err(service_error)
    }

    /// The transfers of an account, at most 8190
    pub fn account_transfers(&self, filter: &StatementFilter) -> Result<Vec<Transfer>, ClientError> {
        let filter = filter.to_account_filter()?;
        self.service.get_account_transfers(&filter).map_err(service_error)
    }

    /// The statement of an account
    pub fn account_statements(&self, filter: &StatementFilter) -> Result<Statement, ClientError> {
        self.account_statements_with(filter, |_| ())
    }

    /// The statement of an account, with `enrich(key)` attached to every line
    pub fn account_statements_with<T, F>(&self, filter: &StatementFilter, enrich: F) -> Result<Statement<T>, ClientError>
    where
        F: FnMut(&LineKey) -> T,
    {
        let account_filter = filter.to_account_filter()?;
        let balances = self.service.get_account_balances(&account_filter).map_err(service_error)?;
        let transfers = self.service.get_account_transfers(&account_filter).map_err(service_error)?;

        Ok(reconstruct_with(
            filter.account_id,
            &filter.currency,
            &transfers,
            &balances,
            enrich,
        ))
    }
}

fn check_batch(len: usize) -> Result<(), ClientError> {
    match len {
        0 => Err(ClientError::EmptyBatch),
        len if len > MAX_BATCH => Err(ClientError::ExceedsMaxBatch { len }),
        _ => Ok(()),
    }
}

fn id_or_new(id: Uint128) -> Uint128 {
    match id.is_zero() {
        true => Uint128::new_id(),
        false => id,
    }
}

fn service_error<E: Error + Send + Sync + 'static>(error: E) -> ClientError {
    ClientError::Service(Box::new(error))
}
