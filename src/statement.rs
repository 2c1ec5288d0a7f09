use std::collections::{hash_map::Entry, HashMap};

use crate::{Amount, AmountError, Arithmetic, Currency, LedgerCode, Transfer, TransferFlags, Uint128};

/// A balance snapshot of an account, as returned by the external ledger
///
/// The ledger records one snapshot per balance change, carrying the timestamp of
/// the transfer that caused it.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AccountBalance {
    pub debits_pending: Uint128,
    pub debits_posted: Uint128,
    pub credits_pending: Uint128,
    pub credits_posted: Uint128,
    /// Nanoseconds since the UNIX epoch
    pub timestamp: u64,
}

/// The identifying fields of a statement line, handed to enrichment closures
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineKey {
    pub id: Uint128,
    pub user_data_128: Uint128,
    pub user_data_64: u64,
    pub user_data_32: u32,
    pub code: u16,
    pub flags: TransferFlags,
    pub timestamp: u64,
}

/// One transfer of a statement, with the account balance around it
#[derive(Clone, Debug, PartialEq)]
pub struct StatementLine<T = ()> {
    id: Uint128,
    debit_account_id: Uint128,
    credit_account_id: Uint128,
    debit: Amount,
    credit: Amount,
    balance_before: Amount,
    balance_after: Amount,
    user_data_128: Uint128,
    user_data_64: u64,
    user_data_32: u32,
    timestamp: u64,
    ledger: LedgerCode,
    code: u16,
    flags: TransferFlags,
    is_debit: bool,
    additional: T,
}

impl<T> StatementLine<T> {
    /// The transfer id
    pub fn id(&self) -> Uint128 {
        self.id
    }

    pub fn debit_account_id(&self) -> Uint128 {
        self.debit_account_id
    }

    pub fn credit_account_id(&self) -> Uint128 {
        self.credit_account_id
    }

    /// The debited amount, zero for credit lines
    pub fn debit(&self) -> &Amount {
        &self.debit
    }

    /// The credited amount, zero for debit lines
    pub fn credit(&self) -> &Amount {
        &self.credit
    }

    /// The balance before the transfer
    pub fn balance_before(&self) -> &Amount {
        &self.balance_before
    }

    /// The balance after the transfer
    pub fn balance_after(&self) -> &Amount {
        &self.balance_after
    }

    pub fn user_data_128(&self) -> Uint128 {
        self.user_data_128
    }

    pub fn user_data_64(&self) -> u64 {
        self.user_data_64
    }

    pub fn user_data_32(&self) -> u32 {
        self.user_data_32
    }

    /// Nanoseconds since the UNIX epoch
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn ledger(&self) -> LedgerCode {
        self.ledger
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn flags(&self) -> TransferFlags {
        self.flags
    }

    /// The data attached by the enrichment closure
    pub fn additional(&self) -> &T {
        &self.additional
    }

    /// Whether the transfer reduced the balance of the account
    pub fn is_debit(&self) -> bool {
        self.is_debit
    }
}

impl<T> serde::Serialize for StatementLine<T>
where
    T: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where S: serde::Serializer
    {
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("StatementLine", 15)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("debit_account_id", &self.debit_account_id)?;
        s.serialize_field("credit_account_id", &self.credit_account_id)?;
        s.serialize_field("debit", &self.debit.to_string())?;
        s.serialize_field("credit", &self.credit.to_string())?;
        s.serialize_field("balance_before", &self.balance_before.to_string())?;
        s.serialize_field("balance_after", &self.balance_after.to_string())?;
        s.serialize_field("user_data_128", &self.user_data_128)?;
        s.serialize_field("user_data_64", &self.user_data_64)?;
        s.serialize_field("user_data_32", &self.user_data_32)?;
        s.serialize_field("timestamp", &self.timestamp)?;
        s.serialize_field("ledger", &self.ledger)?;
        s.serialize_field("code", &self.code)?;
        s.serialize_field("flags", &self.flags)?;
        s.serialize_field("additional", &self.additional)?;
        s.end()
    }
}

/// Why a transfer is missing from a statement
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("No balance snapshot matches the transfer timestamp")]
    MissingSnapshot,
    #[error("The balance before or after the transfer overflows")]
    BalanceOverflow,
    #[error("The balance before or after the transfer is negative")]
    BalanceUnderflow,
}

impl From<AmountError> for SkipReason {
    fn from(error: AmountError) -> Self {
        match error {
            AmountError::ArithmeticUnderflow => Self::BalanceUnderflow,
            _ => Self::BalanceOverflow,
        }
    }
}

/// A transfer left out of a statement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SkippedTransfer {
    pub id: Uint128,
    pub reason: SkipReason,
}

/// The reconstructed statement of one account
#[derive(Clone, Debug, PartialEq)]
pub struct Statement<T = ()> {
    /// One line per transfer, in the order of the transfers
    pub lines: Vec<StatementLine<T>>,
    /// Transfers without a consistent balance snapshot
    pub skipped: Vec<SkippedTransfer>,
}

/// Reconstructs the statement of `account_id` from its transfers and balance snapshots
///
/// See [`reconstruct_with`].
pub fn reconstruct(
    account_id: Uint128,
    currency: &Currency,
    transfers: &[Transfer],
    balances: &[AccountBalance],
) -> Statement {
    reconstruct_with(account_id, currency, transfers, balances, |_| ())
}

/// Reconstructs the statement of `account_id`, attaching `enrich(key)` to every line
///
/// Every transfer is matched with the snapshot of the same timestamp, which holds
/// the balance right after the transfer. Transfers debiting the account are debit
/// lines, unless they void a pending transfer, which returns the funds. Posting a
/// pending debit does not change the balance again and produces no line.
///
/// Transfers without a matching snapshot, or whose balances do not fit into the
/// unsigned range, are reported in [`Statement::skipped`] instead of failing
/// the whole statement. The output does not depend on the order of `balances`;
/// if two snapshots share a timestamp, the first one is used.
pub fn reconstruct_with<T, F>(
    account_id: Uint128,
    currency: &Currency,
    transfers: &[Transfer],
    balances: &[AccountBalance],
    mut enrich: F,
) -> Statement<T>
where
    F: FnMut(&LineKey) -> T,
{
    let mut snapshots = HashMap::with_capacity(balances.len());
    for balance in balances {
        match snapshots.entry(balance.timestamp) {
            Entry::Vacant(entry) => {
                entry.insert(balance);
            }
            Entry::Occupied(_) => {
                tracing::warn!(timestamp = balance.timestamp, "duplicate balance snapshot ignored");
            }
        }
    }

    let mut statement = Statement {
        lines: Vec::with_capacity(transfers.len()),
        skipped: Vec::new(),
    };

    for transfer in transfers {
        // voiding returns the reserved funds to the debited account
        let is_debit = transfer.debit_account_id == account_id && !transfer.flags.void_pending_transfer;
        if is_debit && transfer.flags.post_pending_transfer {
            continue;
        }

        let snapshot = match snapshots.get(&transfer.timestamp) {
            Some(snapshot) => *snapshot,
            None => {
                tracing::warn!(id = %transfer.id, timestamp = transfer.timestamp, "no balance snapshot for transfer");
                statement.skipped.push(SkippedTransfer {
                    id: transfer.id,
                    reason: SkipReason::MissingSnapshot,
                });
                continue;
            }
        };

        match line(currency, transfer, snapshot, is_debit) {
            Ok((debit, credit, balance_before, balance_after)) => {
                let key = LineKey {
                    id: transfer.id,
                    user_data_128: transfer.user_data_128,
                    user_data_64: transfer.user_data_64,
                    user_data_32: transfer.user_data_32,
                    code: transfer.code,
                    flags: transfer.flags,
                    timestamp: transfer.timestamp,
                };
                statement.lines.push(StatementLine {
                    id: transfer.id,
                    debit_account_id: transfer.debit_account_id,
                    credit_account_id: transfer.credit_account_id,
                    debit,
                    credit,
                    balance_before,
                    balance_after,
                    user_data_128: transfer.user_data_128,
                    user_data_64: transfer.user_data_64,
                    user_data_32: transfer.user_data_32,
                    timestamp: transfer.timestamp,
                    ledger: transfer.ledger,
                    code: transfer.code,
                    flags: transfer.flags,
                    is_debit,
                    additional: enrich(&key),
                });
            }
            Err(reason) => {
                tracing::warn!(id = %transfer.id, %reason, "transfer skipped");
                statement.skipped.push(SkippedTransfer { id: transfer.id, reason });
            }
        }
    }

    tracing::debug!(
        account = %account_id,
        lines = statement.lines.len(),
        skipped = statement.skipped.len(),
        "statement reconstructed"
    );

    statement
}

/// Computes debit, credit, balance before and balance after of a single transfer
fn line(
    currency: &Currency,
    transfer: &Transfer,
    snapshot: &AccountBalance,
    is_debit: bool,
) -> Result<(Amount, Amount, Amount, Amount), SkipReason> {
    let debits = currency
        .amount_from_raw(snapshot.debits_pending)
        .checked_add(snapshot.debits_posted)?;
    let balance_after = currency
        .amount_from_raw(snapshot.credits_posted)
        .checked_sub(debits)?;
    let balance_after = currency.amount_from_raw(balance_after);
    let amount = currency.amount_from_raw(transfer.amount);

    Ok(match is_debit {
        true => {
            let balance_before = balance_after.checked_add(transfer.amount)?;
            (amount, currency.amount(), currency.amount_from_raw(balance_before), balance_after)
        }
        false => {
            let balance_before = balance_after.checked_sub(transfer.amount)?;
            (currency.amount(), amount, currency.amount_from_raw(balance_before), balance_after)
        }
    })
}
