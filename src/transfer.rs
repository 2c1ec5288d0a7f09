use crate::{Amount, AmountError, Currency, LedgerCode, LedgerCodec, TransferFlags, Uint128};

/// A transfer as stored by the external ledger
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Transfer {
    pub id: Uint128,
    pub debit_account_id: Uint128,
    pub credit_account_id: Uint128,
    /// The amount in the smallest unit of the ledger's currency
    pub amount: Uint128,
    /// The pending transfer a post or void refers to
    pub pending_id: Uint128,
    pub user_data_128: Uint128,
    pub user_data_64: u64,
    pub user_data_32: u32,
    /// Seconds until a pending transfer expires
    pub timeout: u32,
    pub ledger: LedgerCode,
    /// The reason for, or category of, the transfer
    pub code: u16,
    pub flags: TransferFlags,
    /// The time the transfer was committed, in nanoseconds since the UNIX epoch
    ///
    /// Balance snapshots caused by this transfer carry the same timestamp.
    pub timestamp: u64,
}

/// A new transfer between two accounts
#[derive(Clone, Debug, PartialEq)]
pub struct NewTransfer {
    /// The transfer id; a new id is generated if it is zero
    pub id: Uint128,
    pub debit_account_id: Uint128,
    pub credit_account_id: Uint128,
    pub amount: Amount,
    pub user_data_128: Uint128,
    pub user_data_64: u64,
    pub user_data_32: u32,
    /// The ledger to transfer on, not needed when resolving pending transfers
    pub ledger: Option<Currency>,
    pub code: u16,
    pub flags: TransferFlags,
    pub pending_id: Uint128,
    pub timeout: u32,
    /// Only used for imported transfers
    pub timestamp: u64,
}

impl NewTransfer {
    /// A plain transfer of `amount`, on the ledger of the amount's currency
    pub fn new(debit_account_id: Uint128, credit_account_id: Uint128, amount: Amount) -> Self {
        Self {
            id: Uint128::ZERO,
            debit_account_id,
            credit_account_id,
            ledger: Some(amount.currency().clone()),
            amount,
            user_data_128: Uint128::ZERO,
            user_data_64: 0,
            user_data_32: 0,
            code: 0,
            flags: TransferFlags::default(),
            pending_id: Uint128::ZERO,
            timeout: 0,
            timestamp: 0,
        }
    }

    /// Converts this transfer into the external ledger's record, using `id`
    pub(crate) fn to_record(&self, id: Uint128) -> Result<Transfer, AmountError> {
        Ok(Transfer {
            id,
            debit_account_id: self.debit_account_id,
            credit_account_id: self.credit_account_id,
            amount: self.amount.value()?,
            pending_id: self.pending_id,
            user_data_128: self.user_data_128,
            user_data_64: self.user_data_64,
            user_data_32: self.user_data_32,
            timeout: self.timeout,
            ledger: self
                .ledger
                .as_ref()
                .map(LedgerCodec::encode_ledger)
                .unwrap_or_default(),
            code: self.code,
            flags: self.flags,
            timestamp: self.timestamp,
        })
    }
}

/// How a pending transfer is resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveState {
    /// Moves the reserved funds to the credit account
    Post,
    /// Returns the reserved funds to the debit account
    Void,
}

/// A resolution of a pending transfer
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTransfer {
    /// The id of the resolving transfer; a new id is generated if it is zero
    pub id: Uint128,
    /// The pending transfer to resolve
    pub pending_id: Uint128,
    /// The amount to resolve
    ///
    /// Posting less than the pending amount returns the remainder to the debit
    /// account, posting more fails. Voids may use a zero amount.
    pub amount: Amount,
    pub user_data_32: u32,
    pub state: ResolveState,
}

impl PendingTransfer {
    pub(crate) fn to_transfer(&self) -> NewTransfer {
        let flags = TransferFlags {
            post_pending_transfer: self.state == ResolveState::Post,
            void_pending_transfer: self.state == ResolveState::Void,
            ..TransferFlags::default()
        };

        NewTransfer {
            id: self.id,
            ledger: None,
            user_data_32: self.user_data_32,
            pending_id: self.pending_id,
            flags,
            ..NewTransfer::new(Uint128::ZERO, Uint128::ZERO, self.amount.clone())
        }
    }
}

/// Marks `transfers` as pending with `code`
///
/// Linked transfers form one chain that succeeds or fails as a whole, so every
/// transfer but the last one is flagged as linked.
pub(crate) fn mark_pending(transfers: &mut [NewTransfer], linked: bool, code: u16) {
    let last = transfers.len().saturating_sub(1);
    for (i, transfer) in transfers.iter_mut().enumerate() {
        transfer.code = code;
        transfer.flags = TransferFlags {
            pending: true,
            linked: linked && i != last,
            ..TransferFlags::default()
        };
    }
}
