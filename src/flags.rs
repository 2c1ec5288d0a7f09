use std::fmt;

/// Generates a flag set made of named booleans, mapped onto the bits of `$bits`
///
/// The set (de)serializes as its bit representation and displays as a
/// comma separated list of the enabled flag names.
macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $name:ident: $bits:ty as $bits_str:tt {
            $($(#[$field_meta:meta])* $field:ident = $bit:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(from = $bits_str, into = $bits_str)]
        pub struct $name {
            $($(#[$field_meta])* pub $field: bool,)+
        }

        impl $name {
            /// The bit representation used by the external ledger
            pub const fn bits(&self) -> $bits {
                let mut bits = 0;
                $(if self.$field { bits |= 1 << $bit; })+
                bits
            }

            /// Reads a bit representation, ignoring unknown bits
            pub const fn from_bits(bits: $bits) -> Self {
                Self {
                    $($field: bits & (1 << $bit) != 0,)+
                }
            }

            pub const fn is_empty(&self) -> bool {
                self.bits() == 0
            }
        }

        impl From<$bits> for $name {
            fn from(bits: $bits) -> Self {
                Self::from_bits(bits)
            }
        }

        impl From<$name> for $bits {
            fn from(flags: $name) -> Self {
                flags.bits()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut names = Vec::new();
                $(
                    if self.$field {
                        names.push(stringify!($field));
                    }
                )+
                f.write_str(&names.join(","))
            }
        }
    };
}

flag_set! {
    /// Behavior flags of an account
    AccountFlags: u16 as "u16" {
        /// The account is created atomically together with the next one
        linked = 0,
        debits_must_not_exceed_credits = 1,
        credits_must_not_exceed_debits = 2,
        /// The ledger keeps a balance snapshot for every change of the account
        history = 3,
        imported = 4,
        closed = 5,
    }
}

flag_set! {
    /// Behavior flags of a transfer
    TransferFlags: u16 as "u16" {
        /// The transfer succeeds or fails together with the next one
        linked = 0,
        /// The transfer only reserves funds until it is posted or voided
        pending = 1,
        post_pending_transfer = 2,
        void_pending_transfer = 3,
        balancing_debit = 4,
        balancing_credit = 5,
        closing_debit = 6,
        closing_credit = 7,
        imported = 8,
    }
}

flag_set! {
    /// Query flags for balance and transfer lookups of an account
    AccountFilterFlags: u32 as "u32" {
        /// Include transfers where the account is debited
        debits = 0,
        /// Include transfers where the account is credited
        credits = 1,
        /// Return results in descending timestamp order
        reversed = 2,
    }
}
