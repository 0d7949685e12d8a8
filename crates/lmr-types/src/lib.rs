//! Shared scalar types for the ledger mirror: fixed-scale decimal amounts,
//! ledger record-times, and defensive JSON field selection.

mod amount;
pub mod select;
mod time;

pub use amount::{Amount, AmountError, SCALE};
pub use time::RecordTime;

/// Ledger migration epoch. Snapshots and update-log cursors are scoped to one.
pub type MigrationId = u64;
