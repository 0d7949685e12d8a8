pub mod rewards;
pub mod snapshot;
pub mod sum;
