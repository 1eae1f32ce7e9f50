pub mod aggregator;
pub mod snapshot;

pub use aggregator::Aggregator;
pub use snapshot::{Progress, RankedEntry, Summary};
