pub mod estimates;
pub mod expenses;
pub mod transactions;

pub use estimates::EstimateAggregator;
pub use expenses::ExpenseAggregator;
pub use transactions::LedgerQueries;
