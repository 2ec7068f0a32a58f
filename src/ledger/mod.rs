pub mod memory;
pub mod models;
pub mod period;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use models::RecordKind;
pub use period::Calendar;
pub use postgres::PgStore;
pub use store::LedgerStore;
