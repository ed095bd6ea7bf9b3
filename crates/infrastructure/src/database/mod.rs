pub mod manager;
pub mod mysql;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool};
pub use mysql::MySqlSampleStore;
pub use sqlite::SqliteSampleStore;
