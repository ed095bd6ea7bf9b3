pub mod mysql_sample_store;

pub use mysql_sample_store::MySqlSampleStore;
