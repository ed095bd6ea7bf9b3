pub mod sqlite_sample_store;

pub use sqlite_sample_store::SqliteSampleStore;
