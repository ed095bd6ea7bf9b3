pub mod database;
pub mod in_memory_queue;
pub mod observability;
pub mod redis_queue;

pub use database::*;
pub use in_memory_queue::{InMemoryQueueConfig, InMemoryWorkQueue};
pub use observability::*;
pub use redis_queue::{RedisConnectionManager, RedisWorkQueue};
