pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod queue;
pub mod scheduler_worker;

pub use api_observability::{ApiConfig, LogFormat, ObservabilityConfig};
pub use app_config::AppConfig;
pub use database::{DatabaseBackend, DatabaseConfig};
pub use queue::{QueueConfig, RedisConfig};
pub use scheduler_worker::{CpuMetric, SchedulerConfig, WorkerConfig};
