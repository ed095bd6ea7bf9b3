pub mod collector;
pub mod service;

pub use collector::{bytes_to_mb, normalize, select_filesystem, SysinfoMetricsSource};
pub use service::{
    default_worker_id, CollectionWorker, CollectionWorkerBuilder, ProcessingStage, WorkerEvent,
};
