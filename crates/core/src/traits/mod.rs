pub mod metrics_source;
pub mod sample_store;
pub mod work_queue;

pub use metrics_source::*;
pub use sample_store::*;
pub use work_queue::*;
