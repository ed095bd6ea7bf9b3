//! # 数据模型
//!
//! 采样流水线的核心数据结构：
//!
//! - [`CollectionRequest`]：队列中的一次采集请求，带尝试次数和退避策略
//! - [`ResourceSample`]：持久化的资源采样行
//! - [`UsageStats`]：一段时间内的聚合统计
//!
//! ## 请求状态流转
//! ```text
//! Waiting → Active → Completed
//!   ↑         ↓
//! Delayed ←  (nack, attempts < max)
//!             ↓
//!           Failed (attempts ≥ max)
//! ```

pub mod request;
pub mod sample;
pub mod stats;

pub use request::*;
pub use sample::*;
pub use stats::*;
