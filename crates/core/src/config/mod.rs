//! 配置管理
//!
//! 配置按以下顺序合并，后者覆盖前者：内置默认值、TOML 配置文件、
//! `RESOURCE_STATUS_` 前缀环境变量、部署环境变量（`DB_HOST`、`REDIS_HOST`、`APP_API_KEY` 等）。

pub mod models;

pub use models::*;
