pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use errors::*;
pub use logging::ErrorRecord;
pub use models::*;
pub use traits::*;
