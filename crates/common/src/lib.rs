pub mod error;
pub mod ids;
pub mod types;

pub use error::{Result, WorkerError};
pub use ids::*;
