pub mod config;
pub mod error;
pub mod types;

pub use config::MrigaConfig;
pub use error::{MrigaError, Result};
pub use types::*;
