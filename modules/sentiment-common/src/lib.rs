pub mod config;
pub mod error;
pub mod file_config;
pub mod types;

pub use config::Config;
pub use error::{SentimentError, ValidationError};
pub use file_config::{load_config, FileConfig};
pub use types::*;
