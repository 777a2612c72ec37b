pub mod config;
pub mod error;

pub use config::{Config, LoggingConfig, ReactorConfig, load_dotenv};
pub use error::*;
