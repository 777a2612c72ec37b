use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("Config parse error: {0}")]
    Parse(String),
}
