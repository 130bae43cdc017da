use thiserror::Error;

/// Errors that can occur in resource collectors
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to query system metrics: {0}")]
    SystemQuery(String),

    #[error("Process {0} is no longer accessible: {1}")]
    ProcessGone(i32, String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur when exporting metric samples
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to serialize sample: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Push endpoint rejected batch: {0}")]
    PushFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during trace analysis
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}
