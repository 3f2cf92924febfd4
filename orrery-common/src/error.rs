use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum OrreryError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Validation Error: {0}")]
    ValidationError(String),

    #[error("Unknown dependency '{name}' (required by '{required_by}')")]
    UnknownDependency { name: String, required_by: String },

    #[error("Circular dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    DownloadFailed(String, String, String),

    #[error("Checksum Mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Build step failed for '{formula}': `{command}` exited with {status}\n{output}")]
    BuildToolNonZeroExit {
        formula: String,
        command: String,
        status: String,
        output: String,
    },

    #[error("Post-install step failed for '{formula}' ({step}): {reason}")]
    PostInstallStepFailed {
        formula: String,
        step: String,
        reason: String,
    },

    #[error("Missing system dependency '{name}': {reason}")]
    MissingSystemDependency { name: String, reason: String },

    #[error("Requirement not satisfied for '{formula}': {requirement}")]
    UnsatisfiedRequirement { formula: String, requirement: String },

    #[error("Test failed for '{formula}': {reason}")]
    TestFailed { formula: String, reason: String },

    #[error("Template Error in '{input}': {reason}")]
    Template { input: String, reason: String },

    #[error("Extraction Error: {0}")]
    Extract(String),

    #[error("Failed to execute command: {0}")]
    CommandExecError(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for OrreryError {
    fn from(err: std::io::Error) -> Self {
        OrreryError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for OrreryError {
    fn from(err: reqwest::Error) -> Self {
        OrreryError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for OrreryError {
    fn from(err: serde_json::Error) -> Self {
        OrreryError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for OrreryError {
    fn from(err: toml::de::Error) -> Self {
        OrreryError::Toml(Arc::new(err))
    }
}

impl From<semver::Error> for OrreryError {
    fn from(err: semver::Error) -> Self {
        OrreryError::SemVer(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, OrreryError>;
