/// Error types for the host collaborators, settings, and commands
use thiserror::Error;

/// Failure reported by the host tab/group store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    /// The tab or group disappeared before the call reached it
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Host error: {0}")]
    Other(String),
}

impl HostError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::NotFound(_))
    }

    /// Classify an error message coming back from the browser
    pub fn from_message(message: &str) -> HostError {
        let lowered = message.to_lowercase();
        if lowered.contains("no group with id") || lowered.contains("no tab with id") {
            HostError::NotFound(message.to_string())
        } else {
            HostError::Other(message.to_string())
        }
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Failure reading or writing the persistent key-value store
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Storage error: {0}")]
pub struct StorageError(pub String);

/// A settings mutation rejected at the command boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Domain already excluded: {0}")]
    AlreadyExcluded(String),

    #[error("Domain not found in excluded list: {0}")]
    NotExcluded(String),

    #[error("No color selected")]
    MissingColor,

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Group name must not be empty")]
    EmptyName,

    #[error("Domain not found in color settings: {0}")]
    NoColorSet(String),

    #[error("Domain not found in name settings: {0}")]
    NoNameSet(String),
}

impl SettingsError {
    /// Stable reason string returned to the popup
    pub fn reason(&self) -> &'static str {
        match self {
            SettingsError::InvalidDomain(_) => "invalid_domain",
            SettingsError::AlreadyExcluded(_) => "already_excluded",
            SettingsError::NotExcluded(_) => "not_excluded",
            SettingsError::MissingColor => "missing_color",
            SettingsError::InvalidColor(_) => "invalid_color",
            SettingsError::EmptyName => "empty_name",
            SettingsError::NoColorSet(_) => "no_color_set",
            SettingsError::NoNameSet(_) => "no_name_set",
        }
    }
}

/// Failure of a popup command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl CommandError {
    pub fn reason(&self) -> String {
        match self {
            CommandError::Settings(e) => e.reason().to_string(),
            CommandError::Host(HostError::NotFound(_)) => "not_found".to_string(),
            CommandError::Host(HostError::Other(msg)) => format!("host_error: {}", msg),
        }
    }
}
