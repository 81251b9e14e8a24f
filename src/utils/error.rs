use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValutaError {
    #[error("Insufficient funds: available {available} {code}, required {required} {code}")]
    InsufficientFunds {
        available: f64,
        required: f64,
        code: String,
    },

    #[error("Unknown currency '{code}'")]
    CurrencyNotFound { code: String },

    #[error("No wallet for '{code}' (wallets are created on first purchase)")]
    WalletNotFound { code: String },

    #[error("External API request failed: {reason}")]
    ApiRequest { reason: String },

    #[error("User '{username}' not found")]
    UserNotFound { username: String },

    #[error("{message}")]
    Authentication { message: String },

    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}' ({value}): {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Trading,
    Auth,
    Input,
    Network,
    Config,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ValutaError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn api(reason: impl Into<String>) -> Self {
        Self::ApiRequest {
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InsufficientFunds { .. }
            | Self::CurrencyNotFound { .. }
            | Self::WalletNotFound { .. } => ErrorCategory::Trading,
            Self::UserNotFound { .. } | Self::Authentication { .. } => ErrorCategory::Auth,
            Self::Validation { .. } => ErrorCategory::Input,
            Self::ApiRequest { .. } | Self::HttpError(_) => ErrorCategory::Network,
            Self::ConfigError { .. } | Self::InvalidConfigValue { .. } => ErrorCategory::Config,
            Self::Storage { .. } | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorCategory::System
            }
        }
    }

    /// 嚴重程度決定 CLI 的退出碼
    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Trading | ErrorCategory::Auth | ErrorCategory::Input => {
                ErrorSeverity::High
            }
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Config | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::IoError(e) => format!("Could not access a data file: {}", e),
            Self::SerializationError(e) => format!("A data file is malformed: {}", e),
            Self::HttpError(e) if e.is_timeout() => "The rate service did not answer in time".to_string(),
            Self::HttpError(_) => "Could not reach the rate service".to_string(),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "Top up the wallet first, e.g. `buy --currency USD --amount 100`",
            Self::CurrencyNotFound { .. } => "Run `update-rates` or check `currencies` for known codes",
            Self::WalletNotFound { .. } => "Buy the currency first; wallets are created automatically",
            Self::ApiRequest { .. } | Self::HttpError(_) => {
                "Check the network connection and API key, then retry `update-rates`"
            }
            Self::UserNotFound { .. } => "Register the user with `register` first",
            Self::Authentication { .. } => "Log in with `login --username <name> --password <pass>`",
            Self::Validation { .. } => "Check the command arguments and try again",
            Self::ConfigError { .. } | Self::InvalidConfigValue { .. } => {
                "Fix valutatrade.toml or the related environment variables"
            }
            Self::Storage { .. } | Self::IoError(_) | Self::SerializationError(_) => {
                "Check the data directory permissions; restore from `backup` if needed"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ValutaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_message() {
        let err = ValutaError::InsufficientFunds {
            available: 10.0,
            required: 25.5,
            code: "USD".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: available 10 USD, required 25.5 USD"
        );
        assert_eq!(err.category(), ErrorCategory::Trading);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes_follow_severity() {
        assert_eq!(ValutaError::api("timeout").exit_code(), 2);
        assert_eq!(
            ValutaError::ConfigError {
                message: "bad".to_string()
            }
            .exit_code(),
            3
        );
        assert_eq!(ValutaError::auth("Please log in first").exit_code(), 1);
    }
}
