//! Errors surfaced by the data services.

use skycast_core::{ApiError, AppError, CityError, ConfigError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    City(#[from] CityError),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl ServiceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Api(e) if e.is_cancelled())
    }

    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Api(e) => e.user_message().to_string(),
            ServiceError::City(e) => e.to_string(),
            ServiceError::InvalidSettings(_) => {
                "Some settings are invalid. Check and try again.".to_string()
            }
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Api(e) => AppError::Api(e),
            ServiceError::City(e) => AppError::City(e),
            ServiceError::InvalidSettings(msg) => AppError::Config(ConfigError::Invalid(msg)),
        }
    }
}
