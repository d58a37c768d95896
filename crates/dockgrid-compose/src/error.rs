//! Compose decoding errors. All of them are client-input errors.

use thiserror::Error;

pub type ComposeResult<T> = Result<T, ComposeError>;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("project name is required")]
    MissingProjectName,

    #[error("invalid project name {0:?}: use lowercase letters, digits, '_' and '-'")]
    InvalidProjectName(String),

    #[error("compose payload is not valid base64: {0}")]
    Base64(String),

    #[error("compose payload is not valid UTF-8")]
    Utf8,

    #[error("invalid compose file: {0}")]
    Yaml(String),

    #[error("invalid service name {0:?}")]
    InvalidServiceName(String),

    #[error("service {0:?} has neither image nor build")]
    MissingImage(String),

    #[error("service {service:?} depends on undeclared service {dependency:?}")]
    UnknownDependency { service: String, dependency: String },

    #[error("service {service:?} has invalid {field}: {reason}")]
    InvalidCommand {
        service: String,
        field: &'static str,
        reason: String,
    },

    #[error("service {service:?} has invalid volume {spec:?}")]
    InvalidMount { service: String, spec: String },

    #[error("service {service:?} has invalid healthcheck {field}: {reason}")]
    InvalidHealthcheck {
        service: String,
        field: &'static str,
        reason: String,
    },
}
