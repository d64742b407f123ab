//! Errores del core.
//!
//! Dos niveles: `ConnectorError` describe un fallo reportado por un conector
//! (I/O, recurso inexistente, defecto de programación del runtime...) y
//! `FlowError` es el error que atraviesa steps y pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Clasificación de un fallo de conector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorErrorKind {
    NotFound,
    Io,
    /// Defecto de programación del lado del runtime (referencia nula,
    /// estado imposible). En entorno de desarrollo siempre se propaga.
    Defect,
    Unsupported,
    Constraint,
    Other,
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ConnectorError {
    pub kind: ConnectorErrorKind,
    pub message: String,
    /// Contexto acumulado, del más interno al más externo.
    pub frames: Vec<String>,
}

impl ConnectorError {
    pub fn new(kind: ConnectorErrorKind, message: impl Into<String>) -> Self {
        Self { kind,
               message: message.into(),
               frames: Vec::new() }
    }

    pub fn not_found(message: impl Into<String>) -> Self { Self::new(ConnectorErrorKind::NotFound, message) }
    pub fn io(message: impl Into<String>) -> Self { Self::new(ConnectorErrorKind::Io, message) }
    pub fn defect(message: impl Into<String>) -> Self { Self::new(ConnectorErrorKind::Defect, message) }
    pub fn unsupported(message: impl Into<String>) -> Self { Self::new(ConnectorErrorKind::Unsupported, message) }
    pub fn constraint(message: impl Into<String>) -> Self { Self::new(ConnectorErrorKind::Constraint, message) }

    /// Añade un frame de contexto.
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frames.push(frame.into());
        self
    }

    pub fn is_defect(&self) -> bool { self.kind == ConnectorErrorKind::Defect }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("unknown option `{option}` for step `{step}` (valid options: {})", .valid.join(", "))]
    UnknownOption { step: String, option: String, valid: Vec<String> },
    #[error("invalid value for option `{option}` of step `{step}`: {reason}")]
    InvalidOption { step: String, option: String, reason: String },
    #[error("invalid column mapping: {0}")]
    InvalidMapping(String),
    #[error("strict input: {0}")]
    StrictInput(String),
    #[error("incompatible processing mode: {0}")]
    IncompatibleMode(String),
    #[error("configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("execution of `{resource}` failed: {error}")]
    Execution { resource: String, error: ConnectorError },
    #[error("data resource `{0}` was already seen")]
    DuplicateSource(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl FlowError {
    /// Errores detectables antes de mover datos.
    pub fn is_config(&self) -> bool {
        matches!(self,
                 FlowError::UnknownOption { .. }
                 | FlowError::InvalidOption { .. }
                 | FlowError::InvalidMapping(_)
                 | FlowError::StrictInput(_)
                 | FlowError::IncompatibleMode(_)
                 | FlowError::Config(_))
    }

    /// Fallos de un elemento que una política de pipeline puede descartar.
    pub fn is_item_failure(&self) -> bool { matches!(self, FlowError::Connector(_) | FlowError::DuplicateSource(_)) }

    pub fn invalid_option(step: &str, option: &str, reason: impl Into<String>) -> Self {
        FlowError::InvalidOption { step: step.to_string(),
                                   option: option.to_string(),
                                   reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_option_lists_valid_names() {
        let err = FlowError::UnknownOption { step: "list".into(),
                                             option: "atributes".into(),
                                             valid: vec!["attributes".into(), "target".into()] };
        assert_eq!(err.to_string(), "unknown option `atributes` for step `list` (valid options: attributes, target)");
        assert!(err.is_config());
    }

    #[test]
    fn connector_error_converts_and_keeps_frames() {
        let e = ConnectorError::defect("null value").with_frame("runtime q1").with_frame("connection mem");
        let flow: FlowError = e.clone().into();
        assert!(flow.is_item_failure());
        assert_eq!(flow.to_string(), "null value");
        assert_eq!(e.frames, vec!["runtime q1".to_string(), "connection mem".to_string()]);
        assert!(e.is_defect());
    }
}
