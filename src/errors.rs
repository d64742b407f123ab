use tabflow_core::FlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error del pipeline: {0}")]
    Flow(#[from] FlowError),
    #[error("Documento inválido: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error de configuración: {0}")]
    Config(String),
}

impl AppError {
    /// Código de salida de proceso para el error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Flow(e) if e.is_config() => 2,
            AppError::Json(_) | AppError::Config(_) => 2,
            AppError::Flow(_) => 1,
        }
    }
}
