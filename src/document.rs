//! Ejecución de documentos de pipeline.

use std::sync::Arc;

use log::{info, warn};
use tabflow_core::{ConnectorRegistry, PipelineResult};
use tabflow_steps::{build_pipeline, PipelineDocument};

use crate::config::EngineConfig;
use crate::errors::AppError;

/// Interpreta `json`, construye el pipeline y lo ejecuta una vez.
pub fn run_document(json: &str, registry: Arc<ConnectorRegistry>, config: &EngineConfig) -> Result<PipelineResult, AppError> {
    let document = PipelineDocument::from_json(json)?;
    let mut pipeline = build_pipeline(&document, registry, &config.to_defaults())?;
    let result = pipeline.run()?;
    if result.is_success() {
        info!("document `{}`: run {} finished, {} downstream resources",
              document.name,
              result.run_id,
              result.downstream.len());
    } else {
        warn!("document `{}`: run {} finished with exit status {}",
              document.name,
              result.run_id,
              result.exit_status);
    }
    Ok(result)
}
