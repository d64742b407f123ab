use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::resource::ResourceRef;

/// Contadores de un step intermedio.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepCounter {
    pub name: String,
    pub input: u64,
    pub output: u64,
}

/// Resultado de una ejecución de pipeline.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub pipeline: String,
    pub exit_status: i32,
    /// Recursos que salieron del último step.
    pub downstream: Vec<ResourceRef>,
    pub steps: Vec<StepCounter>,
    /// Elementos producidos por el supplier raíz.
    pub cycles: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool { self.exit_status == 0 }

    pub fn downstream_uris(&self) -> Vec<String> { self.downstream.iter().map(|r| r.uri()).collect() }
}
