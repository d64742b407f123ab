//! tabflow-steps: steps concretos sobre `tabflow-core`.
//!
//! Cada step declara una enumeración cerrada de opciones (`step_options!`) y
//! una configuración inmutable (`<Step>Config`) que se valida al construirse.
//! `registry::StepSpec` arma cualquiera de ellos a partir de
//! `(operacion, argumentos)`.

pub mod define;
pub mod dependencies;
pub mod diff;
pub mod distinct;
pub mod drop;
pub mod execute;
pub mod list;
pub mod registry;
pub mod select;
pub mod summary;
pub mod transfer;
pub mod truncate;

pub use define::{DefineConfig, DefineSupplier};
pub use dependencies::DependenciesStep;
pub use diff::{diff_rows, DiffConfig, DiffOutcome, DiffReportType, DiffStatus, DiffStep, ReportDensity};
pub use distinct::DistinctStep;
pub use drop::{DropConfig, DropStep};
pub use execute::{ExecuteConfig, ExecuteStep};
pub use list::{ListConfig, ListReduction};
pub use registry::{build_pipeline, Operation, PipelineDocument, StepDocument, StepSpec};
pub use select::{SelectConfig, SelectSupplier};
pub use summary::{Aggregate, Statistics, SummaryConfig, SummaryReduction, SummaryStep};
pub use transfer::{TransferConfig, TransferStep};
pub use truncate::{TruncateConfig, TruncateStep};

use tabflow_core::constants::{DEFAULT_BATCH_SIZE, DEFAULT_ERROR_MESSAGE_WIDTH, DEFAULT_FETCH_SIZE, DEFAULT_TARGET_WORKER_COUNT};
use tabflow_core::FlowError;

/// Valores de proceso para lo que un documento no indica: tamaños de
/// transferencia y ancho de mensajes por defecto, rigurosidad y entorno de
/// desarrollo del pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineDefaults {
    pub fetch_size: usize,
    pub batch_size: usize,
    pub target_worker_count: usize,
    pub error_message_width: usize,
    pub strict: bool,
    pub dev_env: bool,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self { fetch_size: DEFAULT_FETCH_SIZE,
               batch_size: DEFAULT_BATCH_SIZE,
               target_worker_count: DEFAULT_TARGET_WORKER_COUNT,
               error_message_width: DEFAULT_ERROR_MESSAGE_WIDTH,
               strict: false,
               dev_env: false }
    }
}

/// Error de opción obligatoria ausente.
pub(crate) fn missing_option(step: &str, option: &str) -> FlowError {
    FlowError::Config(format!("step `{step}` requires the `{option}` option"))
}
