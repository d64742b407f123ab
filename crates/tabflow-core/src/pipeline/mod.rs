//! Pipeline: lista ordenada e inmutable de steps más el estado compartido de
//! la ejecución (estado de salida, rigurosidad, entorno de desarrollo).

mod builder;
mod context;
mod result;
mod scheduler;

pub use builder::{OnError, Pipeline, PipelineBuilder};
pub use context::PipelineContext;
pub use result::{PipelineResult, StepCounter};
