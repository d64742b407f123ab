//! Tabflow
//!
//! Motor de pipelines sobre recursos de datos tabulares:
//! - `tabflow_core` define recursos, conectores, scheduler, transferencias y
//!   ejecución de runtimes.
//! - `tabflow_steps` implementa los steps y el registro de operaciones.
//! - Este crate agrega configuración por entorno, logging y ejecución de
//!   documentos JSON.

pub mod config;
pub mod document;
pub mod errors;
pub mod logging;

pub use config::EngineConfig;
pub use document::run_document;
pub use errors::AppError;
pub use tabflow_core;
pub use tabflow_steps;
