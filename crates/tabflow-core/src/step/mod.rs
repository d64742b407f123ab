//! Taxonomía de steps.
//!
//! Un step es una unidad configurada y con estado. Según su forma:
//! - `RootSupplier`: produce la secuencia de recursos del pipeline.
//! - `MapStep`: un recurso de entrada, cero o uno de salida, aplicado de inmediato.
//! - `ReducerStep`: acumula con `accept` y emite con `flush`.
//! - `SplitStep`: consumidor-productor que divide un recurso en varios.

pub mod definition;

pub use definition::{MapStep, PipelineStep, ProcessingMode, ReducerStep, RootSupplier, SplitStep, StepKind};
