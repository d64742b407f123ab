//! tabflow-core: motor de pipelines sobre recursos de datos tabulares.
pub mod coerce;
pub mod connector;
pub mod constants;
pub mod drop_order;
pub mod errors;
pub mod execution;
pub mod hashing;
pub mod options;
pub mod pipeline;
pub mod reduce;
pub mod resource;
pub mod step;
pub mod template;
pub mod transfer;

pub use coerce::{parse, CoerceError, NamedEnum, OptionValue, ValueKind};
pub use connector::{Connector, ConnectorRegistry, InsertOptions, InsertStream, MemoryConnector, SelectStream, UpsertType, WriteMode};
pub use drop_order::{drop_order, DropOrder};
pub use errors::{ConnectorError, ConnectorErrorKind, FlowError, Result};
pub use execution::{ExecutionEngine, ExecutionMode, ExecutionOptions, ExecutionResult, ResultColumn};
pub use options::{apply_options, StepOption};
pub use pipeline::{OnError, Pipeline, PipelineBuilder, PipelineContext, PipelineResult, StepCounter};
pub use reduce::{Reduction, ReductionStep};
pub use resource::{Column, DataResource, DataType, ResourceRef, Row, Schema, TabularKind};
pub use step::{MapStep, PipelineStep, ProcessingMode, ReducerStep, RootSupplier, SplitStep, StepKind};
pub use template::TargetTemplate;
pub use transfer::{TransferManager, TransferPair, TransferProperties};

// `named_enum!` y `step_options!` se exportan en la raíz vía #[macro_export].
