//! Registro cerrado de operaciones y documentos de pipeline.
//!
//! Un documento JSON describe un pipeline como una lista de steps
//! `{ name?, operation, args }`. `StepSpec` traduce cada uno a la
//! configuración tipada del step; el primero debe ser un supplier raíz.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabflow_core::{coerce, named_enum, ConnectorRegistry, FlowError, NamedEnum, OnError, Pipeline, PipelineBuilder, PipelineStep, ProcessingMode,
                   Result, ReductionStep, RootSupplier, ValueKind};

use crate::{DefineConfig, DefineSupplier, DependenciesStep, DiffConfig, DiffStep, DistinctStep, DropConfig, DropStep, EngineDefaults, ExecuteConfig, ExecuteStep,
            ListConfig, ListReduction, SelectConfig, SelectSupplier, SummaryConfig, SummaryStep, TransferConfig, TransferStep, TruncateConfig,
            TruncateStep};

named_enum! {
    pub enum Operation {
        Select => "select",
        Define => "define",
        List => "list",
        Summary => "summary",
        Distinct => "distinct",
        Dependencies => "dependencies",
        Transfer => "transfer",
        Execute => "execute",
        Drop => "drop",
        Truncate => "truncate",
        Diff => "diff",
    }
}

/// Configuración validada de un step, una variante por operación.
#[derive(Debug, Clone, PartialEq)]
pub enum StepSpec {
    Select(SelectConfig),
    Define(DefineConfig),
    List(ListConfig),
    Summary(SummaryConfig),
    Distinct,
    Dependencies,
    Transfer(TransferConfig),
    Execute(ExecuteConfig),
    Drop(DropConfig),
    Truncate(TruncateConfig),
    Diff(DiffConfig),
}

impl StepSpec {
    pub fn parse(operation: &str, args: &Map<String, Value>, defaults: &EngineDefaults) -> Result<Self> {
        let operation: Operation = operation.parse().map_err(|_| {
                                                        FlowError::Config(format!("unknown operation `{operation}` (valid operations: {})",
                                                                                  Operation::names().join(", ")))
                                                    })?;
        Ok(match operation {
            Operation::Select => StepSpec::Select(SelectConfig::from_args(args)?),
            Operation::Define => StepSpec::Define(DefineConfig::from_args(args)?),
            Operation::List => StepSpec::List(ListConfig::from_args(args)?),
            Operation::Summary => StepSpec::Summary(SummaryConfig::from_args(args)?),
            Operation::Distinct => {
                no_options(operation, args)?;
                StepSpec::Distinct
            }
            Operation::Dependencies => {
                no_options(operation, args)?;
                StepSpec::Dependencies
            }
            Operation::Transfer => StepSpec::Transfer(TransferConfig::from_args(args, defaults)?),
            Operation::Execute => StepSpec::Execute(ExecuteConfig::from_args(args, defaults)?),
            Operation::Drop => StepSpec::Drop(DropConfig::from_args(args)?),
            Operation::Truncate => StepSpec::Truncate(TruncateConfig::from_args(args)?),
            Operation::Diff => StepSpec::Diff(DiffConfig::from_args(args)?),
        })
    }

    pub fn operation(&self) -> Operation {
        match self {
            StepSpec::Select(_) => Operation::Select,
            StepSpec::Define(_) => Operation::Define,
            StepSpec::List(_) => Operation::List,
            StepSpec::Summary(_) => Operation::Summary,
            StepSpec::Distinct => Operation::Distinct,
            StepSpec::Dependencies => Operation::Dependencies,
            StepSpec::Transfer(_) => Operation::Transfer,
            StepSpec::Execute(_) => Operation::Execute,
            StepSpec::Drop(_) => Operation::Drop,
            StepSpec::Truncate(_) => Operation::Truncate,
            StepSpec::Diff(_) => Operation::Diff,
        }
    }

    pub fn is_root(&self) -> bool { matches!(self, StepSpec::Select(_) | StepSpec::Define(_)) }

    pub fn into_root(self, name: &str) -> Result<Box<dyn RootSupplier>> {
        match self {
            StepSpec::Select(config) => Ok(Box::new(SelectSupplier::new(name, config))),
            StepSpec::Define(config) => Ok(Box::new(DefineSupplier::new(name, config))),
            other => Err(FlowError::Config(format!("step `{name}` ({}) cannot start a pipeline, use select or define",
                                                   other.operation()))),
        }
    }

    pub fn into_step(self, name: &str) -> Result<PipelineStep> {
        match self {
            StepSpec::Select(_) | StepSpec::Define(_) => {
                Err(FlowError::Config(format!("step `{name}` ({}) can only be the first step", self.operation())))
            }
            StepSpec::List(config) => Ok(PipelineStep::reducer(ReductionStep::new(ListReduction::new(name, config)))),
            StepSpec::Summary(config) => Ok(PipelineStep::reducer(SummaryStep::new(name, config))),
            StepSpec::Distinct => Ok(PipelineStep::map(DistinctStep::new(name))),
            StepSpec::Dependencies => Ok(PipelineStep::split(DependenciesStep::new(name))),
            StepSpec::Transfer(config) => Ok(TransferStep::new(name, config).into_step()),
            StepSpec::Execute(config) => Ok(ExecuteStep::new(name, config).into_step()),
            StepSpec::Drop(config) => Ok(PipelineStep::reducer(DropStep::new(name, config))),
            StepSpec::Truncate(config) => Ok(PipelineStep::reducer(TruncateStep::new(name, config))),
            StepSpec::Diff(config) => Ok(PipelineStep::map(DiffStep::new(name, config))),
        }
    }
}

fn no_options(operation: Operation, args: &Map<String, Value>) -> Result<()> {
    match args.keys().next() {
        Some(key) => Err(FlowError::UnknownOption { step: operation.name().to_string(),
                                                    option: key.clone(),
                                                    valid: Vec::new() }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDocument {
    #[serde(default)]
    pub name: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDocument {
    pub name: String,
    #[serde(default)]
    pub strict: Option<bool>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub max_cycles: Option<u64>,
    #[serde(default)]
    pub on_error: Option<String>,
    /// Duraciones: milisegundos o texto con unidad (`500ms`, `5s`, `1m`).
    #[serde(default)]
    pub poll_interval: Option<Value>,
    #[serde(default)]
    pub window_interval: Option<Value>,
    #[serde(default)]
    pub timeout: Option<Value>,
    pub steps: Vec<StepDocument>,
}

impl PipelineDocument {
    pub fn from_json(text: &str) -> serde_json::Result<Self> { serde_json::from_str(text) }
}

/// Construye el pipeline de `document`. Los errores de configuración de
/// cualquier step se reportan aquí, antes de tocar datos.
pub fn build_pipeline(document: &PipelineDocument, registry: Arc<ConnectorRegistry>, defaults: &EngineDefaults) -> Result<Pipeline> {
    let mut steps = document.steps.iter();
    let first = steps.next()
                     .ok_or_else(|| FlowError::Config(format!("pipeline `{}` has no steps", document.name)))?;
    let root = StepSpec::parse(&first.operation, &first.args, defaults)?.into_root(&step_name(first))?;
    let mut builder = PipelineBuilder::new(document.name.clone(), registry).strict(document.strict.unwrap_or(defaults.strict))
                                                                           .dev_env(defaults.dev_env)
                                                                           .root_boxed(root);
    if let Some(mode) = &document.mode {
        let mode = mode.parse::<ProcessingMode>()
                       .map_err(|e| FlowError::Config(format!("pipeline `{}` mode: {e}", document.name)))?;
        builder = builder.mode(mode);
    }
    if let Some(on_error) = &document.on_error {
        let on_error = on_error.parse::<OnError>()
                               .map_err(|e| FlowError::Config(format!("pipeline `{}` onError: {e}", document.name)))?;
        builder = builder.on_error(on_error);
    }
    if let Some(max_cycles) = document.max_cycles {
        builder = builder.max_cycles(max_cycles);
    }
    if let Some(interval) = duration(document, "pollInterval", document.poll_interval.as_ref())? {
        builder = builder.poll_interval(interval);
    }
    if let Some(window) = duration(document, "windowInterval", document.window_interval.as_ref())? {
        builder = builder.window_interval(window);
    }
    if let Some(timeout) = duration(document, "timeout", document.timeout.as_ref())? {
        builder = builder.timeout(timeout);
    }
    for step in steps {
        let spec = StepSpec::parse(&step.operation, &step.args, defaults)?;
        debug!("pipeline `{}`: step `{}` ({})", document.name, step_name(step), spec.operation());
        builder = builder.step(spec.into_step(&step_name(step))?);
    }
    builder.build()
}

fn duration(document: &PipelineDocument, option: &str, raw: Option<&Value>) -> Result<Option<Duration>> {
    let Some(raw) = raw else { return Ok(None) };
    coerce::parse(raw, ValueKind::Duration).and_then(|value| value.into_duration())
                                           .map(Some)
                                           .map_err(|e| FlowError::Config(format!("pipeline `{}` {option}: {e}", document.name)))
}

fn step_name(step: &StepDocument) -> String { step.name.clone().unwrap_or_else(|| step.operation.clone()) }
