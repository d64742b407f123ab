//! Step de ejecución de recursos runtime.
//!
//! En batch (por defecto) ejecuta todas las entradas al vaciarse y emite un
//! único recurso de resultados; en stream ejecuta cada entrada al llegar.

use serde_json::{Map, Value};
use tabflow_core::{apply_options, step_options, ExecutionEngine, ExecutionMode, ExecutionOptions, MapStep, PipelineContext, PipelineStep, ProcessingMode,
                   ReducerStep, ResourceRef, Result, ResultColumn};

use crate::EngineDefaults;

step_options! {
    pub enum ExecuteOption for "execute" {
        ExecutionMode => "executionMode": Text,
        /// Nombre del recurso de resultados.
        TargetUri => "targetUri": Text,
        /// Dónde persistir las filas de cada resultado (modo transfer).
        ResultUri => "resultUri": Text,
        ErrorUri => "errorUri": Text,
        OutputColumns => "outputColumns": TextList,
        StopEarly => "stopEarly": Boolean,
        StrictInput => "strictInput": Boolean,
        StrictExecution => "strictExecution": Boolean,
        FailOnError => "failOnError": Boolean,
        ResultPersistence => "resultPersistence": Boolean,
        ErrorMessageWidth => "errorMessageWidth": PositiveInteger,
        ProcessingType => "processingType": Text,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteConfig {
    options: ExecutionOptions,
    mode: ProcessingMode,
}

impl ExecuteConfig {
    pub fn new(options: ExecutionOptions) -> Self {
        Self { options,
               mode: ProcessingMode::Batch }
    }

    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn from_args(args: &Map<String, Value>, defaults: &EngineDefaults) -> Result<Self> {
        let mut builder = ExecutionOptions::builder().error_message_width(defaults.error_message_width);
        let mut mode = ProcessingMode::Batch;
        apply_options::<ExecuteOption, _>(args, |option, value| {
            let b = std::mem::take(&mut builder);
            builder = match option {
                ExecuteOption::ExecutionMode => b.mode(value.into_enum::<ExecutionMode>()?),
                ExecuteOption::TargetUri => b.target(value.into_text()?),
                ExecuteOption::ResultUri => b.result_template(value.into_text()?),
                ExecuteOption::ErrorUri => b.error_template(value.into_text()?),
                ExecuteOption::OutputColumns => b.result_columns(value.into_enum_list::<ResultColumn>()?),
                ExecuteOption::StopEarly => b.stop_early(value.into_bool()?),
                ExecuteOption::StrictInput => b.strict_input(value.into_bool()?),
                ExecuteOption::StrictExecution => b.strict_execution(value.into_bool()?),
                ExecuteOption::FailOnError => b.fail_on_error(value.into_bool()?),
                ExecuteOption::ResultPersistence => b.result_persistence(value.into_bool()?),
                ExecuteOption::ErrorMessageWidth => b.error_message_width(value.into_usize()?),
                ExecuteOption::ProcessingType => {
                    mode = value.into_enum()?;
                    b
                }
            };
            Ok(())
        })?;
        Ok(Self::new(builder.build()?).mode(mode))
    }

    pub fn options(&self) -> &ExecutionOptions { &self.options }
}

pub struct ExecuteStep {
    name: String,
    engine: ExecutionEngine,
    mode: ProcessingMode,
    pending: Vec<ResourceRef>,
}

impl ExecuteStep {
    pub fn new(name: impl Into<String>, config: ExecuteConfig) -> Self {
        Self { name: name.into(),
               engine: ExecutionEngine::new(config.options),
               mode: config.mode,
               pending: Vec::new() }
    }

    pub fn into_step(self) -> PipelineStep {
        match self.mode {
            ProcessingMode::Stream => PipelineStep::map(self),
            ProcessingMode::Batch => PipelineStep::reducer(self),
        }
    }
}

impl MapStep for ExecuteStep {
    fn name(&self) -> &str { &self.name }

    fn mode(&self) -> Option<ProcessingMode> { Some(self.mode) }

    fn apply(&mut self, input: ResourceRef, ctx: &PipelineContext) -> Result<Option<ResourceRef>> {
        Ok(Some(self.engine.execute(&[input], ctx)?))
    }

    fn reset(&mut self) -> Result<()> {
        self.engine.reset();
        Ok(())
    }
}

impl ReducerStep for ExecuteStep {
    fn name(&self) -> &str { &self.name }

    fn mode(&self) -> Option<ProcessingMode> { Some(self.mode) }

    fn accept(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<()> {
        self.pending.push(input);
        Ok(())
    }

    fn flush(&mut self, ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let inputs = std::mem::take(&mut self.pending);
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![self.engine.execute(&inputs, ctx)?])
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        self.engine.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> Map<String, Value> { value.as_object().cloned().unwrap_or_default() }

    #[test]
    fn options_build_an_immutable_configuration() {
        let defaults = EngineDefaults { error_message_width: 80,
                                        ..EngineDefaults::default() };
        let config = ExecuteConfig::from_args(&args(json!({
                                                  "executionMode": "LOOP",
                                                  "outputColumns": ["runtime_data_uri", "exit_code", "latency_millis"],
                                                  "stopEarly": false,
                                                  "processingType": "stream"
                                              })),
                                              &defaults).expect("valid");
        let options = config.options();
        assert_eq!(options.mode(), Some(ExecutionMode::Transfer));
        assert!(!options.stop_early());
        assert_eq!(options.error_message_width(), 80);
        assert_eq!(options.columns_for(ExecutionMode::Transfer),
                   vec![ResultColumn::RuntimeDataUri, ResultColumn::ExitCode, ResultColumn::LatencyMillis]);
        assert_eq!(config.mode, ProcessingMode::Stream);
    }

    #[test]
    fn invalid_combinations_are_rejected_at_build_time() {
        let defaults = EngineDefaults::default();
        assert!(ExecuteConfig::from_args(&args(json!({"executionMode": "load", "resultPersistence": true})), &defaults).is_err());
        assert!(ExecuteConfig::from_args(&args(json!({"errorMessageWidth": 5})), &defaults).is_err());
        assert!(ExecuteConfig::from_args(&args(json!({"outputColumns": ["exit_code", "bogus"]})), &defaults).is_err());
        assert!(ExecuteConfig::from_args(&args(json!({"targetUri": "${nope}"})), &defaults).is_err());
    }
}
