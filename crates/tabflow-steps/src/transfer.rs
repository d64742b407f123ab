//! Step de transferencia.
//!
//! Con una plantilla de destino sin variables (concat) todas las entradas van
//! al mismo destino y el step por defecto es un reductor batch; con una
//! plantilla por entrada es un map stream que transfiere cada par al llegar.

use log::info;
use serde_json::{Map, Value};
use tabflow_core::connector::UpsertType;
use tabflow_core::hashing::hash_list;
use tabflow_core::resource::materialize;
use tabflow_core::transfer::{default_mode, ColumnMapping, MappingMethod, SourceOperation, TargetOperation, TransferListener, TransferOperation,
                             TransferOutput, TransferReport};
use tabflow_core::{apply_options, step_options, MapStep, PipelineContext, PipelineStep, ProcessingMode, ReducerStep, ResourceRef, Result,
                   TargetTemplate, TransferManager, TransferPair, TransferProperties};

use crate::{missing_option, EngineDefaults};

step_options! {
    pub enum TransferOption for "transfer" {
        TargetUri => "targetUri": Text,
        Operation => "operation": Text,
        UpsertType => "upsertType": Text,
        MappingMethod => "mappingMethod": Text,
        MappingStrict => "mappingStrict": Boolean,
        /// `origen -> destino`, por nombre o por posición según `mappingMethod`.
        MappingColumns => "mappingColumns": Object,
        TargetOperation => "targetOperation": Text,
        SourceOperation => "sourceOperation": Text,
        FetchSize => "fetchSize": PositiveInteger,
        BufferSize => "bufferSize": PositiveInteger,
        BatchSize => "batchSize": PositiveInteger,
        CommitFrequency => "commitFrequency": PositiveInteger,
        WorkerCount => "workerCount": PositiveInteger,
        OutputType => "outputType": Text,
        ProcessingType => "processingType": Text,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    target: TargetTemplate,
    properties: TransferProperties,
    output: TransferOutput,
    mode: ProcessingMode,
}

impl TransferConfig {
    pub fn new(target: &str, properties: TransferProperties) -> Result<Self> {
        let target = TargetTemplate::parse(target)?;
        let mode = default_mode(target.is_concat());
        Ok(Self { target,
                  properties,
                  output: TransferOutput::Targets,
                  mode })
    }

    pub fn output(mut self, output: TransferOutput) -> Self {
        self.output = output;
        self
    }

    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn from_args(args: &Map<String, Value>, defaults: &EngineDefaults) -> Result<Self> {
        let mut target: Option<String> = None;
        let mut method = MappingMethod::Name;
        let mut strict = true;
        let mut columns: Option<Map<String, Value>> = None;
        let mut output = TransferOutput::Targets;
        let mut mode: Option<ProcessingMode> = None;
        let mut builder = TransferProperties::builder().fetch_size(defaults.fetch_size)
                                                       .batch_size(defaults.batch_size)
                                                       .target_worker_count(defaults.target_worker_count);
        apply_options::<TransferOption, _>(args, |option, value| {
            match option {
                TransferOption::TargetUri => target = Some(value.into_text()?),
                TransferOption::Operation => builder = std::mem::take(&mut builder).operation(value.into_enum::<TransferOperation>()?),
                TransferOption::UpsertType => builder = std::mem::take(&mut builder).upsert_type(value.into_enum::<UpsertType>()?),
                TransferOption::MappingMethod => method = value.into_enum()?,
                TransferOption::MappingStrict => strict = value.into_bool()?,
                TransferOption::MappingColumns => columns = Some(value.into_object()?),
                TransferOption::TargetOperation => builder = std::mem::take(&mut builder).target_operation(value.into_enum::<TargetOperation>()?),
                TransferOption::SourceOperation => builder = std::mem::take(&mut builder).source_operation(value.into_enum::<SourceOperation>()?),
                TransferOption::FetchSize => builder = std::mem::take(&mut builder).fetch_size(value.into_usize()?),
                TransferOption::BufferSize => builder = std::mem::take(&mut builder).buffer_size(value.into_usize()?),
                TransferOption::BatchSize => builder = std::mem::take(&mut builder).batch_size(value.into_usize()?),
                TransferOption::CommitFrequency => builder = std::mem::take(&mut builder).commit_frequency(value.into_usize()?),
                TransferOption::WorkerCount => builder = std::mem::take(&mut builder).target_worker_count(value.into_usize()?),
                TransferOption::OutputType => output = value.into_enum()?,
                TransferOption::ProcessingType => mode = Some(value.into_enum()?),
            }
            Ok(())
        })?;
        let target = target.ok_or_else(|| missing_option("transfer", "targetUri"))?;
        let properties = builder.mapping(ColumnMapping::from_options(method, strict, columns.as_ref())?).build()?;
        let mut config = Self::new(&target, properties)?.output(output);
        if let Some(mode) = mode {
            config = config.mode(mode);
        }
        Ok(config)
    }

    pub fn is_concat(&self) -> bool { self.target.is_concat() }

    pub fn processing_mode(&self) -> ProcessingMode { self.mode }

    pub fn properties(&self) -> &TransferProperties { &self.properties }
}

pub struct TransferStep {
    name: String,
    config: TransferConfig,
    manager: TransferManager,
    pending: Vec<ResourceRef>,
}

impl TransferStep {
    pub fn new(name: impl Into<String>, config: TransferConfig) -> Self {
        let manager = TransferManager::new(config.properties.clone());
        Self { name: name.into(),
               config,
               manager,
               pending: Vec::new() }
    }

    /// Map en modo stream, reductor en modo batch.
    pub fn into_step(self) -> PipelineStep {
        match self.config.mode {
            ProcessingMode::Stream => PipelineStep::map(self),
            ProcessingMode::Batch => PipelineStep::reducer(self),
        }
    }

    fn transfer(&self, inputs: Vec<ResourceRef>, ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let pairs = inputs.iter()
                          .map(|input| Ok(TransferPair::new(input.clone(), self.config.target.resolve(input, ctx.registry())?)))
                          .collect::<Result<Vec<_>>>()?;
        let report = self.manager.transfer(&pairs, self.config.is_concat())?;
        ctx.add_exit_status(report.exit_code());
        info!("transfer `{}`: {} pairs, {} rows, exit code {}",
              self.name,
              pairs.len(),
              report.rows(),
              report.exit_code());
        match self.config.output {
            TransferOutput::Inputs => Ok(inputs),
            TransferOutput::Targets => {
                let mut targets: Vec<ResourceRef> = Vec::new();
                for pair in pairs {
                    if !targets.iter().any(|t| t.uri() == pair.target_uri()) {
                        targets.push(pair.target);
                    }
                }
                Ok(targets)
            }
            TransferOutput::Summary => Ok(vec![self.write_summary(&inputs, &report, ctx)?]),
        }
    }

    fn write_summary(&self, inputs: &[ResourceRef], report: &TransferReport, ctx: &PipelineContext) -> Result<ResourceRef> {
        let uris: Vec<String> = inputs.iter().map(|r| r.uri()).collect();
        let target = ctx.registry().resolve(&format!("transfer_summary_{}", &hash_list(&uris)[..16]))?;
        let rows = report.listeners.iter().map(TransferListener::summary_row).collect();
        materialize(&target, TransferListener::summary_schema(), rows)?;
        Ok(target)
    }
}

impl MapStep for TransferStep {
    fn name(&self) -> &str { &self.name }

    fn mode(&self) -> Option<ProcessingMode> { Some(self.config.mode) }

    fn apply(&mut self, input: ResourceRef, ctx: &PipelineContext) -> Result<Option<ResourceRef>> {
        Ok(self.transfer(vec![input], ctx)?.into_iter().next())
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}

impl ReducerStep for TransferStep {
    fn name(&self) -> &str { &self.name }

    fn mode(&self) -> Option<ProcessingMode> { Some(self.config.mode) }

    fn accept(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<()> {
        self.pending.push(input);
        Ok(())
    }

    fn flush(&mut self, ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let inputs = std::mem::take(&mut self.pending);
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        self.transfer(inputs, ctx)
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> Map<String, Value> { value.as_object().cloned().unwrap_or_default() }

    #[test]
    fn mode_follows_the_target_template() {
        let fan_out = TransferConfig::from_args(&args(json!({"targetUri": "copy_${input_logical_name}@dw"})), &EngineDefaults::default())
            .expect("fan out");
        assert_eq!(fan_out.processing_mode(), ProcessingMode::Stream);
        assert!(!fan_out.is_concat());
        let concat = TransferConfig::from_args(&args(json!({"targetUri": "all@dw"})), &EngineDefaults::default()).expect("concat");
        assert_eq!(concat.processing_mode(), ProcessingMode::Batch);
        let forced = TransferConfig::from_args(&args(json!({"targetUri": "all@dw", "processingType": "stream"})), &EngineDefaults::default())
            .expect("explicit mode");
        assert_eq!(forced.processing_mode(), ProcessingMode::Stream);
    }

    #[test]
    fn options_are_typed_and_validated() {
        let config = TransferConfig::from_args(&args(json!({
                                                   "targetUri": "t",
                                                   "operation": "UPSERT",
                                                   "upsert-type": "insert_update",
                                                   "targetOperation": "replace",
                                                   "sourceOperation": "move",
                                                   "batchSize": "100",
                                                   "commitFrequency": 5,
                                                   "outputType": "sources"
                                               })),
                                               &EngineDefaults::default()).expect("valid");
        let props = config.properties();
        assert_eq!(props.operation(), Some(TransferOperation::Upsert));
        assert_eq!(props.upsert_type(), UpsertType::InsertUpdate);
        assert_eq!(props.target_operation(), TargetOperation::Drop);
        assert_eq!(props.source_operation(), SourceOperation::Drop);
        assert_eq!(props.batch_size(), 100);
        assert_eq!(props.commit_frequency(), 5);
        assert_eq!(config.output, TransferOutput::Inputs);

        assert!(TransferConfig::from_args(&args(json!({"operation": "copy"})), &EngineDefaults::default()).is_err());
        assert!(TransferConfig::from_args(&args(json!({"targetUri": "t", "workerCount": 0})), &EngineDefaults::default()).is_err());
        let err = TransferConfig::from_args(&args(json!({"targetUri": "t", "workers": 2})), &EngineDefaults::default()).expect_err("unknown");
        assert!(err.to_string().contains("workerCount"));
    }
}
