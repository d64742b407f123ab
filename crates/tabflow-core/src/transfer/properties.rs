//! Propiedades de una transferencia.
//!
//! `TransferProperties` es inmutable: se arma con `TransferPropertiesBuilder`
//! y se valida una sola vez en `build`.

use crate::connector::UpsertType;
use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_COMMIT_FREQUENCY, DEFAULT_FETCH_SIZE, DEFAULT_TARGET_WORKER_COUNT};
use crate::errors::{FlowError, Result};
use crate::named_enum;
use crate::step::ProcessingMode;

use super::ColumnMapping;

named_enum! {
    pub enum TransferOperation {
        /// Agrega filas al destino.
        Insert => "insert" | "append",
        /// Copia a un destino vacío y estructuralmente compatible.
        Copy => "copy",
        Upsert => "upsert",
    }
}

named_enum! {
    /// Operación sobre el origen tras una copia exitosa.
    pub enum SourceOperation {
        None => "none",
        Drop => "drop" | "move",
        Truncate => "truncate",
    }
}

named_enum! {
    /// Operación sobre el destino antes de la copia.
    pub enum TargetOperation {
        None => "none",
        Drop => "drop" | "replace" | "drop-if-exists",
        Truncate => "truncate",
    }
}

named_enum! {
    pub enum TransferOutput {
        Targets => "targets",
        Inputs => "inputs" | "sources",
        Summary => "summary",
    }
}

/// Operación efectiva cuando no se configuró ninguna.
pub fn default_operation(concat: bool) -> TransferOperation {
    if concat {
        TransferOperation::Insert
    } else {
        TransferOperation::Copy
    }
}

/// Un destino único se carga con todas las entradas (batch); un destino por
/// entrada se procesa par a par (stream).
pub fn default_mode(concat: bool) -> ProcessingMode {
    if concat {
        ProcessingMode::Batch
    } else {
        ProcessingMode::Stream
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProperties {
    operation: Option<TransferOperation>,
    upsert_type: UpsertType,
    mapping: ColumnMapping,
    source_operation: SourceOperation,
    target_operation: TargetOperation,
    fetch_size: usize,
    buffer_size: usize,
    batch_size: usize,
    commit_frequency: usize,
    target_worker_count: usize,
}

impl Default for TransferProperties {
    fn default() -> Self {
        Self { operation: None,
               upsert_type: UpsertType::Merge,
               mapping: ColumnMapping::default(),
               source_operation: SourceOperation::None,
               target_operation: TargetOperation::None,
               fetch_size: DEFAULT_FETCH_SIZE,
               buffer_size: 2 * DEFAULT_TARGET_WORKER_COUNT * DEFAULT_FETCH_SIZE,
               batch_size: DEFAULT_BATCH_SIZE,
               commit_frequency: DEFAULT_COMMIT_FREQUENCY,
               target_worker_count: DEFAULT_TARGET_WORKER_COUNT }
    }
}

impl TransferProperties {
    pub fn builder() -> TransferPropertiesBuilder { TransferPropertiesBuilder::default() }

    /// Operación explícita, si la hay.
    pub fn operation(&self) -> Option<TransferOperation> { self.operation }

    pub fn resolved_operation(&self, concat: bool) -> TransferOperation {
        self.operation.unwrap_or_else(|| default_operation(concat))
    }

    pub fn upsert_type(&self) -> UpsertType { self.upsert_type }

    pub fn mapping(&self) -> &ColumnMapping { &self.mapping }

    pub fn source_operation(&self) -> SourceOperation { self.source_operation }

    pub fn target_operation(&self) -> TargetOperation { self.target_operation }

    pub fn fetch_size(&self) -> usize { self.fetch_size }

    pub fn buffer_size(&self) -> usize { self.buffer_size }

    pub fn batch_size(&self) -> usize { self.batch_size }

    pub fn commit_frequency(&self) -> usize { self.commit_frequency }

    pub fn target_worker_count(&self) -> usize { self.target_worker_count }
}

#[derive(Debug, Clone, Default)]
pub struct TransferPropertiesBuilder {
    operation: Option<TransferOperation>,
    upsert_type: Option<UpsertType>,
    mapping: Option<ColumnMapping>,
    source_operation: Option<SourceOperation>,
    target_operation: Option<TargetOperation>,
    fetch_size: Option<usize>,
    buffer_size: Option<usize>,
    batch_size: Option<usize>,
    commit_frequency: Option<usize>,
    target_worker_count: Option<usize>,
}

impl TransferPropertiesBuilder {
    pub fn operation(mut self, operation: TransferOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn upsert_type(mut self, upsert_type: UpsertType) -> Self {
        self.upsert_type = Some(upsert_type);
        self
    }

    pub fn mapping(mut self, mapping: ColumnMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn source_operation(mut self, operation: SourceOperation) -> Self {
        self.source_operation = Some(operation);
        self
    }

    pub fn target_operation(mut self, operation: TargetOperation) -> Self {
        self.target_operation = Some(operation);
        self
    }

    pub fn fetch_size(mut self, size: usize) -> Self {
        self.fetch_size = Some(size);
        self
    }

    /// Capacidad (en filas) del buffer entre lectura y escritura.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn commit_frequency(mut self, frequency: usize) -> Self {
        self.commit_frequency = Some(frequency);
        self
    }

    pub fn target_worker_count(mut self, count: usize) -> Self {
        self.target_worker_count = Some(count);
        self
    }

    pub fn build(self) -> Result<TransferProperties> {
        let defaults = TransferProperties::default();
        let fetch_size = positive("fetchSize", self.fetch_size, defaults.fetch_size)?;
        let batch_size = positive("batchSize", self.batch_size, defaults.batch_size)?;
        let commit_frequency = positive("commitFrequency", self.commit_frequency, defaults.commit_frequency)?;
        let target_worker_count = positive("workerCount", self.target_worker_count, defaults.target_worker_count)?;
        let buffer_size = positive("bufferSize",
                                   self.buffer_size,
                                   target_worker_count.saturating_mul(fetch_size).saturating_mul(2))?;
        Ok(TransferProperties { operation: self.operation,
                                upsert_type: self.upsert_type.unwrap_or(defaults.upsert_type),
                                mapping: self.mapping.unwrap_or(defaults.mapping),
                                source_operation: self.source_operation.unwrap_or(defaults.source_operation),
                                target_operation: self.target_operation.unwrap_or(defaults.target_operation),
                                fetch_size,
                                buffer_size,
                                batch_size,
                                commit_frequency,
                                target_worker_count })
    }
}

fn positive(option: &str, value: Option<usize>, default: usize) -> Result<usize> {
    match value {
        Some(0) => Err(FlowError::invalid_option("transfer", option, "must be greater than zero")),
        Some(n) => Ok(n),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_defaults_to_two_fetches_per_worker() {
        let props = TransferProperties::builder().fetch_size(100)
                                                 .target_worker_count(3)
                                                 .build()
                                                 .expect("valid");
        assert_eq!(props.buffer_size(), 600);
        assert_eq!(props.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(props.commit_frequency(), usize::MAX);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let err = TransferProperties::builder().batch_size(0).build().expect_err("zero batch");
        assert!(matches!(err, FlowError::InvalidOption { ref option, .. } if option == "batchSize"));
    }

    #[test]
    fn operation_defaults_depend_on_concat() {
        let props = TransferProperties::default();
        assert_eq!(props.resolved_operation(true), TransferOperation::Insert);
        assert_eq!(props.resolved_operation(false), TransferOperation::Copy);
        assert_eq!(default_mode(true), ProcessingMode::Batch);
        assert_eq!(default_mode(false), ProcessingMode::Stream);
        assert_eq!("move".parse::<SourceOperation>(), Ok(SourceOperation::Drop));
        assert_eq!("replace".parse::<TargetOperation>(), Ok(TargetOperation::Drop));
    }
}
