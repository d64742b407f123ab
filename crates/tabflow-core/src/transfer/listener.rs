//! Registro del resultado de cada par de una transferencia.

use std::ops::AddAssign;
use std::time::Duration;

use serde_json::Value;

use super::{ResolvedMapping, TransferOperation, TransferPair};
use crate::coerce::NamedEnum;
use crate::resource::{DataType, Row, Schema};

/// Contadores de escritura de un stream (o de la suma de varios).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub rows: u64,
    pub batches: u64,
    pub commits: u64,
}

impl AddAssign for WriteStats {
    fn add_assign(&mut self, other: Self) {
        self.rows += other.rows;
        self.batches += other.batches;
        self.commits += other.commits;
    }
}

/// Resultado de un par: la operación y la correspondencia de columnas con
/// que se planificó, más los contadores de la copia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferListener {
    pub source_uri: String,
    pub target_uri: String,
    pub operation: TransferOperation,
    pub mapping: ResolvedMapping,
    pub stats: WriteStats,
    pub latency: Duration,
    pub error_message: Option<String>,
}

impl TransferListener {
    pub fn new(pair: &TransferPair, operation: TransferOperation, mapping: ResolvedMapping) -> Self {
        Self { source_uri: pair.source_uri(),
               target_uri: pair.target_uri(),
               operation,
               mapping,
               stats: WriteStats::default(),
               latency: Duration::ZERO,
               error_message: None }
    }

    pub fn fail(&mut self, message: impl Into<String>) { self.error_message = Some(message.into()); }

    pub fn is_success(&self) -> bool { self.error_message.is_none() }

    /// 0 si el par terminó bien, 1 si falló.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Esquema de la salida `summary`.
    pub fn summary_schema() -> Schema {
        Schema::new().with_column("source_uri", DataType::Varchar)
                     .with_column("target_uri", DataType::Varchar)
                     .with_column("operation", DataType::Varchar)
                     .with_column("rows", DataType::Integer)
                     .with_column("batches", DataType::Integer)
                     .with_column("commits", DataType::Integer)
                     .with_column("latency_millis", DataType::Integer)
                     .with_column("exit_code", DataType::Integer)
                     .with_column("error_message", DataType::Varchar)
    }

    pub fn summary_row(&self) -> Row {
        vec![Value::from(self.source_uri.clone()),
             Value::from(self.target_uri.clone()),
             Value::from(self.operation.name()),
             Value::from(self.stats.rows),
             Value::from(self.stats.batches),
             Value::from(self.stats.commits),
             Value::from(self.latency.as_millis() as u64),
             Value::from(self.exit_code()),
             self.error_message.clone().map(Value::from).unwrap_or(Value::Null)]
    }
}

/// Resultado de una llamada a `TransferManager::transfer`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub listeners: Vec<TransferListener>,
}

impl TransferReport {
    /// Suma de los códigos de salida de los pares.
    pub fn exit_code(&self) -> i32 { self.listeners.iter().map(TransferListener::exit_code).sum() }

    pub fn is_success(&self) -> bool { self.listeners.iter().all(TransferListener::is_success) }

    pub fn rows(&self) -> u64 { self.listeners.iter().map(|l| l.stats.rows).sum() }
}
