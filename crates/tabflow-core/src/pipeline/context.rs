use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::connector::ConnectorRegistry;
use crate::step::ProcessingMode;

/// Estado compartido por todos los steps durante una ejecución.
///
/// El estado de salida sólo crece: los steps suman sus fallos y nunca lo
/// reducen.
#[derive(Debug)]
pub struct PipelineContext {
    name: String,
    strict: bool,
    dev_env: bool,
    mode: ProcessingMode,
    exit_status: AtomicI32,
    registry: Arc<ConnectorRegistry>,
}

impl PipelineContext {
    pub fn new(name: impl Into<String>, registry: Arc<ConnectorRegistry>) -> Self {
        Self { name: name.into(),
               strict: false,
               dev_env: false,
               mode: ProcessingMode::Batch,
               exit_status: AtomicI32::new(0),
               registry }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_dev_env(mut self, dev_env: bool) -> Self {
        self.dev_env = dev_env;
        self
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn is_strict(&self) -> bool { self.strict }

    /// Entorno de desarrollo: los defectos de programación siempre se propagan.
    pub fn is_dev_env(&self) -> bool { self.dev_env }

    pub fn mode(&self) -> ProcessingMode { self.mode }

    pub fn registry(&self) -> &ConnectorRegistry { &self.registry }

    pub fn exit_status(&self) -> i32 { self.exit_status.load(Ordering::SeqCst) }

    /// Suma `status` al estado de salida.
    pub fn add_exit_status(&self, status: i32) {
        if status <= 0 {
            return;
        }
        let _ = self.exit_status
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| Some(current.saturating_add(status)));
    }

    /// Garantiza un estado de salida distinto de cero.
    pub fn mark_failed(&self) {
        let _ = self.exit_status
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| Some(current.max(1)));
    }

    pub(crate) fn reset_exit_status(&self) { self.exit_status.store(0, Ordering::SeqCst); }
}
