//! Construcción y validación de pipelines.
//!
//! El builder sólo acumula configuración; `build` valida la composición de
//! modos y entrega un `Pipeline` cuya lista de steps ya no cambia.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use super::PipelineContext;
use crate::connector::ConnectorRegistry;
use crate::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::errors::{FlowError, Result};
use crate::named_enum;
use crate::step::{MapStep, PipelineStep, ProcessingMode, ReducerStep, RootSupplier, SplitStep};

named_enum! {
    /// Qué hacer cuando un step falla con un elemento.
    pub enum OnError {
        /// Propagar el error y detener el pipeline.
        Stop => "stop",
        /// Registrar, sumar al estado de salida y descartar el elemento.
        Discard => "discard",
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PipelineOptions {
    pub on_error: OnError,
    pub max_cycles: Option<u64>,
    pub poll_interval: Duration,
    pub window_interval: Option<Duration>,
    pub timeout: Option<Duration>,
}

pub struct PipelineBuilder {
    name: String,
    registry: Arc<ConnectorRegistry>,
    strict: bool,
    dev_env: bool,
    mode: Option<ProcessingMode>,
    options: PipelineOptions,
    root: Option<Box<dyn RootSupplier>>,
    steps: Vec<PipelineStep>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>, registry: Arc<ConnectorRegistry>) -> Self {
        Self { name: name.into(),
               registry,
               strict: false,
               dev_env: false,
               mode: None,
               options: PipelineOptions { on_error: OnError::Stop,
                                          max_cycles: None,
                                          poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
                                          window_interval: None,
                                          timeout: None },
               root: None,
               steps: Vec::new() }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn dev_env(mut self, dev_env: bool) -> Self {
        self.dev_env = dev_env;
        self
    }

    /// Modo heredado por los steps que no declaran el suyo.
    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn on_error(mut self, on_error: OnError) -> Self {
        self.options.on_error = on_error;
        self
    }

    /// Máximo de elementos tomados del supplier raíz.
    pub fn max_cycles(mut self, max_cycles: u64) -> Self {
        self.options.max_cycles = Some(max_cycles);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Ventana de vaciado de los reducers en modo stream.
    pub fn window_interval(mut self, interval: Duration) -> Self {
        self.options.window_interval = Some(interval);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn root<S: RootSupplier + 'static>(self, root: S) -> Self { self.root_boxed(Box::new(root)) }

    pub fn root_boxed(mut self, root: Box<dyn RootSupplier>) -> Self {
        self.root = Some(root);
        self
    }

    pub fn map<S: MapStep + 'static>(self, step: S) -> Self { self.step(PipelineStep::map(step)) }

    pub fn reducer<S: ReducerStep + 'static>(self, step: S) -> Self { self.step(PipelineStep::reducer(step)) }

    pub fn split<S: SplitStep + 'static>(self, step: S) -> Self { self.step(PipelineStep::split(step)) }

    pub fn step(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Valida y construye el pipeline.
    ///
    /// Un pipeline impulsado por un supplier stream no admite steps
    /// intermedios en modo batch: éstos esperan una entrada finita.
    pub fn build(self) -> Result<Pipeline> {
        let root = self.root
                       .ok_or_else(|| FlowError::Config(format!("pipeline `{}` has no root supplier", self.name)))?;
        let mode = root.mode();
        if mode == ProcessingMode::Stream && self.mode == Some(ProcessingMode::Batch) {
            return Err(FlowError::IncompatibleMode(format!("pipeline `{}` is driven by the stream supplier `{}` and cannot run in batch mode",
                                                           self.name,
                                                           root.name())));
        }
        let inherited = self.mode.unwrap_or(mode);
        if mode == ProcessingMode::Stream {
            if let Some(step) = self.steps.iter().find(|s| s.mode().unwrap_or(inherited) == ProcessingMode::Batch) {
                return Err(FlowError::IncompatibleMode(format!("step `{}` runs in batch mode but pipeline `{}` is driven by the stream supplier `{}`",
                                                               step.name(),
                                                               self.name,
                                                               root.name())));
            }
        }
        debug!("pipeline `{}` built: {} mode, {} intermediate steps", self.name, mode, self.steps.len());
        let ctx = PipelineContext::new(self.name, self.registry).with_strict(self.strict)
                                                                .with_dev_env(self.dev_env)
                                                                .with_mode(mode);
        Ok(Pipeline { options: self.options,
                      root,
                      steps: self.steps,
                      ctx })
    }
}

/// Pipeline listo para ejecutarse (ver `scheduler`).
pub struct Pipeline {
    pub(crate) options: PipelineOptions,
    pub(crate) root: Box<dyn RootSupplier>,
    pub(crate) steps: Vec<PipelineStep>,
    pub(crate) ctx: PipelineContext,
}

impl Pipeline {
    pub fn name(&self) -> &str { self.ctx.name() }

    pub fn context(&self) -> &PipelineContext { &self.ctx }

    pub fn mode(&self) -> ProcessingMode { self.ctx.mode() }

    pub fn len(&self) -> usize { self.steps.len() }

    pub fn is_empty(&self) -> bool { self.steps.is_empty() }

    pub fn step_names(&self) -> Vec<&str> { self.steps.iter().map(|s| s.name()).collect() }

    pub fn poll_interval(&self) -> Duration { self.options.poll_interval }

    pub fn window_interval(&self) -> Option<Duration> { self.options.window_interval }

    pub fn timeout(&self) -> Option<Duration> { self.options.timeout }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
         .field("name", &self.name())
         .field("mode", &self.mode())
         .field("root", &self.root.name())
         .field("steps", &self.steps)
         .finish()
    }
}
