use crate::errors::Result;
use crate::named_enum;
use crate::pipeline::PipelineContext;
use crate::resource::ResourceRef;

named_enum! {
    /// Modo de procesamiento de un step.
    pub enum ProcessingMode {
        /// Acumular y luego emitir.
        Batch => "batch",
        /// Por elemento, inmediato.
        Stream => "stream",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    RootSupplier,
    Map,
    Reducer,
    ConsumerSupplier,
}

/// Origen de los recursos de un pipeline.
pub trait RootSupplier: Send {
    fn name(&self) -> &str;

    fn mode(&self) -> ProcessingMode;

    /// Fase de población inicial, llamada una vez por ejecución.
    fn on_start(&mut self, ctx: &PipelineContext) -> Result<()>;

    /// Siguiente recurso disponible.
    fn next(&mut self, ctx: &PipelineContext) -> Result<Option<ResourceRef>>;

    /// Modo stream: busca nuevos elementos cuando `next` no tiene más.
    /// Devuelve `false` si el origen quedó agotado de forma definitiva.
    fn poll(&mut self, _ctx: &PipelineContext) -> Result<bool> { Ok(false) }

    fn reset(&mut self) -> Result<()> { Ok(()) }
}

pub trait MapStep: Send {
    fn name(&self) -> &str;

    /// `None` hereda el modo del pipeline.
    fn mode(&self) -> Option<ProcessingMode> { None }

    fn apply(&mut self, input: ResourceRef, ctx: &PipelineContext) -> Result<Option<ResourceRef>>;

    fn reset(&mut self) -> Result<()> { Ok(()) }
}

pub trait ReducerStep: Send {
    fn name(&self) -> &str;

    fn mode(&self) -> Option<ProcessingMode> { None }

    fn accept(&mut self, input: ResourceRef, ctx: &PipelineContext) -> Result<()>;

    fn flush(&mut self, ctx: &PipelineContext) -> Result<Vec<ResourceRef>>;

    /// Reconstruye el estado inicial.
    fn reset(&mut self) -> Result<()>;
}

pub trait SplitStep: Send {
    fn name(&self) -> &str;

    fn mode(&self) -> Option<ProcessingMode> { None }

    fn split(&mut self, input: ResourceRef, ctx: &PipelineContext) -> Result<Vec<ResourceRef>>;

    fn reset(&mut self) -> Result<()> { Ok(()) }
}

/// Step intermedio de un pipeline.
pub enum PipelineStep {
    Map(Box<dyn MapStep>),
    Reducer(Box<dyn ReducerStep>),
    Split(Box<dyn SplitStep>),
}

impl PipelineStep {
    pub fn map<S: MapStep + 'static>(step: S) -> Self { PipelineStep::Map(Box::new(step)) }

    pub fn reducer<S: ReducerStep + 'static>(step: S) -> Self { PipelineStep::Reducer(Box::new(step)) }

    pub fn split<S: SplitStep + 'static>(step: S) -> Self { PipelineStep::Split(Box::new(step)) }

    pub fn name(&self) -> &str {
        match self {
            PipelineStep::Map(s) => s.name(),
            PipelineStep::Reducer(s) => s.name(),
            PipelineStep::Split(s) => s.name(),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            PipelineStep::Map(_) => StepKind::Map,
            PipelineStep::Reducer(_) => StepKind::Reducer,
            PipelineStep::Split(_) => StepKind::ConsumerSupplier,
        }
    }

    pub fn mode(&self) -> Option<ProcessingMode> {
        match self {
            PipelineStep::Map(s) => s.mode(),
            PipelineStep::Reducer(s) => s.mode(),
            PipelineStep::Split(s) => s.mode(),
        }
    }

    pub fn reset(&mut self) -> Result<()> {
        match self {
            PipelineStep::Map(s) => s.reset(),
            PipelineStep::Reducer(s) => s.reset(),
            PipelineStep::Split(s) => s.reset(),
        }
    }
}

impl std::fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStep")
         .field("name", &self.name())
         .field("kind", &self.kind())
         .field("mode", &self.mode())
         .finish()
    }
}
