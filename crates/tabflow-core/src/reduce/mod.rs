//! Protocolo de reducción: identidad, acumulador, combinador y finalizador.
//!
//! Una `Reduction` describe cómo plegar muchos recursos en un acumulador y
//! cómo convertir ese acumulador en el recurso final. `ReductionStep` la
//! adapta al contrato de `ReducerStep` del scheduler.
//!
//! Leyes esperadas:
//! - `combine(identity(), x) == x == combine(x, identity())`
//! - `combine` es asociativo; las reducciones estadísticas además son
//!   conmutativas, los listados preservan el orden de inserción.

use crate::errors::Result;
use crate::pipeline::PipelineContext;
use crate::resource::ResourceRef;
use crate::step::{ProcessingMode, ReducerStep};

pub trait Reduction: Send {
    type Acc: Send;

    fn name(&self) -> &str;

    fn mode(&self) -> Option<ProcessingMode> { None }

    /// Acumulador vacío, con el esquema derivado de la configuración.
    fn identity(&self) -> Self::Acc;

    /// Pliega un elemento en el acumulador.
    fn accumulate(&self, acc: &mut Self::Acc, element: &ResourceRef) -> Result<()>;

    fn combine(&self, left: Self::Acc, right: Self::Acc) -> Self::Acc;

    /// Escribe el acumulador y devuelve los recursos resultantes.
    fn finish(&self, acc: Self::Acc, ctx: &PipelineContext) -> Result<Vec<ResourceRef>>;
}

/// Pliega `elements` desde la identidad.
pub fn fold<R: Reduction>(reduction: &R, elements: &[ResourceRef]) -> Result<R::Acc> {
    let mut acc = reduction.identity();
    for element in elements {
        reduction.accumulate(&mut acc, element)?;
    }
    Ok(acc)
}

/// Step reductor genérico. El acumulador es exclusivo de la instancia y se
/// reconstruye desde `identity` en cada `reset`.
pub struct ReductionStep<R: Reduction> {
    reduction: R,
    acc: R::Acc,
}

impl<R: Reduction> ReductionStep<R> {
    pub fn new(reduction: R) -> Self {
        let acc = reduction.identity();
        Self { reduction, acc }
    }

    pub fn reduction(&self) -> &R { &self.reduction }
}

impl<R: Reduction> ReducerStep for ReductionStep<R> {
    fn name(&self) -> &str { self.reduction.name() }

    fn mode(&self) -> Option<ProcessingMode> { self.reduction.mode() }

    fn accept(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<()> {
        self.reduction.accumulate(&mut self.acc, &input)
    }

    fn flush(&mut self, ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let acc = std::mem::replace(&mut self.acc, self.reduction.identity());
        self.reduction.finish(acc, ctx)
    }

    fn reset(&mut self) -> Result<()> {
        self.acc = self.reduction.identity();
        Ok(())
    }
}
