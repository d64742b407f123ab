use dashmap::DashSet;
use log::debug;
use tabflow_core::{MapStep, PipelineContext, ResourceRef, Result};

/// Deja pasar sólo la primera aparición de cada recurso (por URI).
///
/// El conjunto es concurrente para admitir invocaciones desde varios hilos y
/// se reconstruye en `reset`.
pub struct DistinctStep {
    name: String,
    seen: DashSet<String>,
}

impl DistinctStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(),
               seen: DashSet::new() }
    }

    pub fn len(&self) -> usize { self.seen.len() }

    pub fn is_empty(&self) -> bool { self.seen.is_empty() }
}

impl MapStep for DistinctStep {
    fn name(&self) -> &str { &self.name }

    fn apply(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<Option<ResourceRef>> {
        if self.seen.insert(input.uri()) {
            Ok(Some(input))
        } else {
            debug!("distinct `{}`: {} already seen", self.name, input.uri());
            Ok(None)
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.seen = DashSet::new();
        Ok(())
    }
}
