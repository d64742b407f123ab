use std::collections::HashSet;

use log::debug;
use tabflow_core::{PipelineContext, ResourceRef, Result, SplitStep};

/// Emite cada recurso seguido de sus dependencias resolubles, en anchura y
/// cada una una sola vez.
///
/// Una dependencia que no existe en la conexión del recurso se omite.
pub struct DependenciesStep {
    name: String,
}

impl DependenciesStep {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
}

impl SplitStep for DependenciesStep {
    fn name(&self) -> &str { &self.name }

    fn split(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let mut seen = HashSet::from([input.uri()]);
        let mut out = vec![input];
        let mut next = 0;
        while next < out.len() {
            let current = out[next].clone();
            next += 1;
            for address in current.dependencies()? {
                let dependency = current.connector().resolve(&address)?;
                if !dependency.exists()? {
                    debug!("dependencies `{}`: {} depends on missing {}", self.name, current.uri(), dependency.uri());
                    continue;
                }
                if seen.insert(dependency.uri()) {
                    out.push(dependency);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tabflow_core::{ConnectorRegistry, DataType, MemoryConnector, Schema};

    use super::*;

    #[test]
    fn transitive_dependencies_once_each() {
        let mem = MemoryConnector::new("mem");
        let ctx = PipelineContext::new("test", Arc::new(ConnectorRegistry::new().with(mem.clone())));
        let schema = Schema::new().with_column("id", DataType::Integer);
        mem.create_table("a", schema.clone(), vec![]).expect("a");
        mem.create_table("b", schema.clone(), vec![]).expect("b");
        let c = mem.create_table("c", schema.clone(), vec![]).expect("c");
        mem.create_view("v", schema, &["a", "b", "ghost"]).expect("v");
        mem.add_reference("b", "a").expect("b -> a");
        mem.add_reference("c", "b").expect("c -> b");
        mem.add_reference("c", "v").expect("c -> v");

        let mut step = DependenciesStep::new("dependencies");
        let out: Vec<String> = step.split(c, &ctx).expect("split").iter().map(|r| r.uri()).collect();
        assert_eq!(out, vec!["c@mem", "b@mem", "v@mem", "a@mem"]);
    }
}
