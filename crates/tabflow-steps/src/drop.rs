//! Eliminación de recursos en orden de dependencias.
//!
//! Las entradas se agrupan por conexión; cada grupo se ordena con
//! `drop_order` (hijos antes que padres) y se elimina con una sola llamada al
//! conector.

use std::collections::HashSet;

use indexmap::IndexMap;
use log::{debug, info};
use serde_json::{Map, Value};
use tabflow_core::{apply_options, drop_order, step_options, PipelineContext, ReducerStep, ResourceRef, Result};

step_options! {
    pub enum DropOption for "drop" {
        /// Omite los recursos que no existen.
        IfExists => "ifExists": Boolean,
        /// Elimina también los recursos que dependen de los aceptados.
        Force => "force": Boolean,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropConfig {
    pub if_exists: bool,
    pub force: bool,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self { if_exists: true,
               force: false }
    }
}

impl DropConfig {
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let mut config = DropConfig::default();
        apply_options::<DropOption, _>(args, |option, value| {
            match option {
                DropOption::IfExists => config.if_exists = value.into_bool()?,
                DropOption::Force => config.force = value.into_bool()?,
            }
            Ok(())
        })?;
        Ok(config)
    }
}

/// Agrupa por conexión, sin repetir URIs y respetando el orden de llegada.
pub(crate) fn group_by_connection(resources: Vec<ResourceRef>) -> IndexMap<String, Vec<ResourceRef>> {
    let mut seen = HashSet::new();
    let mut groups: IndexMap<String, Vec<ResourceRef>> = IndexMap::new();
    for resource in resources {
        if seen.insert(resource.uri()) {
            groups.entry(resource.connection_name().to_string()).or_default().push(resource);
        }
    }
    groups
}

/// Con `ifExists` descarta los recursos inexistentes.
pub(crate) fn existing(step: &str, group: Vec<ResourceRef>, if_exists: bool) -> Result<Vec<ResourceRef>> {
    if !if_exists {
        return Ok(group);
    }
    let mut kept = Vec::with_capacity(group.len());
    for resource in group {
        if resource.exists()? {
            kept.push(resource);
        } else {
            debug!("{step}: {} does not exist", resource.uri());
        }
    }
    Ok(kept)
}

pub struct DropStep {
    name: String,
    config: DropConfig,
    pending: Vec<ResourceRef>,
}

impl DropStep {
    pub fn new(name: impl Into<String>, config: DropConfig) -> Self {
        Self { name: name.into(),
               config,
               pending: Vec::new() }
    }

    /// Agrega al grupo los recursos de la misma conexión que dependen
    /// (directa o transitivamente) de alguno del grupo.
    fn with_dependents(&self, mut group: Vec<ResourceRef>) -> Result<Vec<ResourceRef>> {
        let Some(first) = group.first() else {
            return Ok(group);
        };
        let candidates = first.connector().list("*")?;
        let mut addresses: HashSet<String> = group.iter().map(|r| r.address().to_string()).collect();
        loop {
            let mut added = false;
            for candidate in &candidates {
                if addresses.contains(candidate.address()) {
                    continue;
                }
                if candidate.dependencies()?.iter().any(|d| addresses.contains(d)) {
                    debug!("drop `{}`: {} depends on a dropped resource", self.name, candidate.uri());
                    addresses.insert(candidate.address().to_string());
                    group.push(candidate.clone());
                    added = true;
                }
            }
            if !added {
                return Ok(group);
            }
        }
    }
}

impl ReducerStep for DropStep {
    fn name(&self) -> &str { &self.name }

    fn accept(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<()> {
        self.pending.push(input);
        Ok(())
    }

    fn flush(&mut self, _ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let mut dropped = Vec::new();
        for (connection, group) in group_by_connection(std::mem::take(&mut self.pending)) {
            let mut group = existing(&self.name, group, self.config.if_exists)?;
            if self.config.force {
                group = self.with_dependents(group)?;
            }
            if group.is_empty() {
                continue;
            }
            let order = drop_order(&group);
            group[0].connector().drop_resources(&order.resources)?;
            info!("drop `{}`: {} data resources dropped in `{connection}`", self.name, order.resources.len());
            dropped.extend(order.resources);
        }
        Ok(dropped)
    }

    fn reset(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tabflow_core::{ConnectorRegistry, DataType, MemoryConnector, Schema};

    use super::*;

    fn setup() -> (Arc<MemoryConnector>, PipelineContext) {
        let mem = MemoryConnector::new("mem");
        let schema = Schema::new().with_column("id", DataType::Integer);
        for name in ["a", "b", "c"] {
            mem.create_table(name, schema.clone(), vec![]).expect("table");
        }
        mem.add_reference("b", "a").expect("b -> a");
        mem.add_reference("c", "b").expect("c -> b");
        let ctx = PipelineContext::new("test", Arc::new(ConnectorRegistry::new().with(mem.clone())));
        (mem, ctx)
    }

    fn feed(step: &mut DropStep, ctx: &PipelineContext, uris: &[&str]) -> Vec<String> {
        for uri in uris {
            step.accept(ctx.registry().resolve(uri).expect("resolve"), ctx).expect("accept");
        }
        step.flush(ctx).expect("flush").iter().map(|r| r.uri()).collect()
    }

    #[test]
    fn children_are_dropped_first() {
        let (mem, ctx) = setup();
        let mut step = DropStep::new("drop", DropConfig::default());
        assert_eq!(feed(&mut step, &ctx, &["a", "b", "c", "missing"]), vec!["c@mem", "b@mem", "a@mem"]);
        assert!(!mem.contains("a") && !mem.contains("b") && !mem.contains("c"));
    }

    #[test]
    fn force_drops_dependents_outside_the_set() {
        let (mem, ctx) = setup();
        let mut plain = DropStep::new("drop", DropConfig::default());
        plain.accept(ctx.registry().resolve("a").expect("resolve"), &ctx).expect("accept");
        assert!(plain.flush(&ctx).is_err());
        assert!(mem.contains("a"));

        let config = DropConfig::from_args(&json!({"force": true}).as_object().cloned().unwrap_or_default()).expect("options");
        let mut forced = DropStep::new("drop", config);
        assert_eq!(feed(&mut forced, &ctx, &["a"]), vec!["c@mem", "b@mem", "a@mem"]);
    }

    #[test]
    fn missing_resources_fail_without_if_exists() {
        let (_mem, ctx) = setup();
        let config = DropConfig { if_exists: false,
                                  force: false };
        let mut step = DropStep::new("drop", config);
        step.accept(ctx.registry().resolve("ghost").expect("resolve"), &ctx).expect("accept");
        assert!(step.flush(&ctx).is_err());
    }
}
