use log::info;
use serde_json::{Map, Value};
use tabflow_core::{apply_options, step_options, PipelineContext, ReducerStep, ResourceRef, Result};

use crate::drop::{existing, group_by_connection};

step_options! {
    pub enum TruncateOption for "truncate" {
        IfExists => "ifExists": Boolean,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncateConfig {
    pub if_exists: bool,
}

impl Default for TruncateConfig {
    fn default() -> Self { Self { if_exists: true } }
}

impl TruncateConfig {
    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let mut config = TruncateConfig::default();
        apply_options::<TruncateOption, _>(args, |option, value| {
            match option {
                TruncateOption::IfExists => config.if_exists = value.into_bool()?,
            }
            Ok(())
        })?;
        Ok(config)
    }
}

/// Vacía los recursos aceptados, por conexión y sin orden de dependencias.
pub struct TruncateStep {
    name: String,
    config: TruncateConfig,
    pending: Vec<ResourceRef>,
}

impl TruncateStep {
    pub fn new(name: impl Into<String>, config: TruncateConfig) -> Self {
        Self { name: name.into(),
               config,
               pending: Vec::new() }
    }
}

impl ReducerStep for TruncateStep {
    fn name(&self) -> &str { &self.name }

    fn accept(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<()> {
        self.pending.push(input);
        Ok(())
    }

    fn flush(&mut self, _ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let mut truncated = Vec::new();
        for (connection, group) in group_by_connection(std::mem::take(&mut self.pending)) {
            let group = existing(&self.name, group, self.config.if_exists)?;
            if group.is_empty() {
                continue;
            }
            group[0].connector().truncate(&group)?;
            info!("truncate `{}`: {} data resources in `{connection}`", self.name, group.len());
            truncated.extend(group);
        }
        Ok(truncated)
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

    #[test]
    fn truncates_without_ordering() {
        let mem = MemoryConnector::new("mem");
        let schema = Schema::new().with_column("id", DataType::Integer);
        mem.create_table("parent", schema.clone(), vec![vec![json!(1)]]).expect("parent");
        mem.create_table("child", schema, vec![vec![json!(1)], vec![json!(2)]]).expect("child");
        mem.add_reference("child", "parent").expect("fk");
        let ctx = PipelineContext::new("test", Arc::new(ConnectorRegistry::new().with(mem.clone())));
        let mut step = TruncateStep::new("truncate", TruncateConfig::default());
        for uri in ["parent", "child", "ghost"] {
            step.accept(ctx.registry().resolve(uri).expect("resolve"), &ctx).expect("accept");
        }
        let out: Vec<String> = step.flush(&ctx).expect("flush").iter().map(|r| r.uri()).collect();
        assert_eq!(out, vec!["parent@mem", "child@mem"]);
        assert!(mem.rows("parent").is_empty() && mem.rows("child").is_empty());
        assert!(mem.contains("parent"));
    }
}
