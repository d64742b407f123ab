//! Listado de recursos: una fila por elemento con los atributos pedidos, en
//! el orden de llegada.

use log::info;
use serde_json::{Map, Value};
use tabflow_core::resource::{materialize, AttributeKey, ResourceAttribute};
use tabflow_core::{apply_options, step_options, Column, FlowError, PipelineContext, ProcessingMode, Reduction, ResourceRef, Result, Row, Schema,
                   TargetTemplate};

pub const DEFAULT_LIST_TARGET: &str = "data_resource_list";

step_options! {
    pub enum ListOption for "list" {
        Attributes => "attributes": TextList,
        TargetUri => "targetUri": Text,
        ProcessingType => "processingType": Text,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListConfig {
    attributes: Vec<AttributeKey>,
    target: TargetTemplate,
    mode: Option<ProcessingMode>,
}

impl ListConfig {
    pub fn new(attributes: &[&str]) -> Result<Self> {
        let attributes = if attributes.is_empty() {
            vec![AttributeKey::Known(ResourceAttribute::DataUri), AttributeKey::Known(ResourceAttribute::MediaType)]
        } else {
            attributes.iter().map(|a| AttributeKey::parse(a)).collect()
        };
        Ok(Self { attributes,
                  target: concat_target(DEFAULT_LIST_TARGET, "list")?,
                  mode: None })
    }

    pub fn target(mut self, uri: &str) -> Result<Self> {
        self.target = concat_target(uri, "list")?;
        Ok(self)
    }

    pub fn mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn from_args(args: &Map<String, Value>) -> Result<Self> {
        let mut attributes: Vec<String> = Vec::new();
        let mut target: Option<String> = None;
        let mut mode = None;
        apply_options::<ListOption, _>(args, |option, value| {
            match option {
                ListOption::Attributes => attributes = value.into_list()?,
                ListOption::TargetUri => target = Some(value.into_text()?),
                ListOption::ProcessingType => mode = Some(value.into_enum()?),
            }
            Ok(())
        })?;
        let names: Vec<&str> = attributes.iter().map(String::as_str).collect();
        let mut config = Self::new(&names)?;
        if let Some(target) = target {
            config = config.target(&target)?;
        }
        config.mode = mode;
        Ok(config)
    }

    /// Columnas del listado; los nombres repetidos reciben un sufijo `_<n>`.
    pub fn schema(&self) -> Schema {
        let mut columns: Vec<Column> = Vec::with_capacity(self.attributes.len());
        for attribute in &self.attributes {
            let base = attribute.column_name();
            let mut name = base.clone();
            let mut n = 1;
            while columns.iter().any(|c| c.name.eq_ignore_ascii_case(&name)) {
                name = format!("{base}_{n}");
                n += 1;
            }
            columns.push(Column::new(name, attribute.data_type()));
        }
        Schema::from_columns(columns)
    }

    pub fn attributes(&self) -> &[AttributeKey] { &self.attributes }
}

/// Plantilla de destino de un reductor: no puede depender de una entrada.
pub(crate) fn concat_target(uri: &str, step: &str) -> Result<TargetTemplate> {
    let template = TargetTemplate::parse(uri)?;
    if !template.is_concat() {
        return Err(FlowError::invalid_option(step, "targetUri", "the target of a reduction cannot use input variables"));
    }
    Ok(template)
}

pub struct ListReduction {
    name: String,
    config: ListConfig,
    schema: Schema,
}

impl ListReduction {
    pub fn new(name: impl Into<String>, config: ListConfig) -> Self {
        let name = name.into();
        if !config.attributes.contains(&AttributeKey::Known(ResourceAttribute::Count)) {
            info!("list `{name}`: tip, add the `count` attribute to know how many rows each data resource holds");
        }
        let schema = config.schema();
        Self { name, config, schema }
    }
}

impl Reduction for ListReduction {
    type Acc = Vec<Row>;

    fn name(&self) -> &str { &self.name }

    fn mode(&self) -> Option<ProcessingMode> { self.config.mode }

    fn identity(&self) -> Vec<Row> { Vec::new() }

    fn accumulate(&self, acc: &mut Vec<Row>, element: &ResourceRef) -> Result<()> {
        let row = self.config
                      .attributes
                      .iter()
                      .map(|attribute| attribute.value_of(element))
                      .collect::<std::result::Result<Row, _>>()?;
        acc.push(row);
        Ok(())
    }

    fn combine(&self, mut left: Vec<Row>, right: Vec<Row>) -> Vec<Row> {
        left.extend(right);
        left
    }

    fn finish(&self, acc: Vec<Row>, ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
        let target = ctx.registry().resolve(self.config.target.as_str())?;
        info!("list `{}`: {} rows into {}", self.name, acc.len(), target.uri());
        materialize(&target, self.schema.clone(), acc)?;
        Ok(vec![target])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use serde_json::json;
    use tabflow_core::reduce::fold;
    use tabflow_core::{ConnectorRegistry, DataType, MemoryConnector};

    use super::*;

    #[test]
    fn duplicate_attributes_get_suffixes() {
        let config = ListConfig::new(&["uri", "count", "data_uri", "URI", "owner"]).expect("config");
        let schema = config.schema();
        assert_eq!(schema.names(), vec!["data_uri", "count", "data_uri_1", "data_uri_2", "owner"]);
        assert_eq!(schema.columns()[1].data_type, DataType::Integer);
        assert_eq!(schema.columns()[4].data_type, DataType::Varchar);
    }

    #[test]
    fn default_attributes_and_variable_targets() {
        let config = ListConfig::new(&[]).expect("config");
        assert_eq!(config.schema().names(), vec!["data_uri", "media_type"]);
        assert!(config.target("list_${input_name}").is_err());
    }

    #[test]
    fn finish_materializes_rows_in_order() {
        let mem = MemoryConnector::new("mem");
        let ctx = PipelineContext::new("test", Arc::new(ConnectorRegistry::new().with(mem.clone())));
        let schema = Schema::new().with_column("id", DataType::Integer);
        let a = mem.create_table("a", schema.clone(), vec![vec![json!(1)]]).expect("a");
        let b = mem.create_table("b", schema, vec![]).expect("b");
        let list = ListReduction::new("list", ListConfig::new(&["name", "count"]).expect("config"));
        let acc = fold(&list, &[a, b]).expect("fold");
        let out = list.finish(acc, &ctx).expect("finish");
        assert_eq!(out[0].uri(), "data_resource_list@mem");
        assert_eq!(mem.rows("data_resource_list"), vec![vec![json!("a"), json!(1)], vec![json!("b"), json!(0)]]);
    }

    fn rows() -> impl Strategy<Value = Vec<Row>> {
        prop::collection::vec(prop::collection::vec(any::<i64>().prop_map(Value::from), 1..3), 0..6)
    }

    proptest! {
        #[test]
        fn combine_has_identity_and_is_associative(x in rows(), y in rows(), z in rows()) {
            let list = ListReduction::new("list", ListConfig::new(&["uri", "count"]).expect("config"));
            prop_assert_eq!(list.combine(list.identity(), x.clone()), x.clone());
            prop_assert_eq!(list.combine(x.clone(), list.identity()), x.clone());
            let left = list.combine(list.combine(x.clone(), y.clone()), z.clone());
            let right = list.combine(x, list.combine(y, z));
            prop_assert_eq!(left, right);
        }
    }
}
