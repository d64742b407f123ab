//! Plantillas de nombres de destino.
//!
//! Una plantilla es una URI (`direccion@conexion`) que puede contener
//! variables `${...}` calculadas a partir del recurso de entrada. Sin `@` el
//! destino queda en la conexión por defecto del registro.

use std::fmt;

use crate::coerce::{parse_name, NamedEnum};
use crate::connector::ConnectorRegistry;
use crate::errors::{ConnectorError, FlowError, Result};
use crate::named_enum;
use crate::resource::{DataResource, ResourceRef};

named_enum! {
    pub enum TemplateVariable {
        InputLogicalName => "input_logical_name",
        InputName => "input_name",
        InputConnection => "input_connection",
        InputKind => "input_kind",
    }
}

impl TemplateVariable {
    fn value(&self, input: &DataResource) -> String {
        match self {
            TemplateVariable::InputLogicalName => input.logical_name().to_string(),
            TemplateVariable::InputName => input.address().to_string(),
            TemplateVariable::InputConnection => input.connection_name().to_string(),
            TemplateVariable::InputKind => input.kind().name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(TemplateVariable),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl TargetTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = raw;
        while let Some(start) = rest.find("${") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find('}')
                           .ok_or_else(|| FlowError::Config(format!("unterminated variable in target template `{raw}`")))?;
            let name = &after[..end];
            let variable = parse_name::<TemplateVariable>(name).map_err(|_| {
                               FlowError::Config(format!("unknown variable `{name}` in target template `{raw}` (valid variables: {})",
                                                         TemplateVariable::names().join(", ")))
                           })?;
            segments.push(Segment::Variable(variable));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        if segments.is_empty() {
            return Err(FlowError::Config("target template is empty".to_string()));
        }
        Ok(Self { raw: raw.to_string(),
                  segments })
    }

    pub fn as_str(&self) -> &str { &self.raw }

    /// Sin variables todas las entradas van al mismo destino.
    pub fn is_concat(&self) -> bool { !self.segments.iter().any(|s| matches!(s, Segment::Variable(_))) }

    pub fn render(&self, input: &DataResource) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.clone(),
                Segment::Variable(variable) => variable.value(input),
            })
            .collect()
    }

    /// Handle del destino para `input`.
    pub fn resolve(&self, input: &DataResource, registry: &ConnectorRegistry) -> std::result::Result<ResourceRef, ConnectorError> {
        registry.resolve(&self.render(input))
    }
}

impl fmt::Display for TargetTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{Connector, MemoryConnector};

    #[test]
    fn renders_input_variables() {
        let mem = MemoryConnector::new("mem");
        let input = mem.resolve("dir/orders.csv").expect("resolve");
        let template = TargetTemplate::parse("stage_${input_logical_name}@${input_connection}").expect("template");
        assert!(!template.is_concat());
        assert_eq!(template.render(&input), "stage_orders@mem");
        assert_eq!(TargetTemplate::parse("${inputName}").expect("template").render(&input), "dir/orders.csv");
    }

    #[test]
    fn literal_template_is_concat() {
        let template = TargetTemplate::parse("all_orders@warehouse").expect("template");
        assert!(template.is_concat());
    }

    #[test]
    fn unknown_or_unterminated_variables_are_rejected() {
        let err = TargetTemplate::parse("${input_size}").expect_err("unknown variable");
        assert!(err.to_string().contains("input_logical_name, input_name, input_connection, input_kind"));
        assert!(TargetTemplate::parse("x_${input_name").is_err());
        assert!(TargetTemplate::parse("").is_err());
    }
}
