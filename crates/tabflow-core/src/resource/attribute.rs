//! Atributos proyectables de un recurso.

use serde_json::Value;

use super::{DataResource, DataType};
use crate::coerce::{parse_name, NamedEnum};
use crate::errors::ConnectorError;
use crate::named_enum;

named_enum! {
    pub enum ResourceAttribute {
        DataUri => "data_uri" | "uri",
        Name => "name",
        LogicalName => "logical_name",
        Connection => "connection",
        MediaType => "media_type",
        Kind => "kind",
        Count => "count",
        Size => "size",
        Runtime => "runtime",
    }
}

/// Atributo conocido o clave libre del mapa de metadatos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKey {
    Known(ResourceAttribute),
    Custom(String),
}

impl AttributeKey {
    pub fn parse(name: &str) -> Self {
        match parse_name::<ResourceAttribute>(name) {
            Ok(known) => AttributeKey::Known(known),
            Err(_) => AttributeKey::Custom(name.to_string()),
        }
    }

    pub fn column_name(&self) -> String {
        match self {
            AttributeKey::Known(a) => a.name().to_string(),
            AttributeKey::Custom(name) => name.clone(),
        }
    }

    /// `count` y `size` son enteros; cualquier otro atributo es texto.
    pub fn data_type(&self) -> DataType {
        match self {
            AttributeKey::Known(ResourceAttribute::Count) | AttributeKey::Known(ResourceAttribute::Size) => DataType::Integer,
            _ => DataType::Varchar,
        }
    }

    /// Valor del atributo para `resource`; `Null` si no está disponible.
    pub fn value_of(&self, resource: &DataResource) -> Result<Value, ConnectorError> {
        let value = match self {
            AttributeKey::Known(attribute) => match attribute {
                ResourceAttribute::DataUri => Value::from(resource.uri()),
                ResourceAttribute::Name => Value::from(resource.address()),
                ResourceAttribute::LogicalName => Value::from(resource.logical_name()),
                ResourceAttribute::Connection => Value::from(resource.connection_name()),
                ResourceAttribute::MediaType => Value::from(resource.media_type()),
                ResourceAttribute::Kind => Value::from(resource.kind().name()),
                ResourceAttribute::Count => Value::from(resource.count()?),
                ResourceAttribute::Size => resource.size()?.map(Value::from).unwrap_or(Value::Null),
                ResourceAttribute::Runtime => Value::from(resource.is_runtime().to_string()),
            },
            AttributeKey::Custom(name) => resource.attribute(name).unwrap_or(Value::Null),
        };
        Ok(value)
    }
}
