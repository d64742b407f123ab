use std::sync::Arc;

use indexmap::IndexMap;

use super::Connector;
use crate::errors::ConnectorError;
use crate::resource::ResourceRef;

/// Conexiones disponibles para un pipeline, indexadas por nombre.
///
/// La primera conexión registrada es la conexión por defecto para URIs sin
/// `@conexion`.
#[derive(Debug, Default, Clone)]
pub struct ConnectorRegistry {
    connectors: IndexMap<String, Arc<dyn Connector>>,
    default: Option<String>,
}

impl ConnectorRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.register(connector);
        self
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let name = connector.name().to_string();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.connectors.insert(name, connector);
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), ConnectorError> {
        self.get(name)?;
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Connector>, ConnectorError> {
        self.connectors
            .get(name)
            .ok_or_else(|| ConnectorError::not_found(format!("unknown connection `{name}`")))
    }

    pub fn default_connector(&self) -> Result<&Arc<dyn Connector>, ConnectorError> {
        match &self.default {
            Some(name) => self.get(name),
            None => Err(ConnectorError::not_found("no connection registered")),
        }
    }

    /// Resuelve `direccion@conexion` (o `direccion` en la conexión por defecto).
    pub fn resolve(&self, uri: &str) -> Result<ResourceRef, ConnectorError> {
        let (address, connection) = split_uri(uri);
        let connector = match connection {
            Some(name) => self.get(name)?,
            None => self.default_connector()?,
        };
        connector.resolve(address)
    }

    /// Recursos existentes que coinciden con `patron@conexion`.
    pub fn select(&self, selector: &str) -> Result<Vec<ResourceRef>, ConnectorError> {
        let (pattern, connection) = split_uri(selector);
        let connector = match connection {
            Some(name) => self.get(name)?,
            None => self.default_connector()?,
        };
        connector.list(pattern)
    }

    pub fn names(&self) -> Vec<&str> { self.connectors.keys().map(String::as_str).collect() }
}

/// Separa una URI en dirección y conexión (por la última `@`).
pub fn split_uri(uri: &str) -> (&str, Option<&str>) {
    match uri.rsplit_once('@') {
        Some((address, connection)) if !connection.is_empty() => (address, Some(connection)),
        _ => (uri, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;

    #[test]
    fn split_uri_uses_last_at() {
        assert_eq!(split_uri("orders@mem"), ("orders", Some("mem")));
        assert_eq!(split_uri("a@b@mem"), ("a@b", Some("mem")));
        assert_eq!(split_uri("orders"), ("orders", None));
    }

    #[test]
    fn resolve_defaults_to_first_connection() {
        let registry = ConnectorRegistry::new().with(MemoryConnector::new("mem"))
                                               .with(MemoryConnector::new("other"));
        let r = registry.resolve("orders").expect("resolve");
        assert_eq!(r.uri(), "orders@mem");
        let r = registry.resolve("orders@other").expect("resolve");
        assert_eq!(r.connection_name(), "other");
        assert!(registry.resolve("orders@missing").is_err());
    }
}
