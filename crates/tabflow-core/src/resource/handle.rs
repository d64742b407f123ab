//! Handle de un recurso de datos expuesto por un conector.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::Schema;
use crate::connector::{Connector, InsertOptions, InsertStream, SelectStream};
use crate::errors::ConnectorError;
use crate::named_enum;

named_enum! {
    /// Naturaleza tabular declarada por el conector.
    pub enum TabularKind {
        Table => "table",
        View => "view",
        Query => "query",
        /// Recurso con efecto lateral cuyo resultado es un registro (log).
        Command => "command",
        Memory => "memory",
    }
}

pub type ResourceRef = Arc<DataResource>;

/// Referencia a una entidad de datos direccionable.
///
/// La identidad es `(conexión, dirección)`. El esquema y los atributos se
/// pueden completar de forma incremental a través de una referencia
/// compartida; el motor nunca es dueño del recurso subyacente.
pub struct DataResource {
    connector: Arc<dyn Connector>,
    address: String,
    logical_name: String,
    kind: TabularKind,
    runtime: bool,
    container: bool,
    schema: RwLock<Schema>,
    attributes: RwLock<IndexMap<String, Value>>,
}

impl DataResource {
    pub fn new(connector: Arc<dyn Connector>, address: impl Into<String>) -> Self {
        let address = address.into();
        let logical_name = logical_name_of(&address);
        Self { connector,
               address,
               logical_name,
               kind: TabularKind::Table,
               runtime: false,
               container: false,
               schema: RwLock::new(Schema::new()),
               attributes: RwLock::new(IndexMap::new()) }
    }

    pub fn with_kind(mut self, kind: TabularKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_logical_name(mut self, name: impl Into<String>) -> Self {
        self.logical_name = name.into();
        self
    }

    pub fn with_schema(self, schema: Schema) -> Self {
        *self.schema.write() = schema;
        self
    }

    pub fn runtime(mut self, runtime: bool) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn container(mut self, container: bool) -> Self {
        self.container = container;
        self
    }

    pub fn into_ref(self) -> ResourceRef { Arc::new(self) }

    pub fn address(&self) -> &str { &self.address }

    pub fn logical_name(&self) -> &str { &self.logical_name }

    pub fn connection_name(&self) -> &str { self.connector.name() }

    pub fn connector(&self) -> &Arc<dyn Connector> { &self.connector }

    pub fn kind(&self) -> TabularKind { self.kind }

    pub fn media_type(&self) -> &'static str {
        match self.kind {
            TabularKind::Query => "text/sql",
            TabularKind::Command => "text/x-command",
            _ => "relation",
        }
    }

    pub fn is_runtime(&self) -> bool { self.runtime }

    pub fn is_container(&self) -> bool { self.container }

    /// `direccion@conexion`
    pub fn uri(&self) -> String { format!("{}@{}", self.address, self.connector.name()) }

    pub fn schema(&self) -> Schema { self.schema.read().clone() }

    pub fn set_schema(&self, schema: Schema) { *self.schema.write() = schema; }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes
            .read()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: Value) { self.attributes.write().insert(name.into(), value); }

    pub fn attributes(&self) -> IndexMap<String, Value> { self.attributes.read().clone() }

    pub fn exists(&self) -> Result<bool, ConnectorError> { self.connector.exists(self) }

    pub fn count(&self) -> Result<u64, ConnectorError> { self.connector.count(self) }

    pub fn size(&self) -> Result<Option<u64>, ConnectorError> { self.connector.size(self) }

    /// Direcciones (en la misma conexión) de los recursos de los que depende.
    pub fn dependencies(&self) -> Result<Vec<String>, ConnectorError> { self.connector.dependencies(self) }

    pub fn select(&self, fetch_size: usize) -> Result<Box<dyn SelectStream>, ConnectorError> {
        self.connector.select(self, fetch_size)
    }

    pub fn insert(&self, options: InsertOptions) -> Result<Box<dyn InsertStream>, ConnectorError> {
        self.connector.insert(self, options)
    }

    /// Ejecuta un recurso runtime y devuelve el handle del resultado.
    pub fn execute(&self) -> Result<ResourceRef, ConnectorError> { self.connector.execute(self) }
}

fn logical_name_of(address: &str) -> String {
    let last = address.rsplit(['/', '\\']).next().unwrap_or(address);
    match last.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => last.to_string(),
    }
}

impl PartialEq for DataResource {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.connector.name() == other.connector.name()
    }
}

impl Eq for DataResource {}

impl Hash for DataResource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.connector.name().hash(state);
    }
}

impl fmt::Debug for DataResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataResource")
         .field("uri", &self.uri())
         .field("kind", &self.kind)
         .field("runtime", &self.runtime)
         .finish()
    }
}

impl fmt::Display for DataResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}@{}", self.address, self.connector.name()) }
}
