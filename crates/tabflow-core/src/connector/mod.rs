//! Contrato de conectores.
//!
//! El motor sólo conoce este contrato: resolver/crear recursos, leer y
//! escribir filas mediante streams, contar, eliminar y vaciar recursos,
//! reportar dependencias y ejecutar recursos runtime. Las implementaciones
//! concretas (SQL, sistema de archivos) viven fuera del core; `MemoryConnector`
//! cubre el contrato en proceso.

mod memory;
mod registry;

pub use memory::{MemoryConnector, RuntimeFn};
pub use registry::{split_uri, ConnectorRegistry};

use std::fmt::Debug;

use crate::constants::DEFAULT_BATCH_SIZE;
use crate::errors::ConnectorError;
use crate::named_enum;
use crate::resource::{DataResource, ResourceRef, Row};

named_enum! {
    /// Estrategia de un upsert cuando el destino tiene clave primaria.
    pub enum UpsertType {
        Merge => "merge",
        InsertUpdate => "insert-update",
        UpdateInsert => "update-insert",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Upsert(UpsertType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOptions {
    pub mode: WriteMode,
    pub batch_size: usize,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self { mode: WriteMode::Append,
               batch_size: DEFAULT_BATCH_SIZE }
    }
}

/// Iterador de filas por bloques de `fetch_size`.
pub trait SelectStream: Send {
    /// Siguiente bloque; `None` al terminar.
    fn next_chunk(&mut self) -> Result<Option<Vec<Row>>, ConnectorError>;
}

/// Sumidero de filas con lotes y commits explícitos.
pub trait InsertStream: Send {
    fn insert(&mut self, row: Row) -> Result<(), ConnectorError>;

    /// Envía las filas pendientes como un lote de escritura.
    fn flush_batch(&mut self) -> Result<(), ConnectorError>;

    /// Hace visibles los lotes enviados.
    fn commit(&mut self) -> Result<(), ConnectorError>;

    /// Envía y confirma lo pendiente y libera el stream.
    fn close(&mut self) -> Result<(), ConnectorError>;
}

pub trait Connector: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Obtiene (o prepara sin crear) el handle de `address`.
    fn resolve(&self, address: &str) -> Result<ResourceRef, ConnectorError>;

    /// Recursos existentes cuya dirección coincide con el patrón glob.
    fn list(&self, pattern: &str) -> Result<Vec<ResourceRef>, ConnectorError>;

    fn exists(&self, resource: &DataResource) -> Result<bool, ConnectorError>;

    /// Crea el recurso con el esquema actual del handle.
    fn create(&self, resource: &DataResource) -> Result<(), ConnectorError>;

    /// Elimina los recursos en el orden recibido.
    fn drop_resources(&self, resources: &[ResourceRef]) -> Result<(), ConnectorError>;

    fn truncate(&self, resources: &[ResourceRef]) -> Result<(), ConnectorError>;

    fn count(&self, resource: &DataResource) -> Result<u64, ConnectorError>;

    fn size(&self, resource: &DataResource) -> Result<Option<u64>, ConnectorError>;

    fn dependencies(&self, resource: &DataResource) -> Result<Vec<String>, ConnectorError>;

    fn select(&self, resource: &DataResource, fetch_size: usize) -> Result<Box<dyn SelectStream>, ConnectorError>;

    fn insert(&self, resource: &DataResource, options: InsertOptions) -> Result<Box<dyn InsertStream>, ConnectorError>;

    /// Ejecuta un recurso runtime; el handle devuelto expone las filas
    /// producidas.
    fn execute(&self, resource: &DataResource) -> Result<ResourceRef, ConnectorError>;

    /// Envuelve un recurso no runtime en uno ejecutable.
    fn runtime_wrapper(&self, resource: &DataResource) -> Result<ResourceRef, ConnectorError> {
        Err(ConnectorError::unsupported(format!("connection `{}` cannot build a runtime for `{}`", self.name(), resource.uri())))
    }

    /// Texto del ejecutable de un runtime, si es textual.
    fn executable_text(&self, _resource: &DataResource) -> Option<String> { None }

    /// Escritores concurrentes admitidos por la conexión.
    fn max_writer_connections(&self) -> usize { usize::MAX }
}
