//! Conector en memoria.
//!
//! Implementa el contrato completo en proceso: tablas y vistas con
//! referencias (FK) que se verifican al eliminar, recursos runtime respaldados
//! por closures, upsert por clave primaria, contador de commits y fallos
//! inyectables por recurso.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Connector, InsertOptions, InsertStream, SelectStream, WriteMode};
use crate::errors::{ConnectorError, ConnectorErrorKind};
use crate::resource::{DataResource, ResourceRef, Row, Schema, TabularKind};

/// Cuerpo de un recurso runtime: produce el esquema y las filas del resultado.
pub type RuntimeFn = Arc<dyn Fn() -> Result<(Schema, Vec<Row>), ConnectorError> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    kind: TabularKind,
    schema: Schema,
    rows: Vec<Row>,
    references: Vec<String>,
    commits: usize,
    failure: Option<ConnectorError>,
    runtime: Option<RuntimeFn>,
    executable: Option<String>,
    transient: bool,
    attributes: IndexMap<String, Value>,
}

impl Entry {
    fn new(kind: TabularKind, schema: Schema) -> Self {
        Self { kind,
               schema,
               rows: Vec::new(),
               references: Vec::new(),
               commits: 0,
               failure: None,
               runtime: None,
               executable: None,
               transient: false,
               attributes: IndexMap::new() }
    }

    fn check(&self) -> Result<(), ConnectorError> {
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

pub struct MemoryConnector {
    name: String,
    me: Weak<MemoryConnector>,
    entries: Mutex<IndexMap<String, Entry>>,
    max_writers: usize,
}

impl fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnector")
         .field("name", &self.name)
         .field("resources", &self.entries.lock().len())
         .finish()
    }
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>) -> Arc<Self> { Self::with_max_writers(name, usize::MAX) }

    /// Conexión que admite como máximo `max_writers` escritores concurrentes.
    pub fn with_max_writers(name: impl Into<String>, max_writers: usize) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|me| Self { name,
                                    me: me.clone(),
                                    entries: Mutex::new(IndexMap::new()),
                                    max_writers: max_writers.max(1) })
    }

    fn this(&self) -> Result<Arc<dyn Connector>, ConnectorError> {
        match self.me.upgrade() {
            Some(me) => Ok(me as Arc<dyn Connector>),
            None => Err(ConnectorError::defect(format!("memory connection `{}` is gone", self.name))),
        }
    }

    fn handle_for(&self, address: &str, entry: Option<&Entry>) -> Result<ResourceRef, ConnectorError> {
        let mut resource = DataResource::new(self.this()?, address);
        if let Some(entry) = entry {
            resource = resource.with_kind(entry.kind)
                               .runtime(entry.runtime.is_some())
                               .with_schema(entry.schema.clone());
        }
        let resource = resource.into_ref();
        if let Some(entry) = entry {
            for (key, value) in &entry.attributes {
                resource.set_attribute(key.clone(), value.clone());
            }
        }
        Ok(resource)
    }

    fn missing(&self, address: &str) -> ConnectorError {
        ConnectorError::not_found(format!("`{address}` does not exist in connection `{}`", self.name))
    }

    /// Crea (o reemplaza) una tabla con filas.
    pub fn create_table(&self, address: &str, schema: Schema, rows: Vec<Row>) -> Result<ResourceRef, ConnectorError> {
        let mut entry = Entry::new(TabularKind::Table, schema);
        entry.rows = rows;
        self.entries.lock().insert(address.to_string(), entry.clone());
        self.handle_for(address, Some(&entry))
    }

    /// Crea una vista que depende de `depends_on`.
    pub fn create_view(&self, address: &str, schema: Schema, depends_on: &[&str]) -> Result<ResourceRef, ConnectorError> {
        let mut entry = Entry::new(TabularKind::View, schema);
        entry.references = depends_on.iter().map(|s| s.to_string()).collect();
        self.entries.lock().insert(address.to_string(), entry.clone());
        self.handle_for(address, Some(&entry))
    }

    /// Declara que `child` referencia a `parent` (clave foránea).
    pub fn add_reference(&self, child: &str, parent: &str) -> Result<(), ConnectorError> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(child).ok_or_else(|| self.missing(child))?;
        if !entry.references.iter().any(|r| r == parent) {
            entry.references.push(parent.to_string());
        }
        Ok(())
    }

    /// Registra un recurso runtime.
    pub fn register_runtime(&self,
                            address: &str,
                            kind: TabularKind,
                            executable: Option<&str>,
                            body: RuntimeFn)
                            -> Result<ResourceRef, ConnectorError> {
        let mut entry = Entry::new(kind, Schema::new());
        entry.runtime = Some(body);
        entry.executable = executable.map(String::from);
        self.store(address, entry)
    }

    fn store(&self, address: &str, entry: Entry) -> Result<ResourceRef, ConnectorError> {
        self.entries.lock().insert(address.to_string(), entry.clone());
        self.handle_for(address, Some(&entry))
    }

    pub fn set_attribute(&self, address: &str, key: &str, value: Value) -> Result<(), ConnectorError> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(address).ok_or_else(|| self.missing(address))?;
        entry.attributes.insert(key.to_string(), value);
        Ok(())
    }

    /// Hace fallar toda lectura, escritura o conteo posterior de `address`.
    pub fn fail_on(&self, address: &str, error: ConnectorError) -> Result<(), ConnectorError> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(address).ok_or_else(|| self.missing(address))?;
        entry.failure = Some(error);
        Ok(())
    }

    pub fn rows(&self, address: &str) -> Vec<Row> {
        self.entries.lock().get(address).map(|e| e.rows.clone()).unwrap_or_default()
    }

    pub fn commits(&self, address: &str) -> usize { self.entries.lock().get(address).map(|e| e.commits).unwrap_or(0) }

    pub fn contains(&self, address: &str) -> bool { self.entries.lock().contains_key(address) }

    fn run(&self, address: &str) -> Result<(Schema, Vec<Row>), ConnectorError> {
        let body = {
            let entries = self.entries.lock();
            let entry = entries.get(address).ok_or_else(|| self.missing(address))?;
            entry.check()?;
            match &entry.runtime {
                Some(body) => body.clone(),
                None => return Err(ConnectorError::unsupported(format!("`{address}` is not a runtime"))),
            }
        };
        body().map_err(|e| e.with_frame(format!("runtime `{address}@{}`", self.name)))
    }

    fn apply(&self, address: &str, mode: WriteMode, rows: Vec<Row>) -> Result<(), ConnectorError> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(address).ok_or_else(|| self.missing(address))?;
        entry.check()?;
        let keys = entry.schema.primary_key_indexes();
        match mode {
            WriteMode::Upsert(_) if !keys.is_empty() => {
                for row in rows {
                    let existing = entry.rows
                                        .iter()
                                        .position(|r| keys.iter().all(|&k| r.get(k) == row.get(k)));
                    match existing {
                        Some(i) => entry.rows[i] = row,
                        None => entry.rows.push(row),
                    }
                }
            }
            _ => entry.rows.extend(rows),
        }
        entry.commits += 1;
        Ok(())
    }
}

impl Connector for MemoryConnector {
    fn name(&self) -> &str { &self.name }

    fn resolve(&self, address: &str) -> Result<ResourceRef, ConnectorError> {
        let entry = self.entries.lock().get(address).cloned();
        self.handle_for(address, entry.as_ref())
    }

    fn list(&self, pattern: &str) -> Result<Vec<ResourceRef>, ConnectorError> {
        let glob = glob::Pattern::new(pattern)
            .map_err(|e| ConnectorError::new(ConnectorErrorKind::Other, format!("invalid selector `{pattern}`: {e}")))?;
        let matched: Vec<(String, Entry)> = self.entries
                                                .lock()
                                                .iter()
                                                .filter(|(address, entry)| !entry.transient && glob.matches(address))
                                                .map(|(a, e)| (a.clone(), e.clone()))
                                                .collect();
        matched.iter().map(|(address, entry)| self.handle_for(address, Some(entry))).collect()
    }

    fn exists(&self, resource: &DataResource) -> Result<bool, ConnectorError> {
        Ok(self.entries.lock().contains_key(resource.address()))
    }

    fn create(&self, resource: &DataResource) -> Result<(), ConnectorError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(resource.address()) {
            return Err(ConnectorError::constraint(format!("`{}` already exists", resource.uri())));
        }
        entries.insert(resource.address().to_string(), Entry::new(resource.kind(), resource.schema()));
        Ok(())
    }

    fn drop_resources(&self, resources: &[ResourceRef]) -> Result<(), ConnectorError> {
        let mut entries = self.entries.lock();
        for resource in resources {
            let address = resource.address();
            if !entries.contains_key(address) {
                return Err(self.missing(address));
            }
            let dependent = entries.iter()
                                   .find(|(other, entry)| {
                                       other.as_str() != address && entry.references.iter().any(|r| r == address)
                                   })
                                   .map(|(other, _)| other.clone());
            if let Some(dependent) = dependent {
                return Err(ConnectorError::constraint(format!("cannot drop `{address}`: `{dependent}` depends on it")));
            }
            entries.shift_remove(address);
        }
        Ok(())
    }

    fn truncate(&self, resources: &[ResourceRef]) -> Result<(), ConnectorError> {
        let mut entries = self.entries.lock();
        for resource in resources {
            let entry = entries.get_mut(resource.address()).ok_or_else(|| self.missing(resource.address()))?;
            entry.check()?;
            entry.rows.clear();
        }
        Ok(())
    }

    fn count(&self, resource: &DataResource) -> Result<u64, ConnectorError> {
        {
            let entries = self.entries.lock();
            let entry = entries.get(resource.address()).ok_or_else(|| self.missing(resource.address()))?;
            entry.check()?;
            if entry.runtime.is_none() {
                return Ok(entry.rows.len() as u64);
            }
        }
        let (_, rows) = self.run(resource.address())?;
        Ok(rows.len() as u64)
    }

    fn size(&self, resource: &DataResource) -> Result<Option<u64>, ConnectorError> {
        let entries = self.entries.lock();
        let entry = entries.get(resource.address()).ok_or_else(|| self.missing(resource.address()))?;
        entry.check()?;
        if entry.runtime.is_some() {
            return Ok(None);
        }
        let bytes = serde_json::to_vec(&entry.rows).map_err(|e| ConnectorError::io(e.to_string()))?;
        Ok(Some(bytes.len() as u64))
    }

    fn dependencies(&self, resource: &DataResource) -> Result<Vec<String>, ConnectorError> {
        let entries = self.entries.lock();
        let entry = entries.get(resource.address()).ok_or_else(|| self.missing(resource.address()))?;
        entry.check()?;
        Ok(entry.references.clone())
    }

    fn select(&self, resource: &DataResource, fetch_size: usize) -> Result<Box<dyn SelectStream>, ConnectorError> {
        let entries = self.entries.lock();
        let entry = entries.get(resource.address()).ok_or_else(|| self.missing(resource.address()))?;
        entry.check()?;
        if entry.runtime.is_some() {
            return Err(ConnectorError::unsupported(format!("`{}` is a runtime and must be executed first", resource.uri())));
        }
        Ok(Box::new(MemorySelectStream { rows: entry.rows.clone().into_iter(),
                                         fetch_size: fetch_size.max(1) }))
    }

    fn insert(&self, resource: &DataResource, options: InsertOptions) -> Result<Box<dyn InsertStream>, ConnectorError> {
        {
            let entries = self.entries.lock();
            let entry = entries.get(resource.address()).ok_or_else(|| self.missing(resource.address()))?;
            entry.check()?;
        }
        let connector = self.me
                            .upgrade()
                            .ok_or_else(|| ConnectorError::defect(format!("memory connection `{}` is gone", self.name)))?;
        Ok(Box::new(MemoryInsertStream { connector,
                                         address: resource.address().to_string(),
                                         mode: options.mode,
                                         pending: Vec::with_capacity(options.batch_size.min(1024)),
                                         staged: Vec::new() }))
    }

    fn execute(&self, resource: &DataResource) -> Result<ResourceRef, ConnectorError> {
        let (schema, rows) = self.run(resource.address())?;
        let address = format!("{}.out", resource.address());
        let mut entry = Entry::new(TabularKind::Memory, schema);
        entry.rows = rows;
        entry.transient = true;
        self.store(&address, entry)
    }

    fn runtime_wrapper(&self, resource: &DataResource) -> Result<ResourceRef, ConnectorError> {
        let source = resource.address().to_string();
        if !self.contains(&source) {
            return Err(self.missing(&source));
        }
        let me = self.me.clone();
        let target = source.clone();
        let body: RuntimeFn = Arc::new(move || {
            let connector = me.upgrade().ok_or_else(|| ConnectorError::defect("memory connection is gone"))?;
            let entries = connector.entries.lock();
            let entry = entries.get(&target).ok_or_else(|| connector.missing(&target))?;
            entry.check()?;
            Ok((entry.schema.clone(), entry.rows.clone()))
        });
        // el wrapper no se lista: sólo existe para ejecutar `source`
        let mut entry = Entry::new(TabularKind::Query, Schema::new());
        entry.runtime = Some(body);
        entry.executable = Some(format!("select * from {source}"));
        entry.transient = true;
        self.store(&format!("{source}.query"), entry)
    }

    fn executable_text(&self, resource: &DataResource) -> Option<String> {
        self.entries.lock().get(resource.address()).and_then(|e| e.executable.clone())
    }

    fn max_writer_connections(&self) -> usize { self.max_writers }
}

struct MemorySelectStream {
    rows: std::vec::IntoIter<Row>,
    fetch_size: usize,
}

impl SelectStream for MemorySelectStream {
    fn next_chunk(&mut self) -> Result<Option<Vec<Row>>, ConnectorError> {
        let chunk: Vec<Row> = self.rows.by_ref().take(self.fetch_size).collect();
        if chunk.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk))
    }
}

/// Las filas se hacen visibles al confirmar.
struct MemoryInsertStream {
    connector: Arc<MemoryConnector>,
    address: String,
    mode: WriteMode,
    pending: Vec<Row>,
    staged: Vec<Row>,
}

impl InsertStream for MemoryInsertStream {
    fn insert(&mut self, row: Row) -> Result<(), ConnectorError> {
        self.pending.push(row);
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<(), ConnectorError> {
        self.staged.append(&mut self.pending);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ConnectorError> {
        let rows = std::mem::take(&mut self.staged);
        self.connector.apply(&self.address, self.mode, rows)
    }

    fn close(&mut self) -> Result<(), ConnectorError> {
        self.flush_batch()?;
        if !self.staged.is_empty() {
            self.commit()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::UpsertType;
    use crate::resource::{Column, DataType};
    use serde_json::json;

    fn people() -> Schema {
        Schema::from_columns(vec![Column::new("id", DataType::Integer).primary_key(),
                                  Column::new("name", DataType::Varchar)])
    }

    #[test]
    fn rows_are_visible_after_commit() {
        let mem = MemoryConnector::new("mem");
        let table = mem.create_table("people", people(), vec![]).expect("create");
        let mut stream = table.insert(InsertOptions::default()).expect("insert stream");
        stream.insert(vec![json!(1), json!("ada")]).expect("insert");
        stream.flush_batch().expect("flush");
        assert!(mem.rows("people").is_empty());
        stream.commit().expect("commit");
        assert_eq!(mem.rows("people").len(), 1);
        assert_eq!(mem.commits("people"), 1);
    }

    #[test]
    fn upsert_replaces_rows_by_primary_key() {
        let mem = MemoryConnector::new("mem");
        let table = mem.create_table("people", people(), vec![vec![json!(1), json!("ada")]]).expect("create");
        let mut stream = table.insert(InsertOptions { mode: WriteMode::Upsert(UpsertType::Merge),
                                                      batch_size: 10 })
                              .expect("insert stream");
        stream.insert(vec![json!(1), json!("grace")]).expect("insert");
        stream.insert(vec![json!(2), json!("alan")]).expect("insert");
        stream.close().expect("close");
        assert_eq!(mem.rows("people"), vec![vec![json!(1), json!("grace")], vec![json!(2), json!("alan")]]);
    }

    #[test]
    fn drop_refuses_parent_with_dependents() {
        let mem = MemoryConnector::new("mem");
        let parent = mem.create_table("parent", people(), vec![]).expect("parent");
        let child = mem.create_table("child", people(), vec![]).expect("child");
        mem.add_reference("child", "parent").expect("fk");
        let err = mem.drop_resources(&[parent.clone(), child.clone()]).expect_err("fk violation");
        assert_eq!(err.kind, ConnectorErrorKind::Constraint);
        mem.drop_resources(&[child, parent]).expect("children first");
        assert!(!mem.contains("parent"));
    }

    #[test]
    fn runtime_execution_yields_result_handle() {
        let mem = MemoryConnector::new("mem");
        let body: RuntimeFn = Arc::new(|| Ok((Schema::new().with_column("n", DataType::Integer), vec![vec![json!(1)], vec![json!(2)]])));
        let q = mem.register_runtime("q1", TabularKind::Query, Some("select 1"), body).expect("runtime");
        assert!(q.is_runtime());
        assert_eq!(q.count().expect("count"), 2);
        let result = q.execute().expect("execute");
        assert_eq!(result.logical_name(), "q1");
        assert_eq!(result.count().expect("count"), 2);
        assert!(mem.list("*").expect("list").iter().all(|r| r.address() != "q1.out"));
    }

    #[test]
    fn runtime_wrappers_are_not_listed() {
        let mem = MemoryConnector::new("mem");
        let table = mem.create_table("orders", people(), vec![vec![json!(1), json!("ada")]]).expect("orders");
        let wrapper = mem.runtime_wrapper(&table).expect("wrapper");
        assert!(wrapper.is_runtime());
        assert_eq!(wrapper.count().expect("count"), 1);
        let listed: Vec<String> = mem.list("*").expect("list").iter().map(|r| r.address().to_string()).collect();
        assert_eq!(listed, vec!["orders"]);
    }

    #[test]
    fn list_matches_glob_in_insertion_order() {
        let mem = MemoryConnector::new("mem");
        mem.create_table("sales_2024", people(), vec![]).expect("t");
        mem.create_table("customers", people(), vec![]).expect("t");
        mem.create_table("sales_2023", people(), vec![]).expect("t");
        let names: Vec<String> = mem.list("sales_*").expect("list").iter().map(|r| r.address().to_string()).collect();
        assert_eq!(names, vec!["sales_2024", "sales_2023"]);
    }
}
