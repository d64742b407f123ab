//! Motor de transferencia.
//!
//! Orden fijo por llamada:
//! 1. rechazo de orígenes duplicados;
//! 2. planificación (correspondencia de columnas, compatibilidad, destino
//!    vacío) sin efectos laterales: todo error de configuración se reporta
//!    antes de mover una sola fila;
//! 3. operación de destino, una vez por destino, y creación del destino a
//!    semejanza del origen;
//! 4. copia de filas (un escritor, o un lector y `target_worker_count`
//!    escritores unidos por un canal acotado);
//! 5. operación de origen, sólo si la copia del par terminó bien.
//!
//! Los fallos de un par quedan en su `TransferListener`; no interrumpen a los
//! demás pares.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crossbeam::channel;
use log::{debug, info, warn};

use super::{ResolvedMapping, SourceOperation, TargetOperation, TransferListener, TransferOperation, TransferPair,
            TransferProperties, TransferReport, WriteStats};
use crate::connector::{InsertOptions, InsertStream, WriteMode};
use crate::errors::{ConnectorError, FlowError, Result};
use crate::resource::{ResourceRef, Row, Schema};

struct PlannedPair<'a> {
    pair: &'a TransferPair,
    operation: TransferOperation,
    mapping: ResolvedMapping,
    /// Esquema con el que se crea el destino si hace falta.
    target_schema: Schema,
    mode: WriteMode,
}

#[derive(Debug, Clone)]
pub struct TransferManager {
    properties: TransferProperties,
}

impl TransferManager {
    pub fn new(properties: TransferProperties) -> Self { Self { properties } }

    pub fn properties(&self) -> &TransferProperties { &self.properties }

    /// Transfiere cada par. `concat` indica que todos los orígenes van a un
    /// único destino (decide la operación por defecto).
    pub fn transfer(&self, pairs: &[TransferPair], concat: bool) -> Result<TransferReport> {
        let mut sources = HashSet::new();
        for pair in pairs {
            if !sources.insert(pair.source_uri()) {
                return Err(FlowError::DuplicateSource(pair.source_uri()));
            }
        }
        let operation = self.properties.resolved_operation(concat);
        let plans = self.plan(pairs, operation)?;

        let mut prepared: HashMap<String, std::result::Result<(), ConnectorError>> = HashMap::new();
        let mut listeners = Vec::with_capacity(plans.len());
        for plan in plans {
            let mut listener = TransferListener::new(plan.pair, plan.operation, plan.mapping.clone());
            let started = Instant::now();
            let ready = prepared.entry(plan.pair.target_uri())
                                .or_insert_with(|| self.prepare_target(&plan.pair.target, &plan.target_schema))
                                .clone();
            let outcome = ready.and_then(|_| self.copy(&plan))
                               .and_then(|stats| self.after_copy(&plan.pair.source).map(|_| stats));
            listener.latency = started.elapsed();
            match outcome {
                Ok(stats) => {
                    listener.stats = stats;
                    info!("transfer {} -> {}: {} rows, {} batches, {} commits",
                          listener.source_uri, listener.target_uri, stats.rows, stats.batches, stats.commits);
                }
                Err(e) => {
                    warn!("transfer {} -> {} failed: {e}", listener.source_uri, listener.target_uri);
                    listener.fail(e.to_string());
                }
            }
            listeners.push(listener);
        }
        Ok(TransferReport { listeners })
    }

    fn plan<'a>(&self, pairs: &'a [TransferPair], operation: TransferOperation) -> Result<Vec<PlannedPair<'a>>> {
        let target_operation = self.properties.target_operation();
        let mut targets: HashMap<String, Schema> = HashMap::new();
        let mut plans = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let source_schema = pair.source.schema();
            let target_uri = pair.target_uri();
            let target_schema = match targets.get(&target_uri) {
                Some(schema) => schema.clone(),
                None => {
                    let exists = pair.target.exists()?;
                    let recreated = !exists || target_operation == TargetOperation::Drop;
                    if operation == TransferOperation::Copy
                       && exists
                       && target_operation == TargetOperation::None
                       && pair.target.count()? > 0
                    {
                        return Err(FlowError::Config(format!("copy requires an empty target but `{target_uri}` has rows; use the insert operation or a target operation")));
                    }
                    let schema = if recreated { source_schema.clone() } else { pair.target.schema() };
                    targets.insert(target_uri.clone(), schema.clone());
                    schema
                }
            };
            if operation == TransferOperation::Copy {
                source_schema.check_structure(&target_schema).map_err(|reason| {
                                                                 FlowError::InvalidMapping(format!("`{}` cannot be copied into `{target_uri}`: {reason}",
                                                                                                   pair.source_uri()))
                                                             })?;
            }
            let mapping = self.properties.mapping().resolve(&source_schema, &target_schema)?;
            let mode = match operation {
                TransferOperation::Upsert if target_schema.primary_key_indexes().is_empty() => {
                    info!("`{target_uri}` has no primary key, the upsert inserts the rows");
                    WriteMode::Append
                }
                TransferOperation::Upsert => WriteMode::Upsert(self.properties.upsert_type()),
                TransferOperation::Insert | TransferOperation::Copy => WriteMode::Append,
            };
            plans.push(PlannedPair { pair,
                                     operation,
                                     mapping,
                                     target_schema,
                                     mode });
        }
        Ok(plans)
    }

    fn prepare_target(&self, target: &ResourceRef, schema: &Schema) -> std::result::Result<(), ConnectorError> {
        let targets = std::slice::from_ref(target);
        match self.properties.target_operation() {
            TargetOperation::Drop => {
                if target.exists()? {
                    target.connector().drop_resources(targets)?;
                    debug!("target {target} dropped");
                }
            }
            TargetOperation::Truncate => {
                if target.exists()? {
                    target.connector().truncate(targets)?;
                    debug!("target {target} truncated");
                }
            }
            TargetOperation::None => {}
        }
        if !target.exists()? {
            target.set_schema(schema.clone());
            target.connector().create(target)?;
            debug!("target {target} created");
        }
        Ok(())
    }

    fn after_copy(&self, source: &ResourceRef) -> std::result::Result<(), ConnectorError> {
        let sources = std::slice::from_ref(source);
        match self.properties.source_operation() {
            SourceOperation::Drop => source.connector().drop_resources(sources),
            SourceOperation::Truncate => source.connector().truncate(sources),
            SourceOperation::None => Ok(()),
        }
    }

    fn copy(&self, plan: &PlannedPair<'_>) -> std::result::Result<WriteStats, ConnectorError> {
        let target = &plan.pair.target;
        let workers = self.properties
                          .target_worker_count()
                          .min(target.connector().max_writer_connections())
                          .max(1);
        let options = InsertOptions { mode: plan.mode,
                                      batch_size: self.properties.batch_size() };
        let commit_frequency = self.properties.commit_frequency();
        let mut reader = plan.pair.source.select(self.properties.fetch_size())?;

        if workers == 1 {
            let mut writer = BatchWriter::open(target, options, commit_frequency)?;
            while let Some(chunk) = reader.next_chunk()? {
                for row in chunk {
                    writer.write(plan.mapping.apply(&row))?;
                }
            }
            return writer.finish();
        }

        debug!("transfer {} -> {} with {workers} writers", plan.pair.source_uri(), plan.pair.target_uri());
        let (sender, receiver) = channel::bounded::<Row>(self.properties.buffer_size());
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers).map(|_| {
                                                  let receiver = receiver.clone();
                                                  scope.spawn(move || -> std::result::Result<WriteStats, ConnectorError> {
                                                           let mut writer = BatchWriter::open(target, options, commit_frequency)?;
                                                           for row in receiver.iter() {
                                                               writer.write(row)?;
                                                           }
                                                           writer.finish()
                                                       })
                                              })
                                              .collect();
            drop(receiver);

            let read = (|| -> std::result::Result<(), ConnectorError> {
                while let Some(chunk) = reader.next_chunk()? {
                    for row in chunk {
                        if sender.send(plan.mapping.apply(&row)).is_err() {
                            return Err(ConnectorError::io("every transfer writer stopped"));
                        }
                    }
                }
                Ok(())
            })();
            drop(sender);

            let mut total = WriteStats::default();
            let mut failure = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(stats)) => total += stats,
                    Ok(Err(e)) => failure = failure.or(Some(e)),
                    Err(_) => failure = failure.or(Some(ConnectorError::defect("a transfer writer panicked"))),
                }
            }
            match failure.or(read.err()) {
                Some(e) => Err(e),
                None => Ok(total),
            }
        })
    }
}

/// Escritor con lotes de `batch_size` filas y un commit cada
/// `commit_frequency` lotes.
struct BatchWriter {
    stream: Box<dyn InsertStream>,
    batch_size: usize,
    commit_frequency: usize,
    pending: usize,
    uncommitted: usize,
    stats: WriteStats,
}

impl BatchWriter {
    fn open(target: &ResourceRef, options: InsertOptions, commit_frequency: usize) -> std::result::Result<Self, ConnectorError> {
        Ok(Self { stream: target.insert(options)?,
                  batch_size: options.batch_size.max(1),
                  commit_frequency: commit_frequency.max(1),
                  pending: 0,
                  uncommitted: 0,
                  stats: WriteStats::default() })
    }

    fn write(&mut self, row: Row) -> std::result::Result<(), ConnectorError> {
        self.stream.insert(row)?;
        self.pending += 1;
        self.stats.rows += 1;
        if self.pending >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> std::result::Result<(), ConnectorError> {
        self.stream.flush_batch()?;
        self.pending = 0;
        self.uncommitted += 1;
        self.stats.batches += 1;
        if self.uncommitted >= self.commit_frequency {
            self.commit()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> std::result::Result<(), ConnectorError> {
        self.stream.commit()?;
        self.uncommitted = 0;
        self.stats.commits += 1;
        Ok(())
    }

    fn finish(mut self) -> std::result::Result<WriteStats, ConnectorError> {
        if self.pending > 0 {
            self.stream.flush_batch()?;
            self.pending = 0;
            self.uncommitted += 1;
            self.stats.batches += 1;
        }
        if self.uncommitted > 0 {
            self.commit()?;
        }
        self.stream.close()?;
        Ok(self.stats)
    }
}
