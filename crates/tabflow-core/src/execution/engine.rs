use std::collections::HashSet;

use chrono::Utc;
use log::{debug, error, warn};
use serde_json::Value;

use super::{ExecutionMode, ExecutionOptions, ExecutionResult};
use crate::connector::InsertOptions;
use crate::constants::DEFAULT_FETCH_SIZE;
use crate::errors::{ConnectorError, FlowError, Result};
use crate::hashing::hash_list;
use crate::pipeline::PipelineContext;
use crate::resource::{materialize, DataType, ResourceRef, Row, Schema};

/// Motor de ejecución. Guarda si ya hubo un fallo para aplicar `stopEarly`
/// también entre llamadas sucesivas (modo stream) hasta el próximo `reset`.
///
/// Un destino de resultados se recrea la primera vez que se escribe; las
/// llamadas siguientes sobre el mismo destino agregan filas.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    options: ExecutionOptions,
    error_seen: bool,
    written: HashSet<String>,
}

impl ExecutionEngine {
    pub fn new(options: ExecutionOptions) -> Self {
        Self { options,
               error_seen: false,
               written: HashSet::new() }
    }

    pub fn options(&self) -> &ExecutionOptions { &self.options }

    pub fn reset(&mut self) {
        self.error_seen = false;
        self.written.clear();
    }

    /// Ejecuta `inputs` en orden y devuelve el recurso de resultados, con una
    /// fila por entrada.
    pub fn execute(&mut self, inputs: &[ResourceRef], ctx: &PipelineContext) -> Result<ResourceRef> {
        let uris: Vec<String> = inputs.iter().map(|r| r.uri()).collect();
        let call_mode = self.options.mode().unwrap_or_else(|| {
                                               if inputs.iter().any(|r| ExecutionMode::infer(r) == ExecutionMode::Transfer) {
                                                   ExecutionMode::Transfer
                                               } else {
                                                   ExecutionMode::Load
                                               }
                                           });
        let columns = self.options.columns_for(call_mode);
        let width = self.options.error_message_width();
        let target_uri = match (self.options.target(), inputs.first()) {
            (Some(template), Some(first)) => template.render(first),
            (Some(template), None) if template.is_concat() => template.as_str().to_string(),
            _ => format!("execution_results_{}", &hash_list(&uris)[..16]),
        };
        let target = ctx.registry().resolve(&target_uri)?;

        let mut rows: Vec<Row> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let result = if self.options.stop_early() && self.error_seen {
                debug!("{} skipped: a previous execution failed", input.uri());
                ExecutionResult::stopped_early(input.clone(), self.options.mode().unwrap_or_else(|| ExecutionMode::infer(input)))
            } else {
                self.run(input, ctx)?
            };
            if let Some(failure) = &result.error {
                self.error_seen = true;
                if result.was_attempted() && (self.options.strict_execution() || (ctx.is_dev_env() && failure.is_defect())) {
                    error!("execution of {} failed: {failure}", result.runtime.uri());
                    return Err(FlowError::Execution { resource: result.runtime.uri(),
                                                      error: failure.clone() });
                }
            }
            rows.push(result.project(&columns, width));
        }

        let schema = Schema::from_columns(columns.iter().map(|c| c.column(width)).collect());
        if self.written.contains(&target.uri()) && target.exists()? && target.schema() == schema {
            let mut writer = target.insert(InsertOptions::default())?;
            for row in rows {
                writer.insert(row)?;
            }
            writer.close()?;
        } else {
            materialize(&target, schema, rows)?;
            self.written.insert(target.uri());
        }
        Ok(target)
    }

    fn run(&self, input: &ResourceRef, ctx: &PipelineContext) -> Result<ExecutionResult> {
        let mode = self.options.mode().unwrap_or_else(|| ExecutionMode::infer(input));
        let persist = self.options.persistence_for(mode)?;
        if !input.is_runtime() && self.options.strict_input() {
            return Err(FlowError::StrictInput(format!("`{}` is not a runtime resource", input.uri())));
        }

        let mut result = ExecutionResult::new(input.clone(), mode);
        result.started_at = Some(Utc::now());
        let outcome = self.runtime_of(input).and_then(|runtime| {
                                                result.runtime = runtime.clone();
                                                match mode {
                                                    ExecutionMode::Load => runtime.count().map(|n| (n, None)),
                                                    ExecutionMode::Transfer => self.drain(input, &runtime, persist, ctx),
                                                }
                                            });
        result.ended_at = Some(Utc::now());
        match outcome {
            Ok((count, persisted)) => {
                result.count = count;
                result.result = persisted;
                debug!("{} executed in {} mode: {count} rows", result.runtime.uri(), mode);
            }
            Err(e) => {
                warn!("execution of {} failed: {e}", result.runtime.uri());
                result.error_resource = self.write_error_detail(input, &result.runtime, &e, ctx);
                result.error = Some(e);
                if self.options.fail_on_error() {
                    ctx.mark_failed();
                }
            }
        }
        Ok(result)
    }

    fn runtime_of(&self, input: &ResourceRef) -> std::result::Result<ResourceRef, ConnectorError> {
        if input.is_runtime() {
            return Ok(input.clone());
        }
        input.connector().runtime_wrapper(input)
    }

    /// Recorre el resultado del runtime y, si corresponde, lo persiste en el
    /// recurso dado por la plantilla de resultados.
    fn drain(&self,
             input: &ResourceRef,
             runtime: &ResourceRef,
             persist: bool,
             ctx: &PipelineContext)
             -> std::result::Result<(u64, Option<ResourceRef>), ConnectorError> {
        let output = runtime.execute()?;
        let mut stream = output.select(DEFAULT_FETCH_SIZE)?;
        let mut sink = None;
        if persist {
            let target = self.options.result_template().resolve(input, ctx.registry())?;
            if target.exists()? {
                target.connector().drop_resources(std::slice::from_ref(&target))?;
            }
            target.set_schema(output.schema());
            target.connector().create(&target)?;
            let writer = target.insert(InsertOptions::default())?;
            sink = Some((target, writer));
        }
        let mut count = 0u64;
        while let Some(chunk) = stream.next_chunk()? {
            count += chunk.len() as u64;
            if let Some((_, writer)) = sink.as_mut() {
                for row in chunk {
                    writer.insert(row)?;
                }
            }
        }
        match sink {
            Some((target, mut writer)) => {
                writer.close()?;
                Ok((count, Some(target)))
            }
            None => Ok((count, None)),
        }
    }

    /// Escribe el recurso de detalle del error. Un fallo al escribirlo sólo se
    /// registra: el error original es el que importa.
    fn write_error_detail(&self,
                          input: &ResourceRef,
                          runtime: &ResourceRef,
                          failure: &ConnectorError,
                          ctx: &PipelineContext)
                          -> Option<ResourceRef> {
        let written = self.options.error_template().resolve(input, ctx.registry()).and_then(|target| {
                          let rows = error_detail_lines(runtime, failure).into_iter().map(|line| vec![Value::from(line)]).collect();
                          materialize(&target, Schema::new().with_column("line", DataType::Varchar), rows)?;
                          Ok(target)
                      });
        match written {
            Ok(target) => Some(target),
            Err(e) => {
                warn!("could not write the error detail of {}: {e}", runtime.uri());
                None
            }
        }
    }
}

/// Líneas del recurso de detalle de un error.
pub fn error_detail_lines(runtime: &ResourceRef, failure: &ConnectorError) -> Vec<String> {
    let mut lines = vec!["Error Message:".to_string(), failure.message.clone(), "Error Stack:".to_string()];
    lines.extend(failure.frames.iter().cloned());
    lines.push(format!("Runtime Executable: {}", runtime.uri()));
    lines.push(format!("Runtime Connection: {}", runtime.connection_name()));
    if let Some(text) = runtime.connector().executable_text(runtime) {
        lines.push("Original Executable Content:".to_string());
        lines.extend(text.lines().map(String::from));
    }
    lines
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::connector::{Connector, ConnectorRegistry, MemoryConnector, RuntimeFn};
    use crate::execution::{ResultColumn, STOPPED_EARLY};
    use crate::resource::TabularKind;

    fn ok_body(n: i64) -> RuntimeFn {
        Arc::new(move || Ok((Schema::new().with_column("n", DataType::Integer), (0..n).map(|i| vec![json!(i)]).collect())))
    }

    fn failing_body() -> RuntimeFn { Arc::new(|| Err(ConnectorError::defect("null reference at line 3"))) }

    fn setup() -> (Arc<MemoryConnector>, PipelineContext) {
        let mem = MemoryConnector::new("mem");
        let registry = Arc::new(ConnectorRegistry::new().with(mem.clone()));
        (mem, PipelineContext::new("exec", registry))
    }

    #[test]
    fn failures_are_recorded_as_rows() {
        let (mem, ctx) = setup();
        let a = mem.register_runtime("a", TabularKind::Query, Some("select 1"), ok_body(3)).expect("a");
        let b = mem.register_runtime("b", TabularKind::Query, Some("select *\nfrom nowhere"), failing_body()).expect("b");
        let mut engine = ExecutionEngine::new(ExecutionOptions::builder().build().expect("options"));
        let results = engine.execute(&[a, b], &ctx).expect("execute");

        let rows = mem.rows(results.address());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], json!("a@mem"));
        assert_eq!(rows[0][1], json!(0));
        assert_eq!(rows[0][2], json!(3));
        assert_eq!(rows[1][1], json!(1));
        assert_eq!(rows[1][4], json!("null reference at line 3. See b_error@mem"));
        assert_eq!(ctx.exit_status(), 1);

        let detail: Vec<Value> = mem.rows("b_error").into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(detail[0], json!("Error Message:"));
        assert!(detail.contains(&json!("Runtime Executable: b@mem")));
        assert_eq!(detail.last(), Some(&json!("from nowhere")));
    }

    #[test]
    fn stop_early_skips_the_remaining_items() {
        let (mem, ctx) = setup();
        let a = mem.register_runtime("a", TabularKind::Query, None, failing_body()).expect("a");
        let b = mem.register_runtime("b", TabularKind::Query, None, ok_body(2)).expect("b");
        let options = ExecutionOptions::builder().result_columns(vec![ResultColumn::RuntimeDataUri,
                                                                      ResultColumn::Count,
                                                                      ResultColumn::ErrorMessage,
                                                                      ResultColumn::Latency])
                                                 .build()
                                                 .expect("options");
        let mut engine = ExecutionEngine::new(options);
        let results = engine.execute(&[a, b], &ctx).expect("execute");
        let rows = mem.rows(results.address());
        assert_eq!(rows[1], vec![json!("b@mem"), json!(0), json!(STOPPED_EARLY), Value::Null]);

        engine.reset();
        let b = mem.resolve("b").expect("b");
        let again = engine.execute(&[b], &ctx).expect("after reset");
        assert_eq!(mem.rows(again.address())[0][1], json!(2));
    }

    #[test]
    fn strict_execution_raises() {
        let (mem, ctx) = setup();
        let a = mem.register_runtime("a", TabularKind::Query, None, failing_body()).expect("a");
        let mut engine = ExecutionEngine::new(ExecutionOptions::builder().strict_execution(true).build().expect("options"));
        let err = engine.execute(&[a], &ctx).expect_err("strict");
        assert!(matches!(err, FlowError::Execution { ref resource, .. } if resource == "a@mem"));
    }

    #[test]
    fn defects_raise_in_development() {
        let mem = MemoryConnector::new("mem");
        let registry = Arc::new(ConnectorRegistry::new().with(mem.clone()));
        let ctx = PipelineContext::new("exec", registry).with_dev_env(true);
        let a = mem.register_runtime("a", TabularKind::Query, None, failing_body()).expect("a");
        let mut engine = ExecutionEngine::new(ExecutionOptions::builder().build().expect("options"));
        assert!(matches!(engine.execute(&[a], &ctx), Err(FlowError::Execution { .. })));
    }

    #[test]
    fn non_runtime_inputs_are_wrapped_unless_strict() {
        let (mem, ctx) = setup();
        let table = mem.create_table("orders", Schema::new().with_column("id", DataType::Integer), vec![vec![json!(1)]])
                       .expect("table");
        let mut engine = ExecutionEngine::new(ExecutionOptions::builder().build().expect("options"));
        let results = engine.execute(&[table.clone()], &ctx).expect("wrapped");
        let rows = mem.rows(results.address());
        assert_eq!(rows[0][0], json!("orders.query@mem"));
        assert_eq!(rows[0][2], json!(1));
        let listed: Vec<String> = mem.list("orders*").expect("list").iter().map(|r| r.uri()).collect();
        assert_eq!(listed, vec!["orders@mem"]);

        let mut strict = ExecutionEngine::new(ExecutionOptions::builder().strict_input(true).build().expect("options"));
        assert!(matches!(strict.execute(&[table], &ctx), Err(FlowError::StrictInput(_))));
    }

    #[test]
    fn successive_calls_append_to_a_fixed_target() {
        let (mem, ctx) = setup();
        let a = mem.register_runtime("a", TabularKind::Query, None, ok_body(1)).expect("a");
        let b = mem.register_runtime("b", TabularKind::Query, None, ok_body(2)).expect("b");
        let options = ExecutionOptions::builder().target("all_results").build().expect("options");
        let mut engine = ExecutionEngine::new(options);
        engine.execute(&[a.clone()], &ctx).expect("first");
        let results = engine.execute(&[b], &ctx).expect("second");
        let rows = mem.rows(results.address());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], json!("a@mem"));
        assert_eq!(rows[1][0], json!("b@mem"));

        // tras reset la primera escritura vuelve a recrear el destino
        engine.reset();
        engine.execute(&[a], &ctx).expect("after reset");
        assert_eq!(mem.rows("all_results").len(), 1);
    }

    #[test]
    fn commands_are_drained_and_persisted() {
        let (mem, ctx) = setup();
        let cmd = mem.register_runtime("cleanup", TabularKind::Command, Some("rm -rf tmp"), ok_body(4)).expect("cmd");
        let mut engine = ExecutionEngine::new(ExecutionOptions::builder().build().expect("options"));
        let results = engine.execute(&[cmd], &ctx).expect("execute");
        let rows = mem.rows(results.address());
        // runtime_data_uri, data_uri, exit_code, count, latency, error_message
        assert_eq!(rows[0][1], json!("cleanup_result@mem"));
        assert_eq!(rows[0][3], json!(4));
        assert_eq!(mem.rows("cleanup_result").len(), 4);
    }
}
