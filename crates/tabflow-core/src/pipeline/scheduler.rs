//! Scheduler síncrono.
//!
//! Cada recurso producido por el supplier raíz se empuja de step en step:
//! los maps y splits se aplican de inmediato, los reducers acumulan. Al
//! agotarse el supplier (batch) o al cumplirse la ventana (stream) se vacían
//! los reducers en orden, alimentando con su salida a los steps siguientes.

use std::collections::HashSet;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use log::{debug, error, info, warn};
use uuid::Uuid;

use super::builder::OnError;
use super::{Pipeline, PipelineResult, StepCounter};
use crate::errors::{FlowError, Result};
use crate::resource::ResourceRef;
use crate::step::{PipelineStep, ProcessingMode};

struct RunState {
    counters: Vec<StepCounter>,
    downstream: Vec<ResourceRef>,
    cycles: u64,
}

impl Pipeline {
    /// Ejecuta el pipeline hasta agotar el supplier raíz (batch), o hasta el
    /// máximo de ciclos, el timeout o el agotamiento del origen (stream).
    pub fn run(&mut self) -> Result<PipelineResult> {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.ctx.reset_exit_status();
        let mut run = RunState { counters: self.steps
                                               .iter()
                                               .map(|s| StepCounter { name: s.name().to_string(),
                                                                      ..StepCounter::default() })
                                               .collect(),
                                 downstream: Vec::new(),
                                 cycles: 0 };
        info!("pipeline `{}` started ({} mode, root `{}`, {} steps)",
              self.name(),
              self.mode(),
              self.root.name(),
              self.steps.len());

        self.root.on_start(&self.ctx)?;
        let mut last_flush = Instant::now();
        loop {
            if let Some(max) = self.options.max_cycles {
                if run.cycles >= max {
                    debug!("pipeline `{}` reached its maximum of {max} cycles", self.name());
                    break;
                }
            }
            if let Some(timeout) = self.options.timeout {
                if clock.elapsed() >= timeout {
                    warn!("pipeline `{}` stopped after its timeout of {:?}", self.name(), timeout);
                    break;
                }
            }
            match self.root.next(&self.ctx)? {
                Some(resource) => {
                    run.cycles += 1;
                    self.push(0, resource, &mut run)?;
                    if self.mode() == ProcessingMode::Stream {
                        if let Some(window) = self.options.window_interval {
                            if last_flush.elapsed() >= window {
                                self.flush_from(0, &mut run)?;
                                last_flush = Instant::now();
                            }
                        }
                    }
                }
                None => {
                    if self.mode() == ProcessingMode::Batch {
                        break;
                    }
                    if !self.options.poll_interval.is_zero() {
                        thread::sleep(self.options.poll_interval);
                    }
                    if !self.root.poll(&self.ctx)? {
                        break;
                    }
                }
            }
        }
        self.flush_from(0, &mut run)?;

        let result = PipelineResult { run_id: Uuid::new_v4(),
                                      pipeline: self.name().to_string(),
                                      exit_status: self.ctx.exit_status(),
                                      downstream: run.downstream,
                                      steps: run.counters,
                                      cycles: run.cycles,
                                      started_at,
                                      elapsed: clock.elapsed() };
        info!("pipeline `{}` finished with exit status {} ({} elements, {:?})",
              result.pipeline, result.exit_status, result.cycles, result.elapsed);
        Ok(result)
    }

    /// Reinicia supplier y steps para una nueva ejecución.
    pub fn reset(&mut self) -> Result<()> {
        self.root.reset()?;
        for step in self.steps.iter_mut() {
            step.reset()?;
        }
        self.ctx.reset_exit_status();
        Ok(())
    }

    fn push(&mut self, index: usize, resource: ResourceRef, run: &mut RunState) -> Result<()> {
        if index == self.steps.len() {
            run.downstream.push(resource);
            return Ok(());
        }
        run.counters[index].input += 1;
        let outcome = {
            let ctx = &self.ctx;
            match &mut self.steps[index] {
                PipelineStep::Map(step) => step.apply(resource, ctx).map(|out| out.into_iter().collect()),
                PipelineStep::Split(step) => step.split(resource, ctx),
                PipelineStep::Reducer(step) => step.accept(resource, ctx).map(|_| Vec::new()),
            }
        };
        let produced = self.recover(index, outcome)?;
        run.counters[index].output += produced.len() as u64;
        for next in produced {
            self.push(index + 1, next, run)?;
        }
        Ok(())
    }

    /// Vacía los reducers desde `start`, en orden, y reinicia su estado.
    fn flush_from(&mut self, start: usize, run: &mut RunState) -> Result<()> {
        for index in start..self.steps.len() {
            let outcome = {
                let ctx = &self.ctx;
                match &mut self.steps[index] {
                    PipelineStep::Reducer(step) => {
                        let flushed = step.flush(ctx);
                        let reset = step.reset();
                        flushed.and_then(|out| reset.map(|_| out))
                    }
                    _ => continue,
                }
            };
            let produced = self.recover(index, outcome)?;
            let mut seen = HashSet::new();
            for resource in &produced {
                if !seen.insert(resource.uri()) {
                    return Err(FlowError::DuplicateSource(resource.uri()));
                }
            }
            debug!("step `{}` flushed {} resources", self.steps[index].name(), produced.len());
            run.counters[index].output += produced.len() as u64;
            for next in produced {
                self.push(index + 1, next, run)?;
            }
        }
        Ok(())
    }

    fn recover(&self, index: usize, outcome: Result<Vec<ResourceRef>>) -> Result<Vec<ResourceRef>> {
        match outcome {
            Ok(produced) => Ok(produced),
            Err(e) if e.is_item_failure() && self.options.on_error == OnError::Discard => {
                warn!("step `{}` of pipeline `{}` discarded an element: {e}", self.steps[index].name(), self.name());
                self.ctx.add_exit_status(1);
                Ok(Vec::new())
            }
            Err(e) => {
                error!("step `{}` of pipeline `{}` failed: {e}", self.steps[index].name(), self.name());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::connector::{Connector, ConnectorRegistry, MemoryConnector};
    use crate::errors::ConnectorError;
    use crate::pipeline::{PipelineBuilder, PipelineContext};
    use crate::resource::Schema;
    use crate::step::{MapStep, ReducerStep, RootSupplier};

    struct ListSupplier {
        names: Vec<String>,
        queue: VecDeque<String>,
        mode: ProcessingMode,
    }

    impl ListSupplier {
        fn batch(names: &[&str]) -> Self {
            Self { names: names.iter().map(|s| s.to_string()).collect(),
                   queue: VecDeque::new(),
                   mode: ProcessingMode::Batch }
        }
    }

    impl RootSupplier for ListSupplier {
        fn name(&self) -> &str { "list" }

        fn mode(&self) -> ProcessingMode { self.mode }

        fn on_start(&mut self, _ctx: &PipelineContext) -> Result<()> {
            self.queue = self.names.iter().cloned().collect();
            Ok(())
        }

        fn next(&mut self, ctx: &PipelineContext) -> Result<Option<ResourceRef>> {
            match self.queue.pop_front() {
                Some(name) => Ok(Some(ctx.registry().resolve(&name)?)),
                None => Ok(None),
            }
        }
    }

    /// Stream infinito: r0, r1, r2...
    struct Counter {
        next: u64,
    }

    impl RootSupplier for Counter {
        fn name(&self) -> &str { "counter" }

        fn mode(&self) -> ProcessingMode { ProcessingMode::Stream }

        fn on_start(&mut self, _ctx: &PipelineContext) -> Result<()> {
            self.next = 0;
            Ok(())
        }

        fn next(&mut self, ctx: &PipelineContext) -> Result<Option<ResourceRef>> {
            let name = format!("r{}", self.next);
            self.next += 1;
            Ok(Some(ctx.registry().resolve(&name)?))
        }

        fn poll(&mut self, _ctx: &PipelineContext) -> Result<bool> { Ok(true) }
    }

    /// Descarta los recursos cuyo nombre contiene `skip` y falla con `bad`.
    struct Filter;

    impl MapStep for Filter {
        fn name(&self) -> &str { "filter" }

        fn apply(&mut self, input: ResourceRef, _ctx: &PipelineContext) -> Result<Option<ResourceRef>> {
            if input.address().contains("bad") {
                return Err(ConnectorError::io(format!("cannot read {}", input.uri())).into());
            }
            if input.address().contains("skip") {
                return Ok(None);
            }
            Ok(Some(input))
        }
    }

    /// Emite un recurso `count_<n>` con el número de elementos aceptados.
    struct Count {
        seen: u64,
        mode: Option<ProcessingMode>,
        duplicate: bool,
    }

    impl Count {
        fn new() -> Self {
            Self { seen: 0,
                   mode: None,
                   duplicate: false }
        }
    }

    impl ReducerStep for Count {
        fn name(&self) -> &str { "count" }

        fn mode(&self) -> Option<ProcessingMode> { self.mode }

        fn accept(&mut self, _input: ResourceRef, _ctx: &PipelineContext) -> Result<()> {
            self.seen += 1;
            Ok(())
        }

        fn flush(&mut self, ctx: &PipelineContext) -> Result<Vec<ResourceRef>> {
            let out = ctx.registry().resolve(&format!("count_{}", self.seen))?;
            if self.duplicate {
                return Ok(vec![out.clone(), out]);
            }
            Ok(vec![out])
        }

        fn reset(&mut self) -> Result<()> {
            self.seen = 0;
            Ok(())
        }
    }

    fn registry() -> Arc<ConnectorRegistry> {
        let mem = MemoryConnector::new("mem");
        for name in ["a", "b", "skip_c", "bad_d"] {
            mem.create_table(name, Schema::new(), vec![]).expect("table");
        }
        let connector: Arc<dyn Connector> = mem;
        Arc::new(ConnectorRegistry::new().with(connector))
    }

    #[test]
    fn batch_pipeline_maps_then_flushes_reducers() {
        let mut pipeline = PipelineBuilder::new("p", registry()).root(ListSupplier::batch(&["a", "skip_c", "b"]))
                                                                .map(Filter)
                                                                .reducer(Count::new())
                                                                .build()
                                                                .expect("build");
        let result = pipeline.run().expect("run");
        assert_eq!(result.downstream_uris(), vec!["count_2@mem".to_string()]);
        assert_eq!(result.cycles, 3);
        assert_eq!(result.steps[0], StepCounter { name: "filter".into(), input: 3, output: 2 });
        assert_eq!(result.steps[1], StepCounter { name: "count".into(), input: 2, output: 1 });
        assert!(result.is_success());
    }

    #[test]
    fn rerun_after_reset_gives_same_output() {
        let mut pipeline = PipelineBuilder::new("p", registry()).root(ListSupplier::batch(&["a", "b"]))
                                                                .reducer(Count::new())
                                                                .build()
                                                                .expect("build");
        let first = pipeline.run().expect("first run");
        pipeline.reset().expect("reset");
        let second = pipeline.run().expect("second run");
        assert_eq!(first.downstream_uris(), second.downstream_uris());
    }

    #[test]
    fn stream_pipeline_rejects_batch_steps() {
        let mut count = Count::new();
        count.mode = Some(ProcessingMode::Batch);
        let err = PipelineBuilder::new("p", registry()).root(Counter { next: 0 })
                                                       .reducer(count)
                                                       .build()
                                                       .expect_err("batch step in stream pipeline");
        assert!(matches!(err, FlowError::IncompatibleMode(_)));

        let err = PipelineBuilder::new("p", registry()).root(Counter { next: 0 })
                                                       .mode(ProcessingMode::Batch)
                                                       .build()
                                                       .expect_err("batch hint on a stream root");
        assert!(matches!(err, FlowError::IncompatibleMode(_)));
    }

    #[test]
    fn batch_pipeline_accepts_stream_steps() {
        let mut count = Count::new();
        count.mode = Some(ProcessingMode::Stream);
        let pipeline = PipelineBuilder::new("p", registry()).root(ListSupplier::batch(&["a"])).reducer(count).build();
        assert!(pipeline.is_ok());
    }

    #[test]
    fn stream_pipeline_stops_at_max_cycles() {
        let mut pipeline = PipelineBuilder::new("p", registry()).root(Counter { next: 0 })
                                                                .reducer(Count::new())
                                                                .max_cycles(5)
                                                                .poll_interval(Duration::ZERO)
                                                                .build()
                                                                .expect("build");
        assert_eq!(pipeline.mode(), ProcessingMode::Stream);
        let result = pipeline.run().expect("run");
        assert_eq!(result.cycles, 5);
        assert_eq!(result.downstream_uris(), vec!["count_5@mem".to_string()]);
    }

    #[test]
    fn stream_window_flushes_every_element_with_zero_window() {
        let mut pipeline = PipelineBuilder::new("p", registry()).root(Counter { next: 0 })
                                                                .reducer(Count::new())
                                                                .max_cycles(3)
                                                                .window_interval(Duration::ZERO)
                                                                .build()
                                                                .expect("build");
        let result = pipeline.run().expect("run");
        // una ventana por elemento y un vaciado final sin elementos
        assert_eq!(result.downstream_uris(),
                   vec!["count_1@mem".to_string(), "count_1@mem".to_string(), "count_1@mem".to_string(), "count_0@mem".to_string()]);
    }

    #[test]
    fn item_failures_stop_or_discard() {
        let mut stop = PipelineBuilder::new("p", registry()).root(ListSupplier::batch(&["a", "bad_d", "b"]))
                                                            .map(Filter)
                                                            .build()
                                                            .expect("build");
        assert!(matches!(stop.run(), Err(FlowError::Connector(_))));

        let mut discard = PipelineBuilder::new("p", registry()).root(ListSupplier::batch(&["a", "bad_d", "b"]))
                                                               .map(Filter)
                                                               .on_error(OnError::Discard)
                                                               .build()
                                                               .expect("build");
        let result = discard.run().expect("run");
        assert_eq!(result.downstream_uris(), vec!["a@mem".to_string(), "b@mem".to_string()]);
        assert_eq!(result.exit_status, 1);
    }

    #[test]
    fn duplicate_flush_output_is_rejected() {
        let mut count = Count::new();
        count.duplicate = true;
        let mut pipeline = PipelineBuilder::new("p", registry()).root(ListSupplier::batch(&["a"]))
                                                                .reducer(count)
                                                                .build()
                                                                .expect("build");
        assert_eq!(pipeline.run().err(), Some(FlowError::DuplicateSource("count_1@mem".into())));
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let err = PipelineBuilder::new("p", registry()).map(Filter).build().expect_err("no root");
        assert!(err.is_config());
    }
}
