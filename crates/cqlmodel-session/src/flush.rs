//! Flush contexts: when statements reach the cluster.
//!
//! A flush context runs in one of two modes:
//!
//! - **Immediate**: every pushed statement executes on the spot and the
//!   accumulators stay empty between calls.
//! - **Batching**: pushed statements accumulate until [`FlushContext::end_batch`],
//!   which replays the deferred lifecycle events in recorded order, then sends
//!   the regular statements as one logged batch and the counter statements as a
//!   separate counter batch.
//!
//! A batching context is never cleared in place: starting, ending or
//! abandoning a window swaps in [`FlushContext::duplicate_with_no_data`], so a
//! snapshot kept elsewhere is left untouched.

use crate::proxy::SharedEntity;
use cqlmodel_core::{
    BatchType, ConsistencyLevel, CqlSession, Cx, Entity, EntityMeta, Error, Event, Outcome,
    Result, Row,
};
use cqlmodel_query::StatementWrapper;
use cqlmodel_query::wrapper::{log_batch_end, log_batch_start};
use std::fmt;
use std::sync::Arc;

/// Flush mode of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    Immediate,
    Batching,
}

/// Entity a deferred event fires on, with its type erased.
trait EventTarget: Send {
    fn fire(&self, meta: &EntityMeta, event: Event) -> Result<()>;
}

impl<T: Entity> EventTarget for SharedEntity<T> {
    fn fire(&self, meta: &EntityMeta, event: Event) -> Result<()> {
        meta.intercept(&mut *self.lock(), event)
    }
}

/// A lifecycle event deferred until the end of a batch.
///
/// The holder shares the entity with the proxy built from it, so the
/// interceptor mutates the instance the caller holds.
pub struct EventHolder {
    meta: Arc<EntityMeta>,
    target: Box<dyn EventTarget>,
    event: Event,
}

impl fmt::Debug for EventHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHolder")
            .field("entity", &self.meta.class_name())
            .field("event", &self.event)
            .finish()
    }
}

impl EventHolder {
    pub fn event(&self) -> Event {
        self.event
    }

    pub fn entity_class(&self) -> &str {
        self.meta.class_name()
    }

    fn fire(self) -> Result<()> {
        self.target.fire(&self.meta, self.event)
    }
}

/// Accumulator of statements and deferred events.
pub struct FlushContext<S: CqlSession> {
    session: Arc<S>,
    mode: FlushMode,
    consistency_level: ConsistencyLevel,
    statements: Vec<StatementWrapper>,
    counter_statements: Vec<StatementWrapper>,
    events: Vec<EventHolder>,
}

impl<S: CqlSession> fmt::Debug for FlushContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushContext")
            .field("mode", &self.mode)
            .field("consistency_level", &self.consistency_level)
            .field("statements", &self.statements.len())
            .field("counter_statements", &self.counter_statements.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl<S: CqlSession> FlushContext<S> {
    fn with_mode(session: Arc<S>, mode: FlushMode, level: ConsistencyLevel) -> Self {
        Self {
            session,
            mode,
            consistency_level: level,
            statements: Vec::new(),
            counter_statements: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn immediate(session: Arc<S>, level: ConsistencyLevel) -> Self {
        Self::with_mode(session, FlushMode::Immediate, level)
    }

    pub fn batching(session: Arc<S>, level: ConsistencyLevel) -> Self {
        Self::with_mode(session, FlushMode::Batching, level)
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub fn mode(&self) -> FlushMode {
        self.mode
    }

    pub fn is_batching(&self) -> bool {
        self.mode == FlushMode::Batching
    }

    /// Default level of this context.
    pub fn consistency_level(&self) -> ConsistencyLevel {
        self.consistency_level
    }

    /// The level every write of the current window is sent with, if a batch
    /// window is open.
    pub fn batch_level(&self) -> Option<ConsistencyLevel> {
        self.is_batching().then_some(self.consistency_level)
    }

    /// Accumulated statements, regular and counter.
    pub fn statement_count(&self) -> usize {
        self.statements.len() + self.counter_statements.len()
    }

    pub fn statements(&self) -> &[StatementWrapper] {
        &self.statements
    }

    pub fn counter_statements(&self) -> &[StatementWrapper] {
        &self.counter_statements
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    /// Send a regular write. Returns the rows when executed on the spot.
    #[tracing::instrument(level = "trace", skip(self, cx, wrapper), fields(mode = ?self.mode))]
    pub async fn push_statement(
        &mut self,
        cx: &Cx,
        wrapper: StatementWrapper,
    ) -> Outcome<Option<Vec<Row>>, Error> {
        match self.mode {
            FlushMode::Immediate => {
                let rows = try_outcome!(self.execute(cx, &wrapper).await);
                Outcome::Ok(Some(rows))
            }
            FlushMode::Batching => {
                self.statements.push(wrapper);
                Outcome::Ok(None)
            }
        }
    }

    /// Send a counter write.
    #[tracing::instrument(level = "trace", skip(self, cx, wrapper), fields(mode = ?self.mode))]
    pub async fn push_counter_statement(
        &mut self,
        cx: &Cx,
        wrapper: StatementWrapper,
    ) -> Outcome<Option<Vec<Row>>, Error> {
        match self.mode {
            FlushMode::Immediate => {
                let rows = try_outcome!(self.execute(cx, &wrapper).await);
                Outcome::Ok(Some(rows))
            }
            FlushMode::Batching => {
                self.counter_statements.push(wrapper);
                Outcome::Ok(None)
            }
        }
    }

    /// Run a read. Reads always execute on the spot, whatever the mode.
    pub async fn query(&self, cx: &Cx, wrapper: StatementWrapper) -> Outcome<Vec<Row>, Error> {
        self.execute(cx, &wrapper).await
    }

    async fn execute(&self, cx: &Cx, wrapper: &StatementWrapper) -> Outcome<Vec<Row>, Error> {
        wrapper.log_dml();
        self.session.execute(cx, &wrapper.to_statement()).await
    }

    /// Fire or defer a lifecycle event.
    ///
    /// `PostLoad` fires at once in both modes. Other events fire at once in
    /// immediate mode and are queued on a handle of the entity in batching
    /// mode.
    pub(crate) fn trigger_interceptor<T: Entity>(
        &mut self,
        meta: &Arc<EntityMeta>,
        entity: &SharedEntity<T>,
        event: Event,
    ) -> Result<()> {
        if !meta.has_interceptor(event) {
            return Ok(());
        }
        if event == Event::PostLoad || self.mode == FlushMode::Immediate {
            return entity.fire(meta, event);
        }
        tracing::trace!(entity = meta.class_name(), ?event, "Deferring lifecycle event");
        self.events.push(EventHolder {
            meta: Arc::clone(meta),
            target: Box::new(entity.handle()),
            event,
        });
        Ok(())
    }

    /// Close the window: replay deferred events, then send the logged batch
    /// and the counter batch.
    ///
    /// The accumulators are emptied before anything is sent, so a failure
    /// leaves no partial state behind.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(level = %self.consistency_level))]
    pub async fn end_batch(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.mode != FlushMode::Batching {
            return Outcome::Err(Error::InvalidState(
                "Cannot end a batch on an immediate flush context".to_string(),
            ));
        }
        let events = std::mem::take(&mut self.events);
        let statements = std::mem::take(&mut self.statements);
        let counter_statements = std::mem::take(&mut self.counter_statements);

        tracing::debug!(
            events = events.len(),
            statements = statements.len(),
            counters = counter_statements.len(),
            "Ending batch"
        );

        for holder in events {
            try_result!(holder.fire());
        }
        try_outcome!(self.execute_batch(cx, BatchType::Logged, statements).await);
        try_outcome!(
            self.execute_batch(cx, BatchType::Counter, counter_statements)
                .await
        );
        Outcome::Ok(())
    }

    async fn execute_batch(
        &self,
        cx: &Cx,
        batch_type: BatchType,
        wrappers: Vec<StatementWrapper>,
    ) -> Outcome<(), Error> {
        if wrappers.is_empty() {
            return Outcome::Ok(());
        }
        log_batch_start(batch_type, wrappers.len());
        let statements: Vec<_> = wrappers
            .iter()
            .map(|wrapper| {
                wrapper.log_dml();
                wrapper
                    .to_statement()
                    .with_consistency(self.consistency_level)
            })
            .collect();
        log_batch_end(batch_type, self.consistency_level);
        self.session
            .execute_batch(cx, batch_type, &statements, self.consistency_level)
            .await
    }

    /// Copy of this context with the same statements and level. Deferred
    /// events are not copied.
    pub fn duplicate(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            mode: self.mode,
            consistency_level: self.consistency_level,
            statements: self.statements.clone(),
            counter_statements: self.counter_statements.clone(),
            events: Vec::new(),
        }
    }

    /// An empty context of the same mode with a new default level.
    pub fn duplicate_with_no_data(&self, level: ConsistencyLevel) -> Self {
        Self::with_mode(Arc::clone(&self.session), self.mode, level)
    }
}
