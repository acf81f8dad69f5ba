//! Debounced, single-flight persistence of stock row edits.
//!
//! Every edit lands in an in-memory overlay immediately. The write itself is
//! debounced per [`RecordKey`]; at most one write per key is outstanding.
//! Rows without a record are created on first write, unless a record for the
//! same (location, product, date) is already known, in which case that record
//! is updated and the row is re-keyed to it. A failed write discards the
//! overlay for its scope and reloads the scope from the backend.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::demand::DemandSource;
use crate::error::{Result, StockError};
use crate::matcher::is_same_product;
use crate::models::{
    CatalogProduct, NewStockRecord, RecordKey, Scope, StockField, StockFigures, StockRecord,
};
use crate::providers::StockBackend;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// What happens to an edit whose debounce fires while a write for the same
/// record is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InFlightPolicy {
    /// The edit is discarded and a [`SyncEvent::Dropped`] is published.
    Drop,
    /// The edit is held (one per key, later edits merged in) and written as
    /// soon as the outstanding write settles.
    #[default]
    Requeue,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub debounce: Duration,
    pub in_flight_policy: InFlightPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            debounce: DEFAULT_DEBOUNCE,
            in_flight_policy: InFlightPolicy::default(),
        }
    }
}

/// Where an edited row lives: its scope and catalog product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowContext {
    pub scope: Scope,
    pub product: CatalogProduct,
}

/// Notifications for the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Saved { key: RecordKey, record: StockRecord },
    Dropped { key: RecordKey },
    Failed { key: RecordKey, scope: Scope, message: String },
    Reloaded { scope: Scope, count: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FieldEdits {
    stock_initial: Option<i32>,
    brought_in: Option<i32>,
}

impl FieldEdits {
    fn set(&mut self, field: StockField, value: i32) {
        match field {
            StockField::StockInitial => self.stock_initial = Some(value),
            StockField::BroughtIn => self.brought_in = Some(value),
        }
    }

    /// Newer values in `later` win.
    fn merged_with(self, later: FieldEdits) -> FieldEdits {
        FieldEdits {
            stock_initial: later.stock_initial.or(self.stock_initial),
            brought_in: later.brought_in.or(self.brought_in),
        }
    }

    fn apply(&self, base: StockFigures) -> StockFigures {
        StockFigures::new(
            self.stock_initial.unwrap_or(base.stock_initial),
            self.brought_in.unwrap_or(base.brought_in),
            base.daily_demand,
        )
    }
}

struct PendingEdit {
    edits: FieldEdits,
    context: RowContext,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl PendingEdit {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct OverlayEntry {
    scope: Scope,
    figures: StockFigures,
}

enum WritePlan {
    Update {
        id: i64,
        figures: StockFigures,
    },
    Create {
        record: NewStockRecord,
        edits: FieldEdits,
        product: CatalogProduct,
    },
}

#[derive(Default)]
struct State {
    /// Authoritative records as last returned by the backend.
    records: HashMap<i64, StockRecord>,
    overlay: HashMap<RecordKey, OverlayEntry>,
    pending: HashMap<RecordKey, PendingEdit>,
    deferred: HashMap<RecordKey, PendingEdit>,
    in_flight: HashSet<RecordKey>,
    /// Draft tag -> id of the record it was created as or merged into.
    aliases: HashMap<String, i64>,
    next_generation: u64,
}

impl State {
    fn resolve(&self, key: RecordKey) -> RecordKey {
        match key {
            RecordKey::Draft(tag) => match self.aliases.get(&tag) {
                Some(id) => RecordKey::Persisted(*id),
                None => RecordKey::Draft(tag),
            },
            persisted => persisted,
        }
    }

    fn current_figures(&self, key: &RecordKey) -> Option<StockFigures> {
        if let Some(entry) = self.overlay.get(key) {
            return Some(entry.figures);
        }
        match key {
            RecordKey::Persisted(id) => self.records.get(id).map(StockRecord::figures),
            RecordKey::Draft(_) => None,
        }
    }

    fn find_record(&self, scope: &Scope, product: &CatalogProduct) -> Option<&StockRecord> {
        self.records.values().find(|record| {
            record.location == scope.location
                && record.stock_date == scope.date
                && is_same_product((*record).into(), product)
        })
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Edits not yet written for `key`, oldest first.
    fn outstanding_edits(&self, key: &RecordKey) -> Option<FieldEdits> {
        let deferred = self.deferred.get(key).map(|d| d.edits);
        let pending = self.pending.get(key).map(|p| p.edits);
        match (deferred, pending) {
            (Some(d), Some(p)) => Some(d.merged_with(p)),
            (d, p) => d.or(p),
        }
    }

    /// Drops every optimistic value and queued edit for `scope`.
    fn discard_scope(&mut self, scope: &Scope) -> usize {
        let before = self.overlay.len();
        self.overlay.retain(|_, entry| entry.scope != *scope);
        let mut discarded = before - self.overlay.len();

        for queue in [&mut self.pending, &mut self.deferred] {
            queue.retain(|_, edit| {
                if edit.context.scope == *scope {
                    edit.cancel_timer();
                    discarded += 1;
                    false
                } else {
                    true
                }
            });
        }
        discarded
    }
}

struct Inner {
    backend: Arc<dyn StockBackend>,
    demand: Arc<dyn DemandSource>,
    config: CoordinatorConfig,
    state: Mutex<State>,
    events: broadcast::Sender<SyncEvent>,
    /// Runtime the coordinator was built in, used for debounce timers.
    runtime: Option<Handle>,
}

#[derive(Clone)]
pub struct WriteCoordinator {
    inner: Arc<Inner>,
}

impl WriteCoordinator {
    pub fn new(
        backend: Arc<dyn StockBackend>,
        demand: Arc<dyn DemandSource>,
        config: CoordinatorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        WriteCoordinator {
            inner: Arc::new(Inner {
                backend,
                demand,
                config,
                state: Mutex::new(State::default()),
                events,
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The runtime timers are spawned on: the one captured at construction,
    /// else the caller's.
    fn runtime(&self) -> Result<Handle> {
        match &self.inner.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| StockError::NoRuntime),
        }
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn demand_for(&self, context: &RowContext) -> i32 {
        self.inner
            .demand
            .daily_demand(&context.product, &context.scope.location, context.scope.date)
    }

    /// Replaces the known records of `scope` with the backend's.
    pub async fn load_scope(&self, scope: &Scope) -> Result<usize> {
        let records = self
            .inner
            .backend
            .list_stock(&scope.location, scope.date)
            .await?;
        let count = records.len();

        let mut state = self.state();
        state.records.retain(|_, record| record.scope() != *scope);
        for record in records {
            state.records.insert(record.id, record);
        }
        debug!(%scope, count, "stock scope loaded");
        Ok(count)
    }

    pub fn records_in(&self, scope: &Scope) -> Vec<StockRecord> {
        let state = self.state();
        let mut records: Vec<StockRecord> = state
            .records
            .values()
            .filter(|record| record.scope() == *scope)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.id);
        records
    }

    pub fn record_for(&self, scope: &Scope, product: &CatalogProduct) -> Option<StockRecord> {
        self.state().find_record(scope, product).cloned()
    }

    /// The key a row should be addressed by now (drafts follow their alias).
    pub fn resolve(&self, key: RecordKey) -> RecordKey {
        self.state().resolve(key)
    }

    /// Optimistic figures for `key`, or the persisted ones when nothing is pending.
    pub fn figures(&self, key: &RecordKey) -> Option<StockFigures> {
        let state = self.state();
        let key = state.resolve(key.clone());
        state.current_figures(&key)
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state();
        state.pending.is_empty() && state.deferred.is_empty() && state.in_flight.is_empty()
    }

    /// Records an edit, updates the overlay and (re)arms the debounce timer for the row.
    /// Returns the optimistic figures now shown for the row.
    ///
    /// Fails with [`StockError::NoRuntime`], leaving nothing recorded, when the
    /// coordinator was built outside a tokio runtime and is called outside one.
    pub fn schedule_write(
        &self,
        key: RecordKey,
        field: StockField,
        value: i32,
        context: RowContext,
    ) -> Result<StockFigures> {
        let runtime = self.runtime()?;
        let demand = self.demand_for(&context);

        let mut state = self.state();
        let key = state.resolve(key);
        let figures = state
            .current_figures(&key)
            .unwrap_or_default()
            .with_field(field, value)
            .with_demand(demand);
        state.overlay.insert(
            key.clone(),
            OverlayEntry {
                scope: context.scope.clone(),
                figures,
            },
        );

        let generation = state.bump_generation();
        let timer = self.spawn_fire(&runtime, key.clone(), generation, self.inner.config.debounce);
        let pending = state.pending.entry(key.clone()).or_insert_with(|| PendingEdit {
            edits: FieldEdits::default(),
            context: context.clone(),
            generation,
            timer: None,
        });
        pending.cancel_timer();
        pending.edits.set(field, value);
        pending.context = context;
        pending.generation = generation;
        pending.timer = Some(timer);

        debug!(%key, ?field, value, "stock edit scheduled");
        Ok(figures)
    }

    fn spawn_fire(&self, runtime: &Handle, key: RecordKey, generation: u64, delay: Duration) -> JoinHandle<()> {
        let this = self.clone();
        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            this.fire(key, generation).await;
        })
    }

    /// Takes the pending edit for `key` and turns it into a write plan, or
    /// parks/drops it when a write for the same record is outstanding.
    fn begin_write(&self, key: &RecordKey, generation: u64) -> Option<(RecordKey, RowContext, WritePlan)> {
        let mut state = self.state();
        match state.pending.get(key) {
            Some(pending) if pending.generation == generation => {}
            _ => return None,
        }
        let mut edit = state.pending.remove(key)?;
        edit.timer = None;

        let demand = self.demand_for(&edit.context);
        let mut target = state.resolve(key.clone());

        if let RecordKey::Draft(tag) = &target {
            let found = state
                .find_record(&edit.context.scope, &edit.context.product)
                .map(|record| (record.id, record.figures()));
            if let Some((id, base)) = found {
                info!(draft = %tag, record_id = id, "draft row matches existing record, updating it");
                state.aliases.insert(tag.clone(), id);
                state.overlay.remove(&target);
                let persisted = RecordKey::Persisted(id);
                // Draft edits go on top of whatever the record already shows.
                let shown = state
                    .overlay
                    .get(&persisted)
                    .map_or(base, |entry| entry.figures);
                state.overlay.insert(
                    persisted.clone(),
                    OverlayEntry {
                        scope: edit.context.scope.clone(),
                        figures: edit.edits.apply(shown).with_demand(demand),
                    },
                );
                target = persisted;
            }
        }

        if state.in_flight.contains(&target) {
            match self.inner.config.in_flight_policy {
                InFlightPolicy::Drop => {
                    warn!(key = %target, "write already in flight, dropping edit");
                    drop(state);
                    self.publish(SyncEvent::Dropped { key: target });
                }
                InFlightPolicy::Requeue => {
                    debug!(key = %target, "write already in flight, deferring edit");
                    match state.deferred.get_mut(&target) {
                        Some(parked) => {
                            parked.edits = parked.edits.merged_with(edit.edits);
                            parked.context = edit.context;
                        }
                        None => {
                            state.deferred.insert(target, edit);
                        }
                    }
                }
            }
            return None;
        }

        state.in_flight.insert(target.clone());

        let plan = match &target {
            RecordKey::Persisted(id) => {
                let base = state
                    .records
                    .get(id)
                    .map(StockRecord::figures)
                    .unwrap_or_default();
                WritePlan::Update {
                    id: *id,
                    figures: edit.edits.apply(base).with_demand(demand),
                }
            }
            RecordKey::Draft(_) => {
                let product = edit.context.product.clone();
                WritePlan::Create {
                    record: NewStockRecord {
                        location: edit.context.scope.location.clone(),
                        section: product.section.clone(),
                        product_name: product.product_name.clone(),
                        weight: product.weight.clone(),
                        stock_date: edit.context.scope.date,
                        figures: edit.edits.apply(StockFigures::default()).with_demand(demand),
                    },
                    edits: edit.edits,
                    product,
                }
            }
        };

        Some((target, edit.context, plan))
    }

    async fn execute(&self, plan: WritePlan) -> Result<StockRecord> {
        let backend = &self.inner.backend;
        match plan {
            WritePlan::Update { id, figures } => backend.update_stock(id, figures).await,
            WritePlan::Create {
                record,
                edits,
                product,
            } => {
                let location = record.location.clone();
                let date = record.stock_date;
                let demand = record.figures.daily_demand;
                match backend.create_stock(record).await {
                    Err(duplicate @ StockError::Duplicate { .. }) => {
                        warn!(%location, %date, "create raced with another writer, updating existing record");
                        let existing = backend
                            .list_stock(&location, date)
                            .await?
                            .into_iter()
                            .find(|r| is_same_product(r.into(), &product));
                        match existing {
                            Some(existing) => {
                                let figures = edits.apply(existing.figures()).with_demand(demand);
                                backend.update_stock(existing.id, figures).await
                            }
                            None => Err(duplicate),
                        }
                    }
                    other => other,
                }
            }
        }
    }

    async fn fire(self, key: RecordKey, generation: u64) {
        let Some((target, context, plan)) = self.begin_write(&key, generation) else {
            return;
        };

        match self.execute(plan).await {
            Ok(record) => self.finish_write(target, record),
            Err(e) => self.fail_write(target, context, e).await,
        }
    }

    fn finish_write(&self, target: RecordKey, record: StockRecord) {
        let mut state = self.state();
        state.in_flight.remove(&target);

        let persisted = RecordKey::Persisted(record.id);
        if let RecordKey::Draft(tag) = &target {
            state.aliases.insert(tag.clone(), record.id);
            state.overlay.remove(&target);
        }
        state.records.insert(record.id, record.clone());

        // Edits that arrived while the write was out stay visible on top of the server values.
        let outstanding = [&target, &persisted]
            .into_iter()
            .filter_map(|k| state.outstanding_edits(k))
            .reduce(FieldEdits::merged_with);
        match outstanding {
            Some(edits) => {
                let figures = edits.apply(record.figures()).with_demand(record.daily_demand);
                state.overlay.insert(
                    persisted.clone(),
                    OverlayEntry {
                        scope: record.scope(),
                        figures,
                    },
                );
            }
            None => {
                state.overlay.remove(&persisted);
            }
        }

        if let Some(mut parked) = state.deferred.remove(&target) {
            match state.pending.get_mut(&target) {
                Some(pending) => {
                    pending.edits = parked.edits.merged_with(pending.edits);
                }
                None => match self.runtime() {
                    Ok(runtime) => {
                        let generation = state.bump_generation();
                        parked.generation = generation;
                        parked.timer =
                            Some(self.spawn_fire(&runtime, target.clone(), generation, Duration::ZERO));
                        state.pending.insert(target.clone(), parked);
                    }
                    Err(e) => warn!(key = %target, error = %e, "deferred edit not requeued"),
                },
            }
        }
        drop(state);

        info!(key = %target, record_id = record.id, "stock record saved");
        self.publish(SyncEvent::Saved {
            key: target,
            record,
        });
    }

    async fn fail_write(&self, target: RecordKey, context: RowContext, err: StockError) {
        let scope = context.scope;
        let discarded = {
            let mut state = self.state();
            state.in_flight.remove(&target);
            state.discard_scope(&scope)
        };

        error!(key = %target, %scope, error = %err, discarded, "stock write failed, rolling back scope");
        self.publish(SyncEvent::Failed {
            key: target,
            scope: scope.clone(),
            message: err.to_string(),
        });

        self.reload(&scope).await;
    }

    /// Reloads a scope from the backend, logging instead of failing.
    pub async fn reload(&self, scope: &Scope) {
        match self.load_scope(scope).await {
            Ok(count) => {
                info!(%scope, count, "stock scope reloaded");
                self.publish(SyncEvent::Reloaded {
                    scope: scope.clone(),
                    count,
                });
            }
            Err(e) => error!(%scope, error = %e, "failed to reload stock scope"),
        }
    }
}
