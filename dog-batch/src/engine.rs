use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    backend::{BatchStore, BoxStream, FlagStore},
    config::BatchConfig,
    dispatch::{Dispatcher, NonceSigner, RecordingDispatcher},
    executor::TaskExecutor,
    lock::ProcessLock,
    observability::EventBus,
    policy::{is_admissible, EnginePolicies},
    queue::BatchQueue,
    registry::BackgroundProcess,
    resources::{memory_exceeded, MemoryProbe, SysinfoProbe},
    scheduler::{HealthScheduler, TokioScheduler},
    status::StatusRegister,
    tenant::{SingleTenant, TenantDirectory},
    types::{
        Batch, BatchEvent, BatchKey, ChainId, DeclineReason, DrainCtx, DrainOutcome,
        ProcessStatus, QueueId, Task, TaskOutcome, TenantScope, TriggerRequest,
    },
    BatchError, BatchResult,
};

/// How a drain pass ended while holding the lock
enum PassEnd {
    /// Budget spent, status changed, or no batch left
    Stopped,
    /// The next batch belongs to another tenant
    HandOff(TenantScope),
    /// A task panicked; the crash guard already released the lock
    Aborted,
}

/// How processing of one batch ended
enum BatchEnd {
    /// Every task left the batch and it was deleted
    Drained,
    /// The batch disappeared underneath us (deleted by a control call)
    Vanished,
    /// `should_continue` said stop, or tasks were kept
    Halted,
    Aborted,
}

enum TaskFailure {
    Undecodable(BatchError),
    Panicked(String),
}

/// Batch engine for one queue.
///
/// Owns the push buffer, the lock and status register of its queue, and the
/// drain loop shared by trigger and health-check entry points.
pub struct BatchEngine<E: TaskExecutor> {
    me: Weak<Self>,
    queue_id: QueueId,
    config: BatchConfig,
    executor: Arc<E>,
    queue: BatchQueue,
    lock: ProcessLock,
    status: StatusRegister,
    dispatcher: Arc<dyn Dispatcher>,
    scheduler: Arc<dyn HealthScheduler>,
    tenants: Arc<dyn TenantDirectory>,
    memory: Arc<dyn MemoryProbe>,
    policies: EnginePolicies,
    signer: NonceSigner,
    trigger_context: HashMap<String, String>,
    events: EventBus,
    chain: RwLock<Option<ChainId>>,
}

/// Builder wiring an engine to its collaborators
pub struct BatchEngineBuilder<E: TaskExecutor> {
    executor: E,
    batches: Arc<dyn BatchStore>,
    flags: Arc<dyn FlagStore>,
    config: BatchConfig,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    scheduler: Option<Arc<dyn HealthScheduler>>,
    tenants: Option<Arc<dyn TenantDirectory>>,
    memory: Option<Arc<dyn MemoryProbe>>,
    policies: EnginePolicies,
    trigger_context: HashMap<String, String>,
}

impl<E: TaskExecutor> BatchEngineBuilder<E> {
    pub fn config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn HealthScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn tenants(mut self, tenants: Arc<dyn TenantDirectory>) -> Self {
        self.tenants = Some(tenants);
        self
    }

    pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory = Some(probe);
        self
    }

    pub fn policies(mut self, policies: EnginePolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Use a separate store for locks and status entries
    pub fn flag_store(mut self, flags: Arc<dyn FlagStore>) -> Self {
        self.flags = flags;
        self
    }

    /// Cookie/session context forwarded with every trigger
    pub fn trigger_context(mut self, context: HashMap<String, String>) -> Self {
        self.trigger_context = context;
        self
    }

    /// Validate the configuration and build the engine
    pub fn build(self) -> BatchResult<Arc<BatchEngine<E>>> {
        let config = self.config.validate()?;
        let queue_id = QueueId::derive(&config.host_prefix, E::ACTION);
        let events = EventBus::new(config.event_capacity);

        let dispatcher = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => default_dispatcher(&config)?,
        };
        let signer = NonceSigner::new(config.nonce_secret.clone(), config.nonce_lifetime);

        info!(%queue_id, multi_tenant = config.multi_tenant, "Batch engine created");

        Ok(Arc::new_cyclic(|me| BatchEngine {
            me: me.clone(),
            queue: BatchQueue::new(self.batches, queue_id.clone(), config.multi_tenant, events.clone()),
            lock: ProcessLock::new(self.flags.clone(), queue_id.clone(), config.lock_ttl),
            status: StatusRegister::new(self.flags, queue_id.clone()),
            dispatcher,
            scheduler: self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler::new())),
            tenants: self.tenants.unwrap_or_else(|| Arc::new(SingleTenant)),
            memory: self.memory.unwrap_or_else(|| Arc::new(SysinfoProbe::new())),
            policies: self.policies,
            signer,
            trigger_context: self.trigger_context,
            executor: Arc::new(self.executor),
            events,
            chain: RwLock::new(None),
            queue_id,
            config,
        }))
    }
}

#[cfg(feature = "http")]
fn default_dispatcher(config: &BatchConfig) -> BatchResult<Arc<dyn Dispatcher>> {
    Ok(Arc::new(crate::dispatch::HttpDispatcher::new(
        config.trigger_url.clone(),
        config.dispatch_timeout,
    )?))
}

#[cfg(not(feature = "http"))]
fn default_dispatcher(_config: &BatchConfig) -> BatchResult<Arc<dyn Dispatcher>> {
    Ok(Arc::new(RecordingDispatcher::new()))
}

impl<E: TaskExecutor> BatchEngine<E> {
    /// Start building an engine over a store holding both batches and flags
    pub fn builder<S>(executor: E, store: Arc<S>) -> BatchEngineBuilder<E>
    where
        S: BatchStore + FlagStore + 'static,
    {
        BatchEngineBuilder {
            executor,
            batches: store.clone(),
            flags: store,
            config: BatchConfig::default(),
            dispatcher: None,
            scheduler: None,
            tenants: None,
            memory: None,
            policies: EnginePolicies::default(),
            trigger_context: HashMap::new(),
        }
    }

    /// Engine that records triggers instead of sending them
    pub fn in_process<S>(executor: E, store: Arc<S>, config: BatchConfig) -> BatchResult<Arc<Self>>
    where
        S: BatchStore + FlagStore + 'static,
    {
        Self::builder(executor, store)
            .config(config)
            .dispatcher(Arc::new(RecordingDispatcher::new()))
            .build()
    }

    pub fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Lifecycle events of this queue
    pub fn event_stream(&self) -> BoxStream<BatchEvent> {
        self.events.stream()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    /// Chain of the current run, started on demand
    pub fn chain_id(&self) -> ChainId {
        if let Some(chain) = self.chain.read().as_ref() {
            return chain.clone();
        }
        self.chain.write().get_or_insert_with(ChainId::new).clone()
    }

    // ---- producer API ----

    /// Buffer a task for the next [`save`](Self::save)
    pub fn push(&self, payload: E::Payload) -> BatchResult<&Self> {
        let payload = serde_json::to_value(payload)?;
        let task = if E::TRACK_ATTEMPTS {
            Task::tracked(payload)
        } else {
            Task::new(payload)
        };
        self.queue.append(task);
        Ok(self)
    }

    /// Flush buffered tasks into one batch owned by the home tenant
    pub async fn save(&self) -> BatchResult<Option<BatchKey>> {
        let tenant = self.config.home_tenant.clone();
        self.save_for(&tenant).await
    }

    /// Flush buffered tasks into one batch owned by `tenant`
    pub async fn save_for(&self, tenant: &TenantScope) -> BatchResult<Option<BatchKey>> {
        self.queue.flush(tenant, &self.chain_id()).await
    }

    /// Arm the health check and wake a worker in the home tenant
    pub async fn dispatch(&self) {
        let tenant = self.config.home_tenant.clone();
        self.dispatch_to(&tenant, &self.chain_id()).await;
    }

    // ---- control API ----

    /// Pause processing; running passes stop after their current task
    pub async fn pause(&self, with_timeout: bool) -> BatchResult<()> {
        self.status.pause(with_timeout).await?;
        info!(queue_id = %self.queue_id, with_timeout, "Queue paused");
        Ok(())
    }

    /// Clear any pause and optionally wake a worker
    pub async fn resume(&self, dispatch: bool) -> BatchResult<()> {
        self.status.clear().await?;
        let chain_id = self.chain_id();
        self.emit(&chain_id, |queue_id, chain_id, at| BatchEvent::Resumed { queue_id, chain_id, at });
        info!(queue_id = %self.queue_id, "Queue resumed");
        if dispatch {
            self.dispatch().await;
        }
        Ok(())
    }

    /// Mark the queue cancelled and wake a worker to clean it up
    pub async fn cancel(&self) -> BatchResult<()> {
        self.status.write(ProcessStatus::Cancelled).await?;
        info!(queue_id = %self.queue_id, "Queue cancellation requested");
        self.dispatch().await;
        Ok(())
    }

    /// Delete every batch and clear the status
    pub async fn delete_all(&self) -> BatchResult<usize> {
        let deleted = self.queue.delete_all(&self.chain_id()).await?;
        self.status.clear().await?;
        info!(queue_id = %self.queue_id, deleted, "Queue emptied");
        Ok(deleted)
    }

    pub async fn status(&self) -> BatchResult<ProcessStatus> {
        self.status.read().await
    }

    pub async fn is_paused(&self) -> BatchResult<bool> {
        Ok(self.status.read().await?.is_paused())
    }

    pub async fn is_cancelled(&self) -> BatchResult<bool> {
        Ok(self.status.read().await?.is_cancelled())
    }

    /// Whether a worker currently holds the lock
    pub async fn is_processing(&self) -> BatchResult<bool> {
        self.lock.is_locked().await
    }

    /// Whether any batch is visible from the home tenant
    pub async fn is_queued(&self) -> BatchResult<bool> {
        Ok(!self.queue.is_empty(&self.config.home_tenant).await?)
    }

    pub async fn pending_batches(&self) -> BatchResult<usize> {
        self.queue.pending_batches().await
    }

    pub async fn queued_task_count(&self) -> BatchResult<usize> {
        self.queue.queued_tasks().await
    }

    /// Oldest batch visible from the home tenant
    pub async fn oldest_batch(&self) -> BatchResult<Option<Batch>> {
        self.queue.oldest(&self.config.home_tenant).await
    }

    pub fn verify_nonce(&self, nonce: &str) -> bool {
        self.signer.verify(&self.queue_id, nonce)
    }

    /// Build a signed trigger for `tenant`
    pub fn trigger_request(&self, tenant: &TenantScope, chain_id: &ChainId) -> TriggerRequest {
        TriggerRequest {
            action: self.queue_id.clone(),
            nonce: self.signer.sign(&self.queue_id),
            chain_id: chain_id.clone(),
            tenant: tenant.clone(),
            context: self.trigger_context.clone(),
        }
    }

    // ---- entry points ----

    /// Run a pass on behalf of a trigger request
    #[instrument(skip(self, request), fields(queue_id = %self.queue_id, chain_id = %request.chain_id, tenant = %request.tenant))]
    pub async fn handle_trigger(&self, request: TriggerRequest) -> BatchResult<DrainOutcome> {
        if request.action != self.queue_id {
            return Err(BatchError::QueueNotRegistered(request.action.to_string()));
        }
        if !self.verify_nonce(&request.nonce) {
            warn!("Rejected trigger with invalid nonce");
            return Err(BatchError::InvalidNonce);
        }

        *self.chain.write() = Some(request.chain_id.clone());
        let ctx = DrainCtx::new(request.tenant, request.chain_id).with_context(request.context);
        let outcome = self.drain(ctx).await;
        self.log_outcome("trigger", &outcome);
        outcome
    }

    /// Periodic self-healing check; drains directly without a trigger hop
    #[instrument(skip(self), fields(queue_id = %self.queue_id))]
    pub async fn health_check(&self) -> BatchResult<DrainOutcome> {
        if self.lock.is_locked().await? {
            debug!("Health check skipped, worker running");
            return Ok(DrainOutcome::Skipped);
        }

        let status = self.status.read().await?;
        let ctx = DrainCtx::new(self.config.home_tenant.clone(), self.chain_id())
            .with_context(self.trigger_context.clone());

        if !status.is_cancelled() && self.queue.is_empty(&ctx.tenant).await? {
            self.scheduler.unschedule(&self.queue_id);
            debug!("Health check disarmed, queue empty");
            return Ok(DrainOutcome::Unscheduled);
        }

        if status == ProcessStatus::PausedNoTimeout {
            debug!("Health check skipped, queue paused");
            return Ok(DrainOutcome::Skipped);
        }
        if status == ProcessStatus::PausedWithTimeout
            && !self.status.pause_expired(self.config.pause_timeout()).await?
        {
            debug!("Health check skipped, pause not expired");
            return Ok(DrainOutcome::Skipped);
        }

        let outcome = self.drain(ctx).await;
        self.log_outcome("health_check", &outcome);
        outcome
    }

    // ---- drain loop ----

    async fn drain(&self, ctx: DrainCtx) -> BatchResult<DrainOutcome> {
        if self.lock.is_locked().await? {
            debug!("Drain declined, lock held");
            return Ok(DrainOutcome::Declined(DeclineReason::Locked));
        }

        match self.status.read().await? {
            ProcessStatus::Cancelled => return self.finish_cancellation(&ctx).await,
            ProcessStatus::PausedWithTimeout => {
                if self.status.pause_expired(self.config.pause_timeout()).await? {
                    self.status.clear().await?;
                    self.emit(&ctx.chain_id, |queue_id, chain_id, at| BatchEvent::Resumed { queue_id, chain_id, at });
                    info!("Timed pause expired, resuming");
                } else {
                    self.emit(&ctx.chain_id, |queue_id, chain_id, at| BatchEvent::Paused { queue_id, chain_id, at });
                    return Ok(DrainOutcome::Paused);
                }
            }
            ProcessStatus::PausedNoTimeout => {
                self.emit(&ctx.chain_id, |queue_id, chain_id, at| BatchEvent::Paused { queue_id, chain_id, at });
                return Ok(DrainOutcome::Paused);
            }
            ProcessStatus::None => {}
        }

        if self.queue.is_empty(&ctx.tenant).await? {
            debug!("Drain declined, queue empty");
            return Ok(DrainOutcome::Declined(DeclineReason::Empty));
        }

        self.lock.acquire().await?;
        self.emit(&ctx.chain_id, |queue_id, chain_id, at| BatchEvent::ProcessLocked { queue_id, chain_id, at });
        self.executor.begin_pass(&ctx).await;

        let pass = self.run_pass(&ctx).await;
        if !matches!(pass, Ok(PassEnd::Aborted)) {
            self.unlock(&ctx.chain_id).await?;
        }

        match pass? {
            PassEnd::Aborted => Ok(DrainOutcome::Aborted),
            PassEnd::HandOff(tenant) => {
                info!(%tenant, "Oldest batch belongs to another tenant, handing off");
                self.dispatch_to(&tenant, &ctx.chain_id).await;
                Ok(DrainOutcome::HandedOff(tenant))
            }
            PassEnd::Stopped => self.finish_pass(&ctx).await,
        }
    }

    async fn run_pass(&self, ctx: &DrainCtx) -> BatchResult<PassEnd> {
        let started = Instant::now();

        loop {
            let Some(batch) = self.queue.oldest(&ctx.tenant).await? else {
                return Ok(PassEnd::Stopped);
            };

            if self.config.multi_tenant && batch.tenant() != &ctx.tenant {
                if !self.tenants.is_active(batch.tenant()) {
                    let deleted = self.queue.delete_tenant(batch.tenant(), &ctx.chain_id).await?;
                    warn!(tenant = %batch.tenant(), deleted, "Deleted batches of inactive tenant");
                    continue;
                }
                return Ok(PassEnd::HandOff(batch.tenant().clone()));
            }

            match self.process_batch(batch, ctx, started).await? {
                BatchEnd::Drained | BatchEnd::Vanished => continue,
                BatchEnd::Halted => return Ok(PassEnd::Stopped),
                BatchEnd::Aborted => return Ok(PassEnd::Aborted),
            }
        }
    }

    async fn process_batch(&self, batch: Batch, ctx: &DrainCtx, started: Instant) -> BatchResult<BatchEnd> {
        let mut guard = CrashGuard {
            lock: self.lock.clone(),
            events: self.events.clone(),
            queue_id: self.queue_id.clone(),
            chain_id: ctx.chain_id.clone(),
            batch_key: batch.key.clone(),
            remaining: batch.len(),
            armed: true,
        };
        let result = self.iterate_batch(batch, ctx, started, &mut guard).await;
        guard.armed = false;
        result
    }

    async fn iterate_batch(
        &self,
        mut batch: Batch,
        ctx: &DrainCtx,
        started: Instant,
        guard: &mut CrashGuard,
    ) -> BatchResult<BatchEnd> {
        let slots: Vec<u64> = batch.items().keys().copied().collect();
        debug!(batch_key = %batch.key, tasks = slots.len(), "Processing batch");

        for slot in slots {
            let Some(mut task) = batch.record.items.get(&slot).cloned() else {
                continue;
            };
            guard.remaining = batch.len();

            if E::TRACK_ATTEMPTS {
                task.attempts = Some(task.attempt_count().saturating_add(1));
                batch.record.items.insert(slot, task.clone());
                if !self.queue.write(&batch.key, batch.record.items.clone(), &ctx.chain_id).await? {
                    return Ok(BatchEnd::Vanished);
                }
            }

            let max_attempts = self
                .policies
                .max_attempts
                .max_attempts(&task, &batch, &self.queue_id);
            let attempts = task.attempt_count();

            let keep = if E::TRACK_ATTEMPTS && !is_admissible(attempts, max_attempts) {
                error!(batch_key = %batch.key, slot, attempts, max_attempts, "Task exceeded max attempts, abandoning");
                None
            } else {
                match self.execute(&task).await {
                    Ok(TaskOutcome::Drop) => None,
                    Ok(TaskOutcome::Keep(mut kept)) => {
                        kept.attempts = task.attempts;
                        if E::TRACK_ATTEMPTS && attempts >= max_attempts {
                            error!(batch_key = %batch.key, slot, attempts, max_attempts, "Task failed its last attempt, abandoning");
                            None
                        } else {
                            Some(kept)
                        }
                    }
                    Err(TaskFailure::Undecodable(e)) => {
                        error!(batch_key = %batch.key, slot, error = %e, "Task payload cannot be decoded, dropping");
                        None
                    }
                    Err(TaskFailure::Panicked(reason)) => {
                        guard.remaining = batch.len();
                        guard.crash(&reason).await;
                        return Ok(BatchEnd::Aborted);
                    }
                }
            };

            let retry = keep.is_some();
            match keep {
                Some(kept) => {
                    batch.record.items.insert(slot, kept);
                }
                None => {
                    batch.record.items.remove(&slot);
                }
            }

            if batch.is_empty() {
                self.queue.delete(&batch.key, &ctx.chain_id).await?;
            } else if !self.queue.write(&batch.key, batch.record.items.clone(), &ctx.chain_id).await? {
                return Ok(BatchEnd::Vanished);
            }

            if retry {
                if self.status.pause_if_running().await? {
                    info!(batch_key = %batch.key, slot, attempts, "Task kept for retry, pausing queue");
                } else {
                    debug!(batch_key = %batch.key, slot, "Task kept, queue already paused or cancelled");
                }
            }

            if !self.config.throttle.is_zero() {
                tokio::time::sleep(self.config.throttle).await;
            }

            if !self.should_continue(started).await? {
                return Ok(BatchEnd::Halted);
            }
        }

        Ok(if batch.is_empty() { BatchEnd::Drained } else { BatchEnd::Halted })
    }

    async fn execute(&self, task: &Task<Value>) -> Result<TaskOutcome<Value>, TaskFailure> {
        let typed = task.decode::<E::Payload>().map_err(TaskFailure::Undecodable)?;

        match AssertUnwindSafe(self.executor.task(typed)).catch_unwind().await {
            Ok(TaskOutcome::Drop) => Ok(TaskOutcome::Drop),
            Ok(TaskOutcome::Keep(kept)) => kept
                .encode()
                .map(TaskOutcome::Keep)
                .map_err(TaskFailure::Undecodable),
            Err(panic) => Err(TaskFailure::Panicked(panic_message(panic.as_ref()))),
        }
    }

    async fn should_continue(&self, started: Instant) -> BatchResult<bool> {
        if started.elapsed() >= self.config.time_budget {
            debug!("Time budget spent");
            return Ok(false);
        }
        if memory_exceeded(self.memory.as_ref(), self.config.memory_ceiling, self.config.memory_threshold) {
            warn!("Memory threshold reached, yielding");
            return Ok(false);
        }
        if self.status.read().await?.halts_processing() {
            debug!("Queue paused or cancelled mid-pass");
            return Ok(false);
        }
        if let Some(condition) = &self.policies.continue_condition {
            if !condition.should_continue(&self.queue_id).await {
                debug!("Continue condition asked to stop");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn finish_pass(&self, ctx: &DrainCtx) -> BatchResult<DrainOutcome> {
        let status = self.status.read().await?;
        if status.is_cancelled() {
            return self.finish_cancellation(ctx).await;
        }
        if status.is_paused() {
            self.emit(&ctx.chain_id, |queue_id, chain_id, at| BatchEvent::Paused { queue_id, chain_id, at });
            info!("Pass stopped, queue paused");
            return Ok(DrainOutcome::Paused);
        }
        if self.queue.is_empty(&ctx.tenant).await? {
            self.complete(ctx).await?;
            return Ok(DrainOutcome::Completed);
        }

        debug!("Work remains, dispatching next pass");
        self.dispatch_to(&ctx.tenant, &ctx.chain_id).await;
        Ok(DrainOutcome::Rescheduled)
    }

    async fn complete(&self, ctx: &DrainCtx) -> BatchResult<()> {
        self.status.clear().await?;
        self.scheduler.unschedule(&self.queue_id);
        self.emit(&ctx.chain_id, |queue_id, chain_id, at| BatchEvent::Completed { queue_id, chain_id, at });
        self.chain.write().take();
        info!("Queue drained");
        Ok(())
    }

    async fn finish_cancellation(&self, ctx: &DrainCtx) -> BatchResult<DrainOutcome> {
        let deleted = self.queue.delete_all(&ctx.chain_id).await?;
        self.status.clear().await?;
        self.scheduler.unschedule(&self.queue_id);
        self.emit(&ctx.chain_id, |queue_id, chain_id, at| BatchEvent::Cancelled { queue_id, chain_id, at });
        self.chain.write().take();
        info!(deleted, "Queue cancelled");
        Ok(DrainOutcome::Cancelled)
    }

    async fn unlock(&self, chain_id: &ChainId) -> BatchResult<()> {
        self.lock.release().await?;
        self.emit(chain_id, |queue_id, chain_id, at| BatchEvent::ProcessUnlocked { queue_id, chain_id, at });
        Ok(())
    }

    async fn dispatch_to(&self, tenant: &TenantScope, chain_id: &ChainId) {
        let target: Weak<dyn BackgroundProcess> = self.me.clone();
        self.scheduler
            .schedule(&self.queue_id, self.config.health_check_interval, target);

        let request = self.trigger_request(tenant, chain_id);
        if let Err(e) = self.dispatcher.dispatch(request).await {
            warn!(queue_id = %self.queue_id, %chain_id, %tenant, error = %e, "Trigger dispatch failed, health check will retry");
        }
    }

    fn emit(&self, chain_id: &ChainId, event: impl FnOnce(QueueId, ChainId, DateTime<Utc>) -> BatchEvent) {
        self.events
            .emit(event(self.queue_id.clone(), chain_id.clone(), Utc::now()));
    }

    fn log_outcome(&self, entry: &'static str, outcome: &BatchResult<DrainOutcome>) {
        match outcome {
            Ok(outcome) => debug!(entry, outcome = outcome.name(), "Drain finished"),
            Err(e) => error!(entry, error = %e, "Drain failed"),
        }
    }
}

#[async_trait]
impl<E: TaskExecutor> BackgroundProcess for BatchEngine<E> {
    fn queue_id(&self) -> &QueueId {
        &self.queue_id
    }

    fn home_tenant(&self) -> &TenantScope {
        &self.config.home_tenant
    }

    fn verify_nonce(&self, nonce: &str) -> bool {
        Self::verify_nonce(self, nonce)
    }

    async fn handle_trigger(&self, request: TriggerRequest) -> BatchResult<DrainOutcome> {
        Self::handle_trigger(self, request).await
    }

    async fn health_check(&self) -> BatchResult<DrainOutcome> {
        Self::health_check(self).await
    }

    async fn pause(&self, with_timeout: bool) -> BatchResult<()> {
        Self::pause(self, with_timeout).await
    }

    async fn resume(&self, dispatch: bool) -> BatchResult<()> {
        Self::resume(self, dispatch).await
    }

    async fn cancel(&self) -> BatchResult<()> {
        Self::cancel(self).await
    }

    async fn delete_all(&self) -> BatchResult<usize> {
        Self::delete_all(self).await
    }

    async fn status(&self) -> BatchResult<ProcessStatus> {
        Self::status(self).await
    }
}

/// Releases the lock if a pass dies while iterating a batch
struct CrashGuard {
    lock: ProcessLock,
    events: EventBus,
    queue_id: QueueId,
    chain_id: ChainId,
    batch_key: BatchKey,
    remaining: usize,
    armed: bool,
}

impl CrashGuard {
    async fn crash(&mut self, reason: &str) {
        self.armed = false;
        error!(
            queue_id = %self.queue_id,
            batch_key = %self.batch_key,
            remaining = self.remaining,
            reason,
            "Task panicked, force-releasing process lock"
        );
        if let Err(e) = self.lock.release().await {
            error!(queue_id = %self.queue_id, error = %e, "Could not release lock after crash");
        }
        self.emit_unlocked();
    }

    fn emit_unlocked(&self) {
        self.events.emit(BatchEvent::ProcessUnlocked {
            queue_id: self.queue_id.clone(),
            chain_id: self.chain_id.clone(),
            at: Utc::now(),
        });
    }
}

impl Drop for CrashGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!(
            queue_id = %self.queue_id,
            batch_key = %self.batch_key,
            remaining = self.remaining,
            "Drain interrupted mid-batch, force-releasing process lock"
        );
        self.emit_unlocked();

        let lock = self.lock.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = lock.release().await {
                    error!(error = %e, "Could not release lock after interrupted drain");
                }
            });
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
