use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;

use dog_batch::{
    backend::BatchStore,
    lock::ProcessLock,
    policy::ContinueCondition,
    resources::FixedProbe,
    status::StatusRegister,
    types::BatchRecord,
    BatchConfig, BatchEngine, BatchEvent, BatchKey, DeclineReason, DrainCtx, DrainOutcome, EnginePolicies,
    FixedMaxAttempts, HealthScheduler, ManualScheduler, MemoryStore, ProcessStatus, QueueId,
    RecordingDispatcher, StaticTenants, Task, TaskExecutor, TaskOutcome, TenantScope,
};

/// Drops every task after recording its payload
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<u64>>>,
}

#[async_trait::async_trait]
impl TaskExecutor for Recorder {
    type Payload = u64;
    const ACTION: &'static str = "record";

    async fn task(&self, task: Task<u64>) -> TaskOutcome<u64> {
        self.seen.lock().push(task.payload);
        TaskOutcome::Drop
    }
}

/// Keeps every task for retry
#[derive(Clone, Default)]
struct AlwaysRetry {
    calls: Arc<AtomicU32>,
}

#[async_trait::async_trait]
impl TaskExecutor for AlwaysRetry {
    type Payload = String;
    const ACTION: &'static str = "retry";
    const TRACK_ATTEMPTS: bool = true;

    async fn task(&self, task: Task<String>) -> TaskOutcome<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TaskOutcome::Keep(task)
    }
}

/// Cancels its own queue when it reaches payload 3
struct CancelAtThree {
    status: StatusRegister,
    seen: Arc<Mutex<Vec<u64>>>,
}

#[async_trait::async_trait]
impl TaskExecutor for CancelAtThree {
    type Payload = u64;
    const ACTION: &'static str = "cancel_at_three";

    async fn task(&self, task: Task<u64>) -> TaskOutcome<u64> {
        self.seen.lock().push(task.payload);
        if task.payload == 3 {
            self.status.write(ProcessStatus::Cancelled).await.unwrap();
        }
        TaskOutcome::Drop
    }
}

/// Cancels its own queue from inside the task, then asks to keep the task
struct CancelThenKeep {
    status: StatusRegister,
}

#[async_trait::async_trait]
impl TaskExecutor for CancelThenKeep {
    type Payload = u64;
    const ACTION: &'static str = "cancel_then_keep";

    async fn task(&self, task: Task<u64>) -> TaskOutcome<u64> {
        self.status.write(ProcessStatus::Cancelled).await.unwrap();
        TaskOutcome::Keep(task)
    }
}

/// Second queue sharing a store with `Recorder`
#[derive(Clone, Default)]
struct Counter {
    seen: Arc<Mutex<Vec<u64>>>,
}

#[async_trait::async_trait]
impl TaskExecutor for Counter {
    type Payload = u64;
    const ACTION: &'static str = "count";

    async fn task(&self, task: Task<u64>) -> TaskOutcome<u64> {
        self.seen.lock().push(task.payload);
        TaskOutcome::Drop
    }
}

/// Remembers the context each pass started with
#[derive(Clone, Default)]
struct SessionAware {
    passes: Arc<Mutex<Vec<DrainCtx>>>,
}

#[async_trait::async_trait]
impl TaskExecutor for SessionAware {
    type Payload = u64;
    const ACTION: &'static str = "session";

    async fn begin_pass(&self, ctx: &DrainCtx) {
        self.passes.lock().push(ctx.clone());
    }

    async fn task(&self, _task: Task<u64>) -> TaskOutcome<u64> {
        TaskOutcome::Drop
    }
}

struct StopAlways;

#[async_trait::async_trait]
impl ContinueCondition for StopAlways {
    async fn should_continue(&self, _queue_id: &QueueId) -> bool {
        false
    }
}

struct Harness<E: TaskExecutor> {
    engine: Arc<BatchEngine<E>>,
    store: Arc<MemoryStore>,
    dispatcher: RecordingDispatcher,
    scheduler: ManualScheduler,
}

fn test_config() -> BatchConfig {
    BatchConfig::default()
        .with_host_prefix("test")
        .with_nonce_secret("s3cret")
}

fn harness_with<E: TaskExecutor>(
    executor: E,
    store: Arc<MemoryStore>,
    config: BatchConfig,
    policies: EnginePolicies,
    probe: FixedProbe,
) -> Harness<E> {
    let dispatcher = RecordingDispatcher::new();
    let scheduler = ManualScheduler::new();
    let engine = BatchEngine::builder(executor, store.clone())
        .config(config)
        .dispatcher(Arc::new(dispatcher.clone()))
        .scheduler(Arc::new(scheduler.clone()))
        .memory_probe(Arc::new(probe))
        .policies(policies)
        .build()
        .unwrap();

    Harness {
        engine,
        store,
        dispatcher,
        scheduler,
    }
}

fn harness<E: TaskExecutor>(executor: E) -> Harness<E> {
    harness_with(
        executor,
        Arc::new(MemoryStore::new()),
        test_config(),
        EnginePolicies::default(),
        FixedProbe::default(),
    )
}

fn drain_events(rx: &mut broadcast::Receiver<BatchEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.event_name());
    }
    names
}

/// S1. Happy path: three tasks drained in order, queue completes
#[tokio::test]
async fn test_happy_path_drains_in_order_and_completes() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());
    let mut events = h.engine.subscribe();

    h.engine.push(1).unwrap().push(2).unwrap().push(3).unwrap();
    h.engine.save().await.unwrap().unwrap();
    h.engine.dispatch().await;

    assert!(h.scheduler.is_scheduled(h.engine.queue_id()));
    let trigger = h.dispatcher.take().pop().unwrap();
    assert_eq!(trigger.action.as_str(), "test_record");

    let outcome = h.engine.handle_trigger(trigger).await.unwrap();

    assert_eq!(outcome, DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![1, 2, 3]);
    assert_eq!(h.store.batch_count(), 0);
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::None);
    assert!(!h.engine.is_processing().await.unwrap());
    assert!(!h.scheduler.is_scheduled(h.engine.queue_id()));
    assert!(h.dispatcher.is_empty());
    assert_eq!(
        drain_events(&mut events),
        vec![
            "batch_saved",
            "process_locked",
            "batch_updated",
            "batch_updated",
            "batch_deleted",
            "process_unlocked",
            "completed",
        ]
    );
}

/// S2. Retry: kept task pauses the queue, health check retries, limit abandons it
#[tokio::test]
async fn test_retry_then_abandon_after_max_attempts() {
    let executor = AlwaysRetry::default();
    let h = harness_with(
        executor.clone(),
        Arc::new(MemoryStore::new()),
        test_config(),
        EnginePolicies::default().with_max_attempts(FixedMaxAttempts(2)),
        FixedProbe::default(),
    );

    h.engine.push("mail".to_string()).unwrap();
    h.engine.save().await.unwrap();
    h.engine.dispatch().await;
    let trigger = h.dispatcher.take().pop().unwrap();

    // Pass 1: attempt recorded, task kept, queue self-pauses
    let outcome = h.engine.handle_trigger(trigger).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Paused);
    let batch = h.engine.oldest_batch().await.unwrap().unwrap();
    assert_eq!(batch.items().values().next().unwrap().attempts, Some(1));
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::PausedWithTimeout);

    // Health check before the pause times out does nothing
    let early = h.scheduler.fire(h.engine.queue_id()).await.unwrap().unwrap();
    assert_eq!(early, DrainOutcome::Skipped);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

    // Pass 2 via health check once the timed pause is old enough
    StatusRegister::new(h.store.clone(), h.engine.queue_id().clone())
        .set_paused_at(Utc::now() - chrono::Duration::minutes(3))
        .await
        .unwrap();
    let outcome = h.scheduler.fire(h.engine.queue_id()).await.unwrap().unwrap();

    assert_eq!(outcome, DrainOutcome::Completed);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.engine.pending_batches().await.unwrap(), 0);
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::None);
}

/// S3. Cancel mid-queue: remaining batches deleted, nothing else runs
#[tokio::test]
async fn test_cancel_mid_queue_deletes_everything() {
    let store = Arc::new(MemoryStore::new());
    let queue_id = QueueId::derive("test", CancelAtThree::ACTION);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let executor = CancelAtThree {
        status: StatusRegister::new(store.clone(), queue_id.clone()),
        seen: seen.clone(),
    };
    let h = harness_with(executor, store, test_config(), EnginePolicies::default(), FixedProbe::default());
    let mut events = h.engine.subscribe();

    for batch in [[1, 2, 3, 4, 5], [6, 7, 8, 9, 10]] {
        for n in batch {
            h.engine.push(n).unwrap();
        }
        h.engine.save().await.unwrap();
    }
    h.engine.dispatch().await;

    let outcome = h.engine.handle_trigger(h.dispatcher.take().pop().unwrap()).await.unwrap();

    assert_eq!(outcome, DrainOutcome::Cancelled);
    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    assert_eq!(h.store.batch_count(), 0);
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::None);
    assert!(!h.scheduler.is_scheduled(&queue_id));
    assert!(drain_events(&mut events).contains(&"cancelled"));
}

/// S3c. A cancellation recorded during a kept task survives the self-pause
#[tokio::test]
async fn test_cancel_during_kept_task_is_not_overwritten() {
    let store = Arc::new(MemoryStore::new());
    let queue_id = QueueId::derive("test", CancelThenKeep::ACTION);
    let executor = CancelThenKeep {
        status: StatusRegister::new(store.clone(), queue_id.clone()),
    };
    let h = harness_with(executor, store, test_config(), EnginePolicies::default(), FixedProbe::default());

    h.engine.push(1).unwrap().push(2).unwrap();
    h.engine.save().await.unwrap();
    h.engine.dispatch().await;

    let outcome = h.engine.handle_trigger(h.dispatcher.take().pop().unwrap()).await.unwrap();

    assert_eq!(outcome, DrainOutcome::Cancelled);
    assert_eq!(h.engine.pending_batches().await.unwrap(), 0);
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::None);
    assert!(!h.engine.is_processing().await.unwrap());
}

/// S3d. Paused queue, then cancel(): the recorded trigger cleans up
#[tokio::test]
async fn test_cancel_of_paused_queue_deletes_everything() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());

    for n in [1, 2] {
        h.engine.push(n).unwrap();
        h.engine.save().await.unwrap();
    }
    h.engine.pause(false).await.unwrap();
    h.engine.cancel().await.unwrap();
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::Cancelled);

    let outcome = h.engine.handle_trigger(h.dispatcher.take().pop().unwrap()).await.unwrap();

    assert_eq!(outcome, DrainOutcome::Cancelled);
    assert!(recorder.seen.lock().is_empty());
    assert_eq!(h.store.batch_count(), 0);
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::None);
}

/// S3b. cancel() while idle dispatches and the next pass cleans up
#[tokio::test]
async fn test_cancel_api_dispatches_cleanup() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());

    h.engine.push(1).unwrap();
    h.engine.save().await.unwrap();
    h.engine.cancel().await.unwrap();
    h.engine.cancel().await.unwrap();

    assert!(h.engine.is_cancelled().await.unwrap());
    let triggers = h.dispatcher.take();
    assert_eq!(triggers.len(), 2);

    let outcome = h.engine.handle_trigger(triggers[0].clone()).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Cancelled);
    assert!(recorder.seen.lock().is_empty());
    assert!(!h.engine.is_queued().await.unwrap());

    let second = h.engine.handle_trigger(triggers[1].clone()).await.unwrap();
    assert_eq!(second, DrainOutcome::Declined(DeclineReason::Empty));
}

/// S4. Lock contention: a held lock declines the pass until it expires
#[test_log::test(tokio::test)]
async fn test_held_lock_declines_until_expiry() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());
    h.engine.push(1).unwrap();
    h.engine.save().await.unwrap();

    let foreign = ProcessLock::new(h.store.clone(), h.engine.queue_id().clone(), Duration::from_secs(60));
    foreign.acquire().await.unwrap();

    let trigger = h.engine.trigger_request(&TenantScope::default(), &h.engine.chain_id());
    let outcome = h.engine.handle_trigger(trigger.clone()).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Declined(DeclineReason::Locked));
    assert!(recorder.seen.lock().is_empty());

    h.store.force_flag_expiry(&h.engine.queue_id().lock_key());
    let outcome = h.engine.handle_trigger(trigger).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![1]);
}

/// S5. Multi-tenant: batches of a removed tenant are deleted, not run
#[tokio::test]
async fn test_inactive_tenant_batches_are_deleted() {
    let recorder = Recorder::default();
    let home = TenantScope::new("A");
    let gone = TenantScope::new("B");
    let dispatcher = RecordingDispatcher::new();
    let engine = BatchEngine::builder(recorder.clone(), Arc::new(MemoryStore::new()))
        .config(test_config().with_multi_tenant(home.clone()))
        .dispatcher(Arc::new(dispatcher.clone()))
        .scheduler(Arc::new(ManualScheduler::new()))
        .tenants(Arc::new(StaticTenants::new(["A"])))
        .memory_probe(Arc::new(FixedProbe::default()))
        .build()
        .unwrap();

    engine.push(1).unwrap();
    let key = engine.save_for(&gone).await.unwrap().unwrap();
    assert!(key.as_str().starts_with("test_record_batch_scope_B_"));

    let outcome = engine
        .handle_trigger(engine.trigger_request(&home, &engine.chain_id()))
        .await
        .unwrap();

    assert_eq!(outcome, DrainOutcome::Completed);
    assert!(recorder.seen.lock().is_empty());
    assert_eq!(engine.pending_batches().await.unwrap(), 0);
}

/// S5c. Deleting a removed tenant leaves tenants whose id extends it alone
#[tokio::test]
async fn test_removed_tenant_cleanup_spares_similarly_named_tenant() {
    let recorder = Recorder::default();
    let home = TenantScope::new("home");
    let dispatcher = RecordingDispatcher::new();
    let engine = BatchEngine::builder(recorder.clone(), Arc::new(MemoryStore::new()))
        .config(test_config().with_multi_tenant(home.clone()))
        .dispatcher(Arc::new(dispatcher.clone()))
        .scheduler(Arc::new(ManualScheduler::new()))
        .tenants(Arc::new(StaticTenants::new(["home", "site_2"])))
        .memory_probe(Arc::new(FixedProbe::default()))
        .build()
        .unwrap();

    engine.push(1).unwrap();
    engine.save_for(&TenantScope::new("site")).await.unwrap();
    engine.push(2).unwrap();
    engine.save_for(&TenantScope::new("site_2")).await.unwrap();

    let outcome = engine
        .handle_trigger(engine.trigger_request(&home, &engine.chain_id()))
        .await
        .unwrap();

    assert_eq!(outcome, DrainOutcome::HandedOff(TenantScope::new("site_2")));
    assert_eq!(engine.pending_batches().await.unwrap(), 1);
    assert!(recorder.seen.lock().is_empty());

    let handoff = dispatcher.take().pop().unwrap();
    assert_eq!(engine.handle_trigger(handoff).await.unwrap(), DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![2]);
}

/// S5b. Multi-tenant: batches of an active foreign tenant are handed off
#[tokio::test]
async fn test_active_foreign_tenant_is_handed_off() {
    let recorder = Recorder::default();
    let home = TenantScope::new("A");
    let other = TenantScope::new("C");
    let dispatcher = RecordingDispatcher::new();
    let engine = BatchEngine::builder(recorder.clone(), Arc::new(MemoryStore::new()))
        .config(test_config().with_multi_tenant(home.clone()))
        .dispatcher(Arc::new(dispatcher.clone()))
        .scheduler(Arc::new(ManualScheduler::new()))
        .tenants(Arc::new(StaticTenants::new(["A", "C"])))
        .memory_probe(Arc::new(FixedProbe::default()))
        .build()
        .unwrap();

    engine.push(9).unwrap();
    engine.save_for(&other).await.unwrap();

    let chain = engine.chain_id();
    let outcome = engine
        .handle_trigger(engine.trigger_request(&home, &chain))
        .await
        .unwrap();
    assert_eq!(outcome, DrainOutcome::HandedOff(other.clone()));
    assert!(recorder.seen.lock().is_empty());
    assert!(!engine.is_processing().await.unwrap());

    let handoff = dispatcher.take().pop().unwrap();
    assert_eq!(handoff.tenant, other);
    assert_eq!(handoff.chain_id, chain);

    let outcome = engine.handle_trigger(handoff).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![9]);
}

/// P1. Pause suppresses processing until resumed
#[tokio::test]
async fn test_pause_without_timeout_blocks_all_entry_points() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());
    h.engine.push(1).unwrap();
    h.engine.save().await.unwrap();
    h.engine.dispatch().await;
    let trigger = h.dispatcher.take().pop().unwrap();

    h.engine.pause(false).await.unwrap();
    h.engine.pause(false).await.unwrap();

    assert_eq!(h.engine.handle_trigger(trigger).await.unwrap(), DrainOutcome::Paused);
    assert_eq!(
        h.scheduler.fire(h.engine.queue_id()).await.unwrap().unwrap(),
        DrainOutcome::Skipped
    );
    assert!(recorder.seen.lock().is_empty());

    h.engine.resume(true).await.unwrap();
    h.engine.resume(false).await.unwrap();
    let resumed = h.dispatcher.take().pop().unwrap();
    assert_eq!(h.engine.handle_trigger(resumed).await.unwrap(), DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![1]);
}

/// P2. A fresh timed pause is honoured by triggers
#[tokio::test]
async fn test_fresh_timed_pause_declines_trigger() {
    let h = harness(Recorder::default());
    h.engine.push(1).unwrap();
    h.engine.save().await.unwrap();
    h.engine.pause(true).await.unwrap();

    let trigger = h.engine.trigger_request(&TenantScope::default(), &h.engine.chain_id());
    assert_eq!(h.engine.handle_trigger(trigger).await.unwrap(), DrainOutcome::Paused);
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::PausedWithTimeout);
}

/// P3. Exhausted time budget re-dispatches with the same chain id
#[tokio::test]
async fn test_time_budget_reschedules_with_same_chain() {
    let recorder = Recorder::default();
    let h = harness_with(
        recorder.clone(),
        Arc::new(MemoryStore::new()),
        test_config().with_time_budget(Duration::ZERO),
        EnginePolicies::default(),
        FixedProbe::default(),
    );
    h.engine.push(1).unwrap().push(2).unwrap();
    h.engine.save().await.unwrap();
    h.engine.dispatch().await;
    let first = h.dispatcher.take().pop().unwrap();

    assert_eq!(h.engine.handle_trigger(first.clone()).await.unwrap(), DrainOutcome::Rescheduled);
    assert_eq!(*recorder.seen.lock(), vec![1]);

    let second = h.dispatcher.take().pop().unwrap();
    assert_eq!(second.chain_id, first.chain_id);
    assert_eq!(h.engine.handle_trigger(second).await.unwrap(), DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![1, 2]);
}

/// P4. Memory pressure ends the pass after the current task
#[tokio::test]
async fn test_memory_threshold_yields() {
    let recorder = Recorder::default();
    let h = harness_with(
        recorder.clone(),
        Arc::new(MemoryStore::new()),
        test_config().with_memory_ceiling(100),
        EnginePolicies::default(),
        FixedProbe { used: Some(95), total: None },
    );
    h.engine.push(1).unwrap().push(2).unwrap();
    h.engine.save().await.unwrap();

    let trigger = h.engine.trigger_request(&TenantScope::default(), &h.engine.chain_id());
    assert_eq!(h.engine.handle_trigger(trigger).await.unwrap(), DrainOutcome::Rescheduled);
    assert_eq!(*recorder.seen.lock(), vec![1]);
}

/// P5. Custom continue condition is honoured
#[tokio::test]
async fn test_continue_condition_stops_pass() {
    let recorder = Recorder::default();
    let h = harness_with(
        recorder.clone(),
        Arc::new(MemoryStore::new()),
        test_config(),
        EnginePolicies::default().with_continue_condition(StopAlways),
        FixedProbe::default(),
    );
    h.engine.push(1).unwrap().push(2).unwrap().push(3).unwrap();
    h.engine.save().await.unwrap();

    let trigger = h.engine.trigger_request(&TenantScope::default(), &h.engine.chain_id());
    assert_eq!(h.engine.handle_trigger(trigger).await.unwrap(), DrainOutcome::Rescheduled);
    assert_eq!(*recorder.seen.lock(), vec![1]);

    let batch = h.engine.oldest_batch().await.unwrap().unwrap();
    assert_eq!(batch.items().keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert!(batch.record.is_touched());
}

/// P6. Health check disarms itself on an empty queue
#[tokio::test]
async fn test_health_check_unschedules_when_empty() {
    let h = harness(Recorder::default());
    h.engine.dispatch().await;
    assert!(h.scheduler.is_scheduled(h.engine.queue_id()));
    assert_eq!(
        h.scheduler.interval(h.engine.queue_id()),
        Some(Duration::from_secs(300))
    );

    let outcome = h.scheduler.fire(h.engine.queue_id()).await.unwrap().unwrap();
    assert_eq!(outcome, DrainOutcome::Unscheduled);
    assert!(!h.scheduler.is_scheduled(h.engine.queue_id()));
}

/// P7. Health check drains stuck batches without a trigger
#[tokio::test]
async fn test_health_check_drains_directly() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());
    h.engine.push(4).unwrap();
    h.engine.save().await.unwrap();
    h.engine.dispatch().await;
    h.dispatcher.take();

    let outcome = h.scheduler.fire(h.engine.queue_id()).await.unwrap().unwrap();
    assert_eq!(outcome, DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![4]);
    assert!(h.dispatcher.is_empty());
}

/// P8. Triggers with a forged nonce are rejected
#[tokio::test]
async fn test_forged_nonce_is_rejected() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());
    h.engine.push(1).unwrap();
    h.engine.save().await.unwrap();

    let mut trigger = h.engine.trigger_request(&TenantScope::default(), &h.engine.chain_id());
    trigger.nonce = "0".repeat(64);

    let err = h.engine.handle_trigger(trigger).await.unwrap_err();
    assert!(matches!(err, dog_batch::BatchError::InvalidNonce));
    assert!(recorder.seen.lock().is_empty());
}

/// P9. Undecodable payloads are dropped instead of wedging the queue
#[tokio::test]
async fn test_undecodable_payload_is_dropped() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());

    let items = [(0u64, Task::new(json!("not a number"))), (1, Task::new(json!(5)))]
        .into_iter()
        .collect();
    let key = BatchKey::generate(h.engine.queue_id(), None);
    h.store
        .insert(&key, BatchRecord::new(TenantScope::default(), items))
        .await
        .unwrap();

    let trigger = h.engine.trigger_request(&TenantScope::default(), &h.engine.chain_id());
    assert_eq!(h.engine.handle_trigger(trigger).await.unwrap(), DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![5]);
}

/// P10. Transport failures are logged, never fatal
#[tokio::test]
async fn test_dispatch_failure_is_not_fatal() {
    let engine = BatchEngine::builder(Recorder::default(), Arc::new(MemoryStore::new()))
        .config(test_config())
        .dispatcher(Arc::new(RecordingDispatcher::failing()))
        .scheduler(Arc::new(ManualScheduler::new()))
        .memory_probe(Arc::new(FixedProbe::default()))
        .build()
        .unwrap();

    engine.push(1).unwrap();
    engine.save().await.unwrap();
    engine.dispatch().await;
    engine.cancel().await.unwrap();

    assert!(engine.is_queued().await.unwrap());
}

/// P11. delete_all clears batches and status
#[tokio::test]
async fn test_delete_all_clears_state() {
    let h = harness(Recorder::default());
    for _ in 0..3 {
        h.engine.push(1).unwrap();
        h.engine.save().await.unwrap();
    }
    h.engine.pause(false).await.unwrap();
    assert_eq!(h.engine.queued_task_count().await.unwrap(), 3);

    assert_eq!(h.engine.delete_all().await.unwrap(), 3);
    assert_eq!(h.engine.pending_batches().await.unwrap(), 0);
    assert_eq!(h.engine.status().await.unwrap(), ProcessStatus::None);
}

/// Registry routes triggers by queue id and refuses duplicates
#[tokio::test]
async fn test_registry_routes_by_queue_id() {
    let recorder = Recorder::default();
    let h = harness(recorder.clone());
    let registry = dog_batch::EngineRegistry::new();

    registry.register(h.engine.clone()).unwrap();
    let duplicate = registry.register(h.engine.clone());
    assert!(matches!(
        duplicate,
        Err(dog_batch::BatchError::QueueAlreadyRegistered(_))
    ));
    assert_eq!(registry.queue_ids(), vec![QueueId::from("test_record")]);

    h.engine.push(7).unwrap();
    h.engine.save().await.unwrap();

    let request = h
        .engine
        .trigger_request(&TenantScope::default(), &h.engine.chain_id());
    let outcome = registry.handle_trigger(request).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Completed);
    assert_eq!(*recorder.seen.lock(), vec![7]);

    let mut stray = h
        .engine
        .trigger_request(&TenantScope::default(), &h.engine.chain_id());
    stray.action = QueueId::from("test_missing");
    assert!(matches!(
        registry.handle_trigger(stray).await,
        Err(dog_batch::BatchError::QueueNotRegistered(_))
    ));
}

/// Queues sharing one store keep their status, lock and batches apart
#[tokio::test]
async fn test_queues_on_shared_store_are_isolated() {
    let store = Arc::new(MemoryStore::new());
    let recorder = Recorder::default();
    let counter = Counter::default();
    let a = harness_with(recorder.clone(), store.clone(), test_config(), EnginePolicies::default(), FixedProbe::default());
    let b = harness_with(counter.clone(), store.clone(), test_config(), EnginePolicies::default(), FixedProbe::default());

    a.engine.push(1).unwrap();
    a.engine.save().await.unwrap();
    b.engine.push(10).unwrap();
    b.engine.save().await.unwrap();

    a.engine.pause(false).await.unwrap();
    let a_lock = ProcessLock::new(store.clone(), a.engine.queue_id().clone(), Duration::from_secs(60));
    a_lock.acquire().await.unwrap();

    assert_eq!(b.engine.status().await.unwrap(), ProcessStatus::None);
    assert!(a.engine.is_processing().await.unwrap());
    assert!(!b.engine.is_processing().await.unwrap());

    let trigger = b.engine.trigger_request(&TenantScope::default(), &b.engine.chain_id());
    assert_eq!(b.engine.handle_trigger(trigger).await.unwrap(), DrainOutcome::Completed);
    assert_eq!(*counter.seen.lock(), vec![10]);
    assert_eq!(a.engine.pending_batches().await.unwrap(), 1);

    b.engine.push(11).unwrap();
    b.engine.save().await.unwrap();
    a.engine.cancel().await.unwrap();
    a_lock.release().await.unwrap();

    let outcome = a.engine.handle_trigger(a.dispatcher.take().pop().unwrap()).await.unwrap();
    assert_eq!(outcome, DrainOutcome::Cancelled);
    assert!(recorder.seen.lock().is_empty());
    assert_eq!(a.engine.pending_batches().await.unwrap(), 0);
    assert_eq!(b.engine.pending_batches().await.unwrap(), 1);
    assert_eq!(b.engine.status().await.unwrap(), ProcessStatus::None);
}

/// The trigger's session context reaches the executor; health checks use the engine's own
#[tokio::test]
async fn test_trigger_context_reaches_executor() {
    let executor = SessionAware::default();
    let scheduler = ManualScheduler::new();
    let own_context = HashMap::from([("session".to_string(), "host".to_string())]);
    let engine = BatchEngine::builder(executor.clone(), Arc::new(MemoryStore::new()))
        .config(test_config())
        .dispatcher(Arc::new(RecordingDispatcher::new()))
        .scheduler(Arc::new(scheduler.clone()))
        .memory_probe(Arc::new(FixedProbe::default()))
        .trigger_context(own_context.clone())
        .build()
        .unwrap();

    engine.push(1).unwrap();
    engine.save().await.unwrap();
    let mut trigger = engine.trigger_request(&TenantScope::default(), &engine.chain_id());
    assert_eq!(trigger.context, own_context);
    trigger.context = HashMap::from([("session".to_string(), "abc".to_string())]);
    engine.handle_trigger(trigger).await.unwrap();

    engine.push(2).unwrap();
    engine.save().await.unwrap();
    assert_eq!(engine.health_check().await.unwrap(), DrainOutcome::Completed);

    let passes = executor.passes.lock().clone();
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].context["session"], "abc");
    assert_eq!(passes[1].context, own_context);
}
