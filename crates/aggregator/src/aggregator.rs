//! Windowed event aggregator.
//!
//! Producers enqueue through [`EventAggregator::add_event`], which never
//! blocks. A single collector task owns the receiving end of the intake
//! queue and the open batch. A batch closes when its window elapses or when
//! it reaches `max_batch_size`, and is then handed to a dispatch task so the
//! next window opens immediately.

use chrono::Utc;
use futures_util::future::join_all;
use gateway_core::Event;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use telemetry::{names, MetricsCollector};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::batch::{AggregatorStats, BatchStats, StatsRing};
use crate::config::AggregatorConfig;
use crate::handler::DeliveryHandler;

/// State shared between the aggregator handle and its tasks.
struct Shared {
    config: AggregatorConfig,
    metrics: Arc<MetricsCollector>,
    intake: mpsc::Sender<Event>,
    accepting: AtomicBool,
    batch_handler: RwLock<Option<Arc<dyn DeliveryHandler>>>,
    delivery_handlers: RwLock<Vec<Arc<dyn DeliveryHandler>>>,
    stats: Mutex<StatsRing>,
}

impl Shared {
    fn queue_len(&self) -> usize {
        self.intake.max_capacity() - self.intake.capacity()
    }
}

/// Running collector task.
struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<mpsc::Receiver<Event>>,
}

/// Batches accepted events and fans them out to handlers.
pub struct EventAggregator {
    shared: Arc<Shared>,
    receiver: Mutex<Option<mpsc::Receiver<Event>>>,
    worker: Mutex<Option<Worker>>,
}

impl EventAggregator {
    pub fn new(config: AggregatorConfig, metrics: Arc<MetricsCollector>) -> Self {
        let (intake, receiver) = mpsc::channel(config.max_queue_size.max(1));

        info!(
            window_ms = config.batch_window_ms,
            max_queue = config.max_queue_size,
            max_batch = config.max_batch_size,
            "Event aggregator initialized"
        );

        Self {
            shared: Arc::new(Shared {
                stats: Mutex::new(StatsRing::new(config.stats_history)),
                config,
                metrics,
                intake,
                accepting: AtomicBool::new(true),
                batch_handler: RwLock::new(None),
                delivery_handlers: RwLock::new(Vec::new()),
            }),
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.shared.config
    }

    /// Sets the single batch handler, run before the delivery handlers.
    pub fn set_batch_handler(&self, handler: Arc<dyn DeliveryHandler>) {
        *self.shared.batch_handler.write() = Some(handler);
    }

    /// Adds a fan-out delivery handler.
    pub fn add_delivery_handler(&self, handler: Arc<dyn DeliveryHandler>) {
        self.shared.delivery_handlers.write().push(handler);
    }

    /// Enqueues an event without blocking.
    ///
    /// Returns false, and counts a drop, when the intake queue is full or the
    /// aggregator has been stopped.
    pub fn add_event(&self, event: Event) -> bool {
        if !self.shared.accepting.load(Ordering::Acquire) {
            self.shared.metrics.increment(names::EVENTS_DROPPED);
            debug!("Aggregator stopped, dropping event");
            return false;
        }

        match self.shared.intake.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.shared.metrics.increment(names::EVENTS_DROPPED);
                warn!(queue_size = self.queue_len(), "Event queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.shared.metrics.increment(names::EVENTS_DROPPED);
                error!("Event queue closed, dropping event");
                false
            }
        }
    }

    /// Events waiting in the intake queue.
    pub fn queue_len(&self) -> usize {
        self.shared.queue_len()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Spawns the collector task.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            warn!("Aggregator already running");
            return;
        }

        let Some(receiver) = self.receiver.lock().take() else {
            error!("Aggregator intake receiver missing, cannot start");
            return;
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        self.shared.accepting.store(true, Ordering::Release);
        let handle = tokio::spawn(collect(self.shared.clone(), receiver, shutdown_rx));

        *worker = Some(Worker { shutdown, handle });
        info!("Event aggregator started");
    }

    /// Stops intake, flushes the queue as one final batch and waits for
    /// in-flight deliveries.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        info!("Stopping event aggregator...");
        self.shared.accepting.store(false, Ordering::Release);
        let _ = worker.shutdown.send(true);

        match worker.handle.await {
            Ok(receiver) => *self.receiver.lock() = Some(receiver),
            Err(e) => error!(error = %e, "Aggregator task failed"),
        }

        info!("Event aggregator stopped");
    }

    pub fn get_stats(&self) -> AggregatorStats {
        let running = self.is_running();
        self.shared.stats.lock().summary(self.queue_len(), running)
    }

    /// The retained per-batch stats, oldest first.
    pub fn recent_batches(&self) -> Vec<BatchStats> {
        self.shared.stats.lock().recent()
    }
}

/// Collector loop. Returns the receiver so the aggregator can be restarted.
async fn collect(
    shared: Arc<Shared>,
    mut receiver: mpsc::Receiver<Event>,
    mut shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<Event> {
    let window = shared.config.batch_window();
    let max_batch = shared.config.max_batch_size.max(1);
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
    let mut stopping = false;

    debug!("Batch collector started");

    while !stopping {
        let started = Instant::now();
        let deadline = started + window;
        let queue_size_at_start = shared.queue_len();
        shared
            .metrics
            .set_gauge(names::QUEUE_DEPTH, queue_size_at_start as f64);

        let mut events = Vec::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    stopping = true;
                    break;
                }
                _ = sleep_until(deadline) => break,
                received = receiver.recv() => match received {
                    Some(event) => {
                        events.push(event);
                        if events.len() >= max_batch {
                            debug!(max_batch, "Batch size limit reached");
                            break;
                        }
                    }
                    None => {
                        stopping = true;
                        break;
                    }
                },
            }
        }

        if stopping {
            while let Ok(event) = receiver.try_recv() {
                events.push(event);
            }
        }

        if events.is_empty() {
            continue;
        }

        let event_count = events.len();
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(tokio::spawn(dispatch(shared.clone(), events)));

        let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        record_batch(&shared, event_count, processing_time_ms, queue_size_at_start);
    }

    in_flight.retain(|handle| !handle.is_finished());
    let drain_timeout = shared.config.drain_timeout();
    let drained = timeout(drain_timeout, join_all(in_flight.iter_mut())).await;
    match drained {
        Ok(results) => {
            for e in results.into_iter().filter_map(|r| r.err()) {
                error!(error = %e, "Batch dispatch task failed");
            }
        }
        Err(_) => {
            let outstanding = in_flight.iter().filter(|h| !h.is_finished()).count();
            warn!(
                outstanding,
                timeout_ms = shared.config.drain_timeout_ms,
                "Deliveries still running after drain timeout, detaching"
            );
        }
    }

    debug!("Batch collector stopped");
    receiver
}

fn record_batch(
    shared: &Shared,
    event_count: usize,
    processing_time_ms: f64,
    queue_size_at_start: usize,
) {
    let metrics = &shared.metrics;
    metrics.increment(names::BATCHES_DISPATCHED);
    metrics.observe(names::BATCH_SIZE, event_count as f64);
    metrics.observe(names::BATCH_PROCESSING_MS, processing_time_ms);

    let mut stats = shared.stats.lock();
    let batch_id = stats.next_batch_id();

    if processing_time_ms > shared.config.slow_batch_threshold_ms() {
        metrics.increment(names::SLOW_BATCHES);
        warn!(
            batch_id = %batch_id,
            processing_time_ms,
            window_ms = shared.config.batch_window_ms,
            "Batch processing exceeded target window"
        );
    }

    stats.record(BatchStats {
        batch_id,
        event_count,
        processing_time_ms,
        queue_size_at_start,
        timestamp: Utc::now(),
    });
}

/// Runs the batch handler, then every delivery handler concurrently.
async fn dispatch(shared: Arc<Shared>, events: Vec<Event>) {
    let batch: Arc<[Event]> = events.into();
    let started = Instant::now();

    let batch_handler = shared.batch_handler.read().clone();
    if let Some(handler) = batch_handler {
        deliver_isolated(&shared.metrics, handler, batch.clone()).await;
    }

    let handlers = shared.delivery_handlers.read().clone();
    if !handlers.is_empty() {
        join_all(
            handlers
                .into_iter()
                .map(|handler| deliver_isolated(&shared.metrics, handler, batch.clone())),
        )
        .await;
    }

    debug!(
        events = batch.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Processed batch"
    );
}

/// Runs one handler in its own task; errors and panics are logged and counted.
async fn deliver_isolated(
    metrics: &MetricsCollector,
    handler: Arc<dyn DeliveryHandler>,
    batch: Arc<[Event]>,
) {
    let name = handler.name().to_string();
    let started = Instant::now();

    let outcome = tokio::spawn(async move { handler.deliver(batch).await }).await;

    let labels = [("handler", name.as_str())];
    metrics.increment_with(names::DELIVERIES, &labels, 1);
    metrics.observe_with(
        names::DELIVERY_MS,
        &labels,
        started.elapsed().as_secs_f64() * 1000.0,
    );

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            metrics.increment_with(names::DELIVERY_ERRORS, &labels, 1);
            error!(handler = %name, error = %e, "Handler error");
        }
        Err(e) => {
            metrics.increment_with(names::DELIVERY_ERRORS, &labels, 1);
            error!(handler = %name, error = %e, "Handler task failed");
        }
    }
}
