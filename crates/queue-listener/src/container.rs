//! Listener container: registration, lifecycle, and shutdown.

use crate::acknowledgement::{spawn_delete_flusher, AckResolver, DeleteBuffer};
use crate::config::{to_std, ListenerConfig, QueueNotFoundStrategy};
use crate::dispatcher::{ConcurrencyLimiter, SharedSlots};
use crate::error::{log_error_sink, ErrorSink, ListenerError};
use crate::handler::Handler;
use crate::inflight::InFlightTracker;
use crate::invoker::HandlerInvoker;
use crate::source::QueueWorker;
use queue_client::{QueueClient, QueueName};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;

// ============================================================================
// Container state
// ============================================================================

/// Lifecycle state of a [`ListenerContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Built but never started
    Created,
    /// Workers polling and processing
    Running,
    /// Stop requested, draining in-flight work
    Stopping,
    /// Fully stopped; terminal
    Stopped,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// Builder
// ============================================================================

struct Registration {
    queue: QueueName,
    config: ListenerConfig,
    handler: Handler,
}

/// Builder assembling queue registrations into a [`ListenerContainer`].
pub struct ListenerContainerBuilder {
    client: Arc<dyn QueueClient>,
    registrations: Vec<Registration>,
    global_max_concurrent_messages: Option<usize>,
    error_sink: ErrorSink,
}

impl ListenerContainerBuilder {
    /// Start a builder over the given queue client
    pub fn new(client: Arc<dyn QueueClient>) -> Self {
        Self {
            client,
            registrations: Vec::new(),
            global_max_concurrent_messages: None,
            error_sink: log_error_sink(),
        }
    }

    /// Register a queue with its configuration and handler
    pub fn register(mut self, queue: QueueName, config: ListenerConfig, handler: Handler) -> Self {
        self.registrations.push(Registration {
            queue,
            config,
            handler,
        });
        self
    }

    /// Cap concurrent in-flight messages across all registered queues
    pub fn with_global_max_concurrent_messages(mut self, max: usize) -> Self {
        self.global_max_concurrent_messages = Some(max);
        self
    }

    /// Replace the default logging error sink
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = sink;
        self
    }

    /// Validate every registration and produce the container
    pub fn build(self) -> Result<ListenerContainer, ListenerError> {
        if self.registrations.is_empty() {
            return Err(ListenerError::Config(crate::error::ConfigError::Missing {
                message: "at least one queue registration is required".to_string(),
            }));
        }

        if let Some(0) = self.global_max_concurrent_messages {
            return Err(ListenerError::Config(
                crate::error::ConfigError::OutOfRange {
                    field: "global_max_concurrent_messages".to_string(),
                    message: "must be at least 1".to_string(),
                },
            ));
        }

        for registration in &self.registrations {
            registration.config.validate()?;
        }

        let (shutdown_tx, _) = watch::channel(false);
        Ok(ListenerContainer {
            client: self.client,
            registrations: self.registrations,
            global_max_concurrent_messages: self.global_max_concurrent_messages,
            error_sink: self.error_sink,
            state: Mutex::new(ContainerState::Created),
            shutdown_tx,
            workers: Mutex::new(JoinSet::new()),
            flushers: Mutex::new(Vec::new()),
            tracker: InFlightTracker::new(),
        })
    }
}

// ============================================================================
// Container
// ============================================================================

/// Owns the queue workers for all registered queues and drives their
/// shared lifecycle.
///
/// `start` verifies each queue per its not-found strategy, then spawns one
/// polling worker and one delete flusher per queue. `stop` signals every
/// worker, waits out the longest configured shutdown window, and abandons
/// whatever is still in flight.
pub struct ListenerContainer {
    client: Arc<dyn QueueClient>,
    registrations: Vec<Registration>,
    global_max_concurrent_messages: Option<usize>,
    error_sink: ErrorSink,
    state: Mutex<ContainerState>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<JoinSet<()>>,
    flushers: Mutex<Vec<JoinHandle<()>>>,
    tracker: Arc<InFlightTracker>,
}

impl ListenerContainer {
    /// Builder entry point
    pub fn builder(client: Arc<dyn QueueClient>) -> ListenerContainerBuilder {
        ListenerContainerBuilder::new(client)
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ContainerState {
        *self.state.lock().await
    }

    /// Number of messages currently being processed across all queues
    pub fn in_flight_count(&self) -> usize {
        self.tracker.count()
    }

    /// Start polling every registered queue.
    ///
    /// Fails without spawning anything if the container is not freshly
    /// created, or if a queue with the `Fail` strategy does not exist.
    /// The container stays `Created` on failure and may not be restarted
    /// after a stop.
    pub async fn start(&self) -> Result<(), ListenerError> {
        let mut state = self.state.lock().await;
        if *state != ContainerState::Created {
            return Err(ListenerError::InvalidState {
                expected: ContainerState::Created.to_string(),
                actual: state.to_string(),
            });
        }

        // Resolve queue existence up front so a misconfigured queue fails
        // the whole start instead of surfacing later as poll errors
        let mut skipped: Vec<QueueName> = Vec::new();
        for registration in &self.registrations {
            let queue = &registration.queue;
            let exists = self.client.queue_exists(queue).await?;
            if exists {
                continue;
            }

            match registration.config.queue_not_found_strategy {
                QueueNotFoundStrategy::Fail => {
                    error!(queue = %queue, "queue not found, refusing to start");
                    return Err(ListenerError::QueueNotFound {
                        queue: queue.to_string(),
                    });
                }
                QueueNotFoundStrategy::Create => {
                    info!(queue = %queue, "queue not found, creating");
                    self.client.create_queue(queue).await?;
                }
                QueueNotFoundStrategy::Ignore => {
                    warn!(queue = %queue, "queue not found, listener will idle");
                    skipped.push(queue.clone());
                }
            }
        }

        let global = self.global_max_concurrent_messages.map(SharedSlots::new);

        let mut workers = self.workers.lock().await;
        let mut flushers = self.flushers.lock().await;
        for registration in &self.registrations {
            let queue = registration.queue.clone();
            let config = registration.config.clone();

            let queue_attributes = if skipped.contains(&queue) {
                HashMap::new()
            } else {
                self.fetch_queue_attributes(&queue, &config).await
            };

            let batch_size = config
                .delete_batch_size
                .min(self.client.max_delete_batch_size());
            let buffer = DeleteBuffer::new(batch_size);
            flushers.push(spawn_delete_flusher(
                Arc::clone(&self.client),
                queue.clone(),
                Arc::clone(&buffer),
                config.delete_flush_interval,
                config.operation_retry.clone(),
                self.error_sink.clone(),
            ));

            let resolver = Arc::new(AckResolver::new(
                Arc::clone(&self.client),
                queue.clone(),
                config.retry.clone(),
                config.operation_retry.clone(),
                config.visibility_timeout,
                Arc::clone(&buffer),
                self.error_sink.clone(),
            ));

            let worker = QueueWorker {
                queue: queue.clone(),
                invoker: HandlerInvoker::new(
                    registration.handler.clone(),
                    to_std(config.handler_timeout),
                ),
                limiter: ConcurrencyLimiter::new(
                    config.max_concurrent_messages,
                    global.clone(),
                ),
                client: Arc::clone(&self.client),
                resolver,
                buffer,
                tracker: Arc::clone(&self.tracker),
                queue_attributes,
                shutdown: self.shutdown_tx.subscribe(),
                error_sink: self.error_sink.clone(),
                config,
            };

            workers.spawn(worker.run());
        }

        *state = ContainerState::Running;
        info!(queues = self.registrations.len(), "listener container started");
        Ok(())
    }

    /// Stop all workers, draining in-flight work within the configured
    /// shutdown windows.
    ///
    /// Idempotent; a stop on a never-started container just transitions
    /// to `Stopped`.
    pub async fn stop(&self) -> Result<(), ListenerError> {
        {
            let mut state = self.state.lock().await;
            match *state {
                ContainerState::Stopping | ContainerState::Stopped => return Ok(()),
                ContainerState::Created => {
                    *state = ContainerState::Stopped;
                    return Ok(());
                }
                ContainerState::Running => {
                    *state = ContainerState::Stopping;
                }
            }
        }

        info!("listener container stopping");
        // Receivers may already be gone if all workers failed out
        let _ = self.shutdown_tx.send(true);

        // Each worker bounds its own drain by its shutdown window; allow on
        // top of the longest one the acknowledgement retry budget, since a
        // resolver may still be backing off when the window closes
        let window = self
            .registrations
            .iter()
            .map(|r| {
                to_std(r.config.shutdown_timeout) + r.config.operation_retry.max_total_delay()
            })
            .max()
            .unwrap_or_default();

        let mut workers = self.workers.lock().await;
        let drained = tokio::time::timeout(window, async {
            while workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(remaining = workers.len(), "shutdown window elapsed, aborting workers");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        // Workers closed their delete buffers on exit; let each flusher
        // finish its final flush, which may retry deletes through the
        // queue's full operation backoff budget
        let mut flushers = self.flushers.lock().await;
        for (registration, mut flusher) in self.registrations.iter().zip(flushers.drain(..)) {
            let flush_window = to_std(registration.config.shutdown_timeout)
                + registration.config.operation_retry.max_total_delay()
                + registration.config.delete_flush_interval;
            let finished = tokio::time::timeout(flush_window, &mut flusher).await;
            if finished.is_err() {
                warn!(
                    queue = %registration.queue,
                    "delete flusher did not finish its final flush in time"
                );
                flusher.abort();
            }
        }

        *self.state.lock().await = ContainerState::Stopped;
        info!("listener container stopped");
        Ok(())
    }

    /// Fetch the configured queue attributes at startup; failures downgrade
    /// to a warning since attributes only enrich messages
    async fn fetch_queue_attributes(
        &self,
        queue: &QueueName,
        config: &ListenerConfig,
    ) -> HashMap<String, String> {
        if config.queue_attribute_names.is_empty() {
            return HashMap::new();
        }

        match self
            .client
            .queue_attributes(queue, &config.queue_attribute_names)
            .await
        {
            Ok(attributes) => {
                debug!(
                    queue = %queue,
                    count = attributes.len(),
                    "fetched queue attributes"
                );
                attributes
            }
            Err(error) => {
                warn!(queue = %queue, error = %error, "failed to fetch queue attributes");
                HashMap::new()
            }
        }
    }
}
