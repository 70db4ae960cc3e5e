//! Deadline-bounded handler invocation.

use crate::handler::{BatchDisposition, Handler, Outcome};
use queue_client::ReceivedMessage;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[cfg(test)]
#[path = "invoker_tests.rs"]
mod tests;

/// Invokes the registered handler and captures success, failure, or timeout
/// as an [`Outcome`] per message.
///
/// Handler errors are captured, never propagated; a handler exceeding the
/// deadline has its future dropped, so a late result cannot reach the
/// acknowledgment pipeline.
#[derive(Clone)]
pub struct HandlerInvoker {
    handler: Handler,
    timeout: Duration,
}

impl HandlerInvoker {
    /// Create an invoker for a registered handler with the given deadline
    pub fn new(handler: Handler, timeout: Duration) -> Self {
        Self { handler, timeout }
    }

    /// The handler shape this invoker drives
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Invoke a single-message handler, producing one outcome.
    ///
    /// Must only be called when the registered handler is single-shaped.
    pub async fn invoke_single(&self, message: &ReceivedMessage) -> Outcome {
        let Handler::Single(handler) = &self.handler else {
            return Outcome::failure(anyhow::anyhow!(
                "batch handler registered where a single-message handler was expected"
            ));
        };

        match tokio::time::timeout(self.timeout, handler.handle(message)).await {
            Ok(Ok(())) => Outcome::Success,
            Ok(Err(cause)) => Outcome::failure(cause),
            Err(_) => {
                warn!(
                    message_id = %message.message_id,
                    timeout = ?self.timeout,
                    "handler invocation exceeded deadline"
                );
                Outcome::Timeout
            }
        }
    }

    /// Invoke a batch handler, producing one outcome per message in batch order.
    ///
    /// A deadline elapse times out the whole batch. A `PerMessage` disposition
    /// shorter than the batch is a handler contract violation; the uncovered
    /// messages are treated as failed.
    pub async fn invoke_batch(&self, messages: &[ReceivedMessage]) -> Vec<Outcome> {
        let Handler::Batch(handler) = &self.handler else {
            let cause = Arc::new(anyhow::anyhow!(
                "single-message handler registered where a batch handler was expected"
            ));
            return messages
                .iter()
                .map(|_| Outcome::Failure(cause.clone()))
                .collect();
        };

        match tokio::time::timeout(self.timeout, handler.handle_batch(messages)).await {
            Ok(BatchDisposition::AllOf(Ok(()))) => {
                vec![Outcome::Success; messages.len()]
            }
            Ok(BatchDisposition::AllOf(Err(cause))) => {
                let cause = Arc::new(cause);
                messages
                    .iter()
                    .map(|_| Outcome::Failure(cause.clone()))
                    .collect()
            }
            Ok(BatchDisposition::PerMessage(results)) => {
                if results.len() != messages.len() {
                    warn!(
                        results = results.len(),
                        messages = messages.len(),
                        "batch handler returned wrong number of results"
                    );
                }

                let mut outcomes: Vec<Outcome> = results
                    .into_iter()
                    .take(messages.len())
                    .map(|result| match result {
                        Ok(()) => Outcome::Success,
                        Err(cause) => Outcome::failure(cause),
                    })
                    .collect();

                while outcomes.len() < messages.len() {
                    outcomes.push(Outcome::failure(anyhow::anyhow!(
                        "batch handler returned no result for this message"
                    )));
                }

                outcomes
            }
            Err(_) => {
                warn!(
                    batch_len = messages.len(),
                    timeout = ?self.timeout,
                    "batch handler invocation exceeded deadline"
                );
                vec![Outcome::Timeout; messages.len()]
            }
        }
    }
}
