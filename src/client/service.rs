//! Breaker-guarded client for one backend service.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::channel::{ChannelError, MessageChannel};
use crate::client::descriptor::ServiceDescriptor;
use crate::dispatch::envelope::RequestEnvelope;
use crate::dispatch::error::{DispatchError, DispatchResult};
use crate::resilience::{BreakerError, CircuitBreaker, StateChange};

/// One circuit breaker bound to one channel address.
pub struct ServiceClient {
    descriptor: ServiceDescriptor,
    breaker: CircuitBreaker,
    channel: Arc<dyn MessageChannel>,
}

impl ServiceClient {
    pub fn new(
        descriptor: ServiceDescriptor,
        channel: Arc<dyn MessageChannel>,
        events: broadcast::Sender<StateChange>,
    ) -> Self {
        let breaker = CircuitBreaker::with_notifier(
            descriptor.name.clone(),
            descriptor.breaker.clone(),
            events,
        );
        Self {
            descriptor,
            breaker,
            channel,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn address(&self) -> &str {
        &self.descriptor.address
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Send `envelope` and await one reply inside the breaker.
    ///
    /// The reply payload is returned as-is. No retries.
    pub async fn send_request(&self, envelope: &RequestEnvelope) -> DispatchResult<Value> {
        let payload = envelope.to_payload();
        let channel = &self.channel;
        let address = self.descriptor.address.as_str();
        let fallback = &self.descriptor.fallback;

        tracing::trace!(service = %self.name(), address = %address, "Sending request");

        self.breaker
            .execute_with_fallback(
                || channel.request(address, payload),
                |_| fallback.clone().unwrap_or(Value::Null),
            )
            .await
            .map_err(|e| self.classify(e))
    }

    fn classify(&self, error: BreakerError<ChannelError>) -> DispatchError {
        let service = self.name().to_string();
        match error {
            BreakerError::Open => DispatchError::CircuitOpen { service },
            BreakerError::Timeout(timeout) => DispatchError::Timeout {
                service,
                timeout_ms: timeout.as_millis() as u64,
            },
            BreakerError::Failed(e) => DispatchError::Backend {
                service,
                message: e.to_string(),
            },
        }
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("descriptor", &self.descriptor)
            .field("breaker", &self.breaker)
            .finish()
    }
}
