//! In-process request/reply bus.
//!
//! # Responsibilities
//! - Register one consumer inbox per address
//! - Deliver requests and route exactly one reply back to the requester
//! - Surface missing consumers and unanswered requests as channel errors

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::channel::{ChannelError, MessageChannel};

/// Pending requests buffered per consumer before senders wait.
pub const DEFAULT_INBOX_CAPACITY: usize = 1024;

/// A request delivered to a consumer.
#[derive(Debug)]
pub struct Message {
    address: String,
    body: Value,
    reply_to: oneshot::Sender<Result<Value, ChannelError>>,
}

impl Message {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Answer with a payload. Returns false if the requester already gave up.
    pub fn reply(self, body: Value) -> bool {
        self.respond(Ok(body))
    }

    /// Answer with an explicit failure. Returns false if the requester already gave up.
    pub fn fail(self, code: i32, message: impl Into<String>) -> bool {
        self.respond(Err(ChannelError::Failure {
            code,
            message: message.into(),
        }))
    }

    fn respond(self, result: Result<Value, ChannelError>) -> bool {
        match self.reply_to.send(result) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(address = %self.address, "Discarding late reply, requester is gone");
                false
            }
        }
    }
}

/// Receiving end registered at one address.
#[derive(Debug)]
pub struct Consumer {
    address: String,
    inbox: mpsc::Receiver<Message>,
}

impl Consumer {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Next request, or `None` once the consumer was replaced or unregistered.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    /// Answer every request with `handler` until shutdown.
    ///
    /// Each request is handled on its own task so a slow reply never blocks
    /// the inbox.
    pub async fn serve<F, Fut>(mut self, handler: F, mut shutdown: broadcast::Receiver<()>)
    where
        F: Fn(Value) -> Fut,
        Fut: Future<Output = Result<Value, ChannelError>> + Send + 'static,
    {
        tracing::info!(address = %self.address, "Consumer serving");
        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    let Some(message) = message else { break };
                    let reply = handler(message.body.clone());
                    tokio::spawn(async move {
                        let result = reply.await;
                        message.respond(result);
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!(address = %self.address, "Consumer received shutdown signal");
                    break;
                }
            }
        }
    }
}

/// Point-to-point bus keyed by address.
#[derive(Debug, Clone)]
pub struct LocalBus {
    consumers: Arc<DashMap<String, mpsc::Sender<Message>>>,
    inbox_capacity: usize,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_capacity(inbox_capacity: usize) -> Self {
        Self {
            consumers: Arc::new(DashMap::new()),
            inbox_capacity: inbox_capacity.max(1),
        }
    }

    /// Register a consumer at `address`, replacing any previous one.
    pub fn consumer(&self, address: impl Into<String>) -> Consumer {
        let address = address.into();
        let (tx, inbox) = mpsc::channel(self.inbox_capacity);
        if self.consumers.insert(address.clone(), tx).is_some() {
            tracing::warn!(address = %address, "Replacing existing consumer");
        } else {
            tracing::debug!(address = %address, "Consumer registered");
        }
        Consumer { address, inbox }
    }

    /// Remove the consumer at `address`; its inbox then drains to `None`.
    pub fn unregister(&self, address: &str) -> bool {
        self.consumers.remove(address).is_some()
    }

    /// True if a live consumer listens at `address`.
    pub fn has_consumer(&self, address: &str) -> bool {
        self.consumers
            .get(address)
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageChannel for LocalBus {
    async fn request(&self, address: &str, payload: Value) -> Result<Value, ChannelError> {
        let sender = self
            .consumers
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ChannelError::NoConsumer(address.to_string()))?;

        let (reply_to, reply) = oneshot::channel();
        let message = Message {
            address: address.to_string(),
            body: payload,
            reply_to,
        };

        if sender.send(message).await.is_err() {
            self.consumers.remove_if(address, |_, tx| tx.is_closed());
            return Err(ChannelError::NoConsumer(address.to_string()));
        }

        reply
            .await
            .map_err(|_| ChannelError::Dropped(address.to_string()))?
    }
}
