//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use service_dispatch::channel::{LocalBus, Message};
use service_dispatch::client::ClientFactory;
use service_dispatch::config::{parse_config, GatewayConfig};
use service_dispatch::dispatch::Dispatcher;
use service_dispatch::http::HttpServer;

/// How a programmable backend answers.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Reply with `{"echo": payload}`.
    Echo,
    /// Fail every request with this message.
    Fail(String),
    /// Hold every request unanswered until released.
    Silent,
}

/// Backend consumer whose behavior can change mid-test.
#[derive(Clone)]
pub struct Backend {
    calls: Arc<AtomicUsize>,
    mode: Arc<Mutex<Mode>>,
    held: Arc<Mutex<Vec<Message>>>,
}

impl Backend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    /// Answer every held request with `body`. Returns how many requesters
    /// were still waiting.
    pub fn release(&self, body: Value) -> usize {
        let held: Vec<Message> = self.held.lock().drain(..).collect();
        held.into_iter()
            .map(|message| message.reply(body.clone()))
            .filter(|delivered| *delivered)
            .count()
    }

    /// Wait until the backend has seen `n` requests.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

/// Register a programmable backend at `address`.
pub fn spawn_backend(bus: &LocalBus, address: &str, mode: Mode) -> Backend {
    let backend = Backend {
        calls: Arc::new(AtomicUsize::new(0)),
        mode: Arc::new(Mutex::new(mode)),
        held: Arc::new(Mutex::new(Vec::new())),
    };
    let mut consumer = bus.consumer(address);
    let handle = backend.clone();

    tokio::spawn(async move {
        while let Some(message) = consumer.recv().await {
            handle.calls.fetch_add(1, Ordering::SeqCst);
            let mode = handle.mode.lock().clone();
            match mode {
                Mode::Echo => {
                    let body = message.body().clone();
                    message.reply(json!({ "echo": body }));
                }
                Mode::Fail(reason) => {
                    message.fail(500, reason);
                }
                Mode::Silent => handle.held.lock().push(message),
            }
        }
    });

    backend
}

/// Factory and dispatcher over a fresh bus, configured from TOML.
pub struct Harness {
    pub bus: LocalBus,
    pub config: Arc<GatewayConfig>,
    pub factory: Arc<ClientFactory>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new(config_toml: &str) -> Self {
        Self::from_config(parse_config(config_toml).expect("valid test config"))
    }

    /// Build from an already assembled config, skipping validation.
    pub fn from_config(config: GatewayConfig) -> Self {
        let config = Arc::new(config);
        let bus = LocalBus::new();
        let factory = Arc::new(ClientFactory::new(Arc::clone(&config), Arc::new(bus.clone())));
        let dispatcher = Dispatcher::new(Arc::clone(&factory));
        Self {
            bus,
            config,
            factory,
            dispatcher,
        }
    }

    pub fn router(&self) -> axum::Router {
        HttpServer::new(&self.config, self.dispatcher.clone()).router()
    }
}
