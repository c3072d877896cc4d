//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the message bus, discovery and client factory from config
//! - Register in-process echo consumers for local testing, removed again on shutdown
//! - Assemble the HTTP front door
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use serde_json::{json, Value};

use crate::channel::LocalBus;
use crate::client::ClientFactory;
use crate::config::GatewayConfig;
use crate::discovery::InMemoryDiscovery;
use crate::dispatch::Dispatcher;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;

/// Wired-up gateway, ready to be bound to a listener.
pub struct Gateway {
    pub bus: LocalBus,
    pub factory: Arc<ClientFactory>,
    pub server: HttpServer,
}

/// Build every subsystem from `config`.
///
/// Each name in `echo_services` gets a consumer at its resolved address that
/// answers `{"service": name, "request": payload}`.
pub async fn assemble(
    config: Arc<GatewayConfig>,
    echo_services: &[String],
    shutdown: &Shutdown,
) -> Gateway {
    let bus = LocalBus::new();

    let mut factory = ClientFactory::new(Arc::clone(&config), Arc::new(bus.clone()));
    if config.discovery.enabled {
        let discovery = InMemoryDiscovery::from_records(config.discovery.records.clone());
        tracing::info!(records = discovery.count().await, "Service discovery enabled");
        factory = factory.with_discovery(Arc::new(discovery));
    }
    let factory = Arc::new(factory);

    for service in echo_services {
        let address = factory.resolve_address(service).await;
        let consumer = bus.consumer(address.clone());
        let name = service.clone();
        tracing::info!(service = %name, address = %address, "Echo consumer registered");
        let handler = move |payload: Value| {
            let name = name.clone();
            async move { Ok(json!({ "service": name, "request": payload })) }
        };
        let shutdown_rx = shutdown.subscribe();
        let registry = bus.clone();
        tokio::spawn(async move {
            consumer.serve(handler, shutdown_rx).await;
            registry.unregister(&address);
        });
    }

    let server = HttpServer::new(&config, Dispatcher::new(Arc::clone(&factory)));
    tracing::info!(
        routes = config.routes.len(),
        services = config.services.len(),
        "Gateway assembled"
    );

    Gateway {
        bus,
        factory,
        server,
    }
}
