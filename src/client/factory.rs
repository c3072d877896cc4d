//! Client factory and per-process client cache.
//!
//! # Responsibilities
//! - Build at most one [`ServiceClient`] per logical service name
//! - Resolve the address: discovery, then static config, then `service.<name>`
//! - Bound each discovery lookup by `discovery.timeout_ms`
//! - Fan every breaker's transitions into one notification stream
//!
//! # Design Decisions
//! - Each cache slot is an async once-cell, so concurrent first requests
//!   for a name wait on a single construction
//! - Entries live for the process lifetime

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{broadcast, OnceCell};
use tokio::time;

use crate::channel::MessageChannel;
use crate::client::descriptor::ServiceDescriptor;
use crate::client::service::ServiceClient;
use crate::config::schema::default_address;
use crate::config::GatewayConfig;
use crate::discovery::ServiceDiscovery;
use crate::observability::metrics;
use crate::resilience::{BreakerSnapshot, StateChange};

/// Capacity of the shared state-change channel.
const EVENT_CAPACITY: usize = 256;

type ClientSlot = Arc<OnceCell<Arc<ServiceClient>>>;

/// Creates and caches service clients by name.
pub struct ClientFactory {
    config: Arc<GatewayConfig>,
    channel: Arc<dyn MessageChannel>,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    clients: DashMap<String, ClientSlot>,
    events: broadcast::Sender<StateChange>,
}

impl ClientFactory {
    pub fn new(config: Arc<GatewayConfig>, channel: Arc<dyn MessageChannel>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            channel,
            discovery: None,
            clients: DashMap::new(),
            events,
        }
    }

    /// Consult `discovery` before static addresses.
    pub fn with_discovery(mut self, discovery: Arc<dyn ServiceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Client for `name`, created on first use.
    pub async fn get_client(&self, name: &str) -> Arc<ServiceClient> {
        if let Some(client) = self
            .clients
            .get(name)
            .and_then(|slot| slot.value().get().cloned())
        {
            return client;
        }

        // Clone the slot out so no map shard lock is held across the await.
        let slot = Arc::clone(&self.clients.entry(name.to_string()).or_default());
        let client = slot.get_or_init(|| self.create(name)).await;
        Arc::clone(client)
    }

    async fn create(&self, name: &str) -> Arc<ServiceClient> {
        let address = self.resolve_address(name).await;
        let descriptor = ServiceDescriptor::from_config(name, address, &self.config.service(name));

        tracing::info!(
            service = %name,
            address = %descriptor.address,
            max_failures = descriptor.breaker.max_failures,
            timeout_ms = descriptor.breaker.timeout.as_millis() as u64,
            reset_timeout_ms = descriptor.breaker.reset_timeout.as_millis() as u64,
            "Service client created"
        );
        metrics::record_client_created(name);

        Arc::new(ServiceClient::new(
            descriptor,
            Arc::clone(&self.channel),
            self.events.clone(),
        ))
    }

    /// Address `name` resolves to: discovery, then config, then `service.<name>`.
    pub async fn resolve_address(&self, name: &str) -> String {
        if let Some(discovery) = &self.discovery {
            let bound = Duration::from_millis(self.config.discovery.timeout_ms);
            match time::timeout(bound, discovery.lookup(name)).await {
                Ok(Ok(address)) if !address.trim().is_empty() => return address,
                Ok(Ok(_)) => {
                    tracing::debug!(service = %name, "Discovery returned an empty address, falling back")
                }
                Ok(Err(e)) => {
                    tracing::debug!(service = %name, error = %e, "Discovery lookup failed, falling back")
                }
                Err(_) => {
                    tracing::debug!(
                        service = %name,
                        timeout_ms = self.config.discovery.timeout_ms,
                        "Discovery lookup timed out, falling back"
                    )
                }
            }
        }

        self.config
            .services
            .get(name)
            .and_then(|service| service.address.clone())
            .unwrap_or_else(|| default_address(name))
    }

    /// Transitions of every breaker this factory creates.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Snapshots of all constructed clients, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> = self
            .clients
            .iter()
            .filter_map(|entry| entry.value().get().map(|client| client.breaker().snapshot()))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Number of constructed clients.
    pub fn len(&self) -> usize {
        self.clients
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("clients", &self.len())
            .field("discovery", &self.discovery.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalBus;
    use crate::config::ServiceConfig;
    use crate::discovery::{DiscoveryError, InMemoryDiscovery};
    use crate::resilience::CircuitState;
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Discovery that is slow and counts lookups.
    struct CountingDiscovery {
        lookups: AtomicUsize,
        result: Result<String, DiscoveryError>,
    }

    #[async_trait]
    impl ServiceDiscovery for CountingDiscovery {
        async fn lookup(&self, _name: &str) -> Result<String, DiscoveryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.result.clone()
        }
    }

    fn factory(config: GatewayConfig) -> ClientFactory {
        ClientFactory::new(Arc::new(config), Arc::new(LocalBus::new()))
    }

    #[tokio::test]
    async fn test_defaults_for_unconfigured_service() {
        let factory = factory(GatewayConfig::default());
        let client = factory.get_client("items").await;

        assert_eq!(client.address(), "service.items");
        let breaker = &client.descriptor().breaker;
        assert_eq!(breaker.max_failures, 5);
        assert_eq!(breaker.timeout, Duration::from_millis(10_000));
        assert_eq!(breaker.reset_timeout, Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_same_instance_per_name() {
        let factory = factory(GatewayConfig::default());
        let a = factory.get_client("items").await;
        let b = factory.get_client("items").await;
        let c = factory.get_client("weather").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(factory.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_builds_once() {
        let discovery = Arc::new(CountingDiscovery {
            lookups: AtomicUsize::new(0),
            result: Ok("bus.items".into()),
        });
        let factory = Arc::new(
            factory(GatewayConfig::default()).with_discovery(discovery.clone()),
        );

        let tasks = (0..32).map(|_| {
            let factory = Arc::clone(&factory);
            tokio::spawn(async move { factory.get_client("items").await })
        });
        let clients: Vec<_> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
        assert_eq!(discovery.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(factory.len(), 1);
        assert_eq!(clients[0].address(), "bus.items");
    }

    #[tokio::test]
    async fn test_address_resolution_order() {
        let mut config = GatewayConfig::default();
        let mut weather = ServiceConfig::default();
        weather.address = Some("static.weather".into());
        config.services.insert("weather".into(), weather.clone());
        config.services.insert("items".into(), weather);

        let discovery = InMemoryDiscovery::new();
        discovery.register("items", "discovered.items").await;
        let factory = factory(config).with_discovery(Arc::new(discovery));

        assert_eq!(factory.get_client("items").await.address(), "discovered.items");
        assert_eq!(factory.get_client("weather").await.address(), "static.weather");
        assert_eq!(factory.get_client("orders").await.address(), "service.orders");
    }

    #[tokio::test]
    async fn test_discovery_failure_falls_back_silently() {
        let discovery = Arc::new(CountingDiscovery {
            lookups: AtomicUsize::new(0),
            result: Err(DiscoveryError::Unavailable("registry down".into())),
        });
        let factory = factory(GatewayConfig::default()).with_discovery(discovery);

        let client = factory.get_client("weather").await;
        assert_eq!(client.address(), "service.weather");
    }

    /// Discovery whose lookups never complete.
    struct StalledDiscovery {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl ServiceDiscovery for StalledDiscovery {
        async fn lookup(&self, _name: &str) -> Result<String, DiscoveryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<String, DiscoveryError>>().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_discovery_times_out_and_falls_back() {
        let mut config = GatewayConfig::default();
        config.discovery.timeout_ms = 250;
        let mut weather = ServiceConfig::default();
        weather.address = Some("static.weather".into());
        config.services.insert("weather".into(), weather);
        let discovery = Arc::new(StalledDiscovery {
            lookups: AtomicUsize::new(0),
        });
        let factory = factory(config).with_discovery(discovery.clone());

        let start = time::Instant::now();
        let weather = factory.get_client("weather").await;
        assert_eq!(weather.address(), "static.weather");
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_millis(300));

        assert_eq!(factory.get_client("items").await.address(), "service.items");
        // The slot was filled, so later callers are not held up.
        assert!(Arc::ptr_eq(&weather, &factory.get_client("weather").await));
        assert_eq!(discovery.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shared_events_and_snapshots() {
        let mut config = GatewayConfig::default();
        let mut weather = ServiceConfig::default();
        weather.circuit_breaker.max_failures = 1;
        config.services.insert("weather".into(), weather);
        let factory = factory(config);
        let mut events = factory.subscribe();

        let weather = factory.get_client("weather").await;
        factory.get_client("items").await;
        assert!(weather
            .send_request(&Default::default())
            .await
            .is_err());

        let change = events.recv().await.unwrap();
        assert_eq!(change.breaker, "weather");
        assert_eq!(change.to, CircuitState::Open);

        let snapshots = factory.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "items");
        assert_eq!(snapshots[0].state, CircuitState::Closed);
        assert_eq!(snapshots[1].name, "weather");
        assert_eq!(snapshots[1].state, CircuitState::Open);
    }
}
