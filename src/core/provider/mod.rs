// src/core/provider/mod.rs

//! The configuration provider: bootstraps bucket configs from seed hosts,
//! merges externally proposed configs into a revision-ordered state, and
//! publishes every accepted change as a new immutable [`ClusterConfig`]
//! snapshot.

pub mod loader;
pub mod refresher;

pub use loader::{HttpLoader, Loader, LoaderType};
pub use refresher::{HttpRefresher, ProposedBucketConfigContext, Refresher};

use crate::config::ClientConfig;
use crate::core::cluster::bucket::{BucketConfig, ClusterConfig};
use crate::core::cluster::network;
use crate::core::cluster::node::NetworkAddress;
use crate::core::cluster::parser;
use crate::core::errors::LarimarError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// The capacity of the snapshot broadcast channel. Accepted config changes
/// are rare; a subscriber that lags this far behind only needs the latest
/// snapshot anyway.
const CONFIG_BUS_CAPACITY: usize = 64;

/// The bootstrap entry points into the cluster, shared between the provider
/// and refreshers. Setting the list overwrites the previous one.
#[derive(Debug, Default)]
pub struct SeedList {
    hosts: RwLock<Vec<NetworkAddress>>,
    directly_connected: AtomicBool,
}

impl SeedList {
    pub fn set(&self, hosts: Vec<NetworkAddress>, directly_connected: bool) {
        *self.hosts.write() = hosts;
        self.directly_connected
            .store(directly_connected, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Vec<NetworkAddress> {
        self.hosts.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }

    /// Whether the seeds were handed in as direct node addresses rather than
    /// a load-balanced endpoint.
    pub fn directly_connected(&self) -> bool {
        self.directly_connected.load(Ordering::Relaxed)
    }
}

/// The authoritative, in-process source of the current cluster configuration
/// for one or more buckets, and the event stream by which the rest of the
/// client learns of changes.
pub struct ConfigurationProvider {
    client_config: Arc<ClientConfig>,
    loaders: Vec<Arc<dyn Loader>>,
    refreshers: HashMap<LoaderType, Arc<dyn Refresher>>,
    seeds: Arc<SeedList>,
    /// The single shared snapshot cell. The write lock is the serializer for
    /// all mutations; readers clone the `Arc` out under the read lock.
    current: RwLock<Arc<ClusterConfig>>,
    updates: broadcast::Sender<Arc<ClusterConfig>>,
}

impl ConfigurationProvider {
    /// Creates a provider over the given loader chain (tried in order during
    /// bootstrap) and refresher map (keyed by the loader type that won the
    /// bootstrap). Must be called from within a Tokio runtime: the provider
    /// spawns one routing task per distinct refresher.
    pub fn new(
        client_config: ClientConfig,
        loaders: Vec<Arc<dyn Loader>>,
        refreshers: HashMap<LoaderType, Arc<dyn Refresher>>,
    ) -> Arc<Self> {
        Self::with_parts(
            Arc::new(client_config),
            Arc::new(SeedList::default()),
            loaders,
            refreshers,
        )
    }

    /// Creates a provider wired up with the HTTP loader and refresher.
    pub fn with_http_defaults(client_config: ClientConfig) -> Arc<Self> {
        let client_config = Arc::new(client_config);
        let seeds = Arc::new(SeedList::default());
        let loader: Arc<dyn Loader> = Arc::new(HttpLoader::new(Arc::clone(&client_config)));
        let refresher: Arc<dyn Refresher> =
            HttpRefresher::spawn(Arc::clone(&client_config), Arc::clone(&seeds));
        Self::with_parts(
            client_config,
            seeds,
            vec![loader],
            HashMap::from([(LoaderType::Http, refresher)]),
        )
    }

    fn with_parts(
        client_config: Arc<ClientConfig>,
        seeds: Arc<SeedList>,
        loaders: Vec<Arc<dyn Loader>>,
        refreshers: HashMap<LoaderType, Arc<dyn Refresher>>,
    ) -> Arc<Self> {
        let (updates, _) = broadcast::channel(CONFIG_BUS_CAPACITY);
        let provider = Arc::new(Self {
            client_config,
            loaders,
            refreshers,
            seeds,
            current: RwLock::new(Arc::new(ClusterConfig::default())),
            updates,
        });
        provider.spawn_refresher_routes();
        provider
    }

    /// Subscribes to every distinct refresher and routes its proposals into
    /// the acceptance engine. A refresher registered under several loader
    /// types is subscribed only once.
    fn spawn_refresher_routes(self: &Arc<Self>) {
        let mut subscribed: Vec<usize> = Vec::new();
        for refresher in self.refreshers.values() {
            let identity = Arc::as_ptr(refresher) as *const u8 as usize;
            if subscribed.contains(&identity) {
                continue;
            }
            subscribed.push(identity);

            let mut proposals = refresher.configs();
            let provider = Arc::downgrade(self);
            tokio::spawn(async move {
                loop {
                    match proposals.recv().await {
                        Ok(context) => {
                            let Some(provider) = provider.upgrade() else {
                                return;
                            };
                            provider.propose_bucket_config(context);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "refresher route lagged, dropping proposals");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            });
        }
    }

    /// Sets the seed hosts, overwriting any previous list.
    pub fn seed_hosts(&self, seeds: Vec<NetworkAddress>, directly_connected: bool) {
        self.seeds.set(seeds, directly_connected);
    }

    /// The current snapshot.
    pub fn config(&self) -> Arc<ClusterConfig> {
        self.current.read().clone()
    }

    /// Subscribes to accepted configuration changes. New subscribers do not
    /// receive a replay of prior snapshots; use [`config`](Self::config) for
    /// the current one.
    pub fn configs(&self) -> broadcast::Receiver<Arc<ClusterConfig>> {
        self.updates.subscribe()
    }

    /// Offers an externally obtained raw config to the acceptance engine.
    /// Invalid payloads and stale revisions are dropped without an emission;
    /// this is fire-and-forget by design.
    pub fn propose_bucket_config(&self, context: ProposedBucketConfigContext) {
        let raw = match std::str::from_utf8(&context.raw) {
            Ok(raw) => raw,
            Err(_) => {
                debug!(
                    bucket = %context.bucket_name,
                    "ignoring proposed config with a non-utf8 payload"
                );
                return;
            }
        };
        let config = match parser::parse(raw, context.origin.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                debug!(
                    bucket = %context.bucket_name,
                    error = %e,
                    "ignoring proposed config that failed to parse"
                );
                return;
            }
        };
        if config.rev().is_none() {
            debug!(
                bucket = %context.bucket_name,
                "ignoring proposed config without a revision"
            );
            return;
        }
        self.accept(config);
    }

    /// Bootstraps `name` against the current seeds and publishes the
    /// resulting snapshot. Fails with [`LarimarError::CouldNotOpenBucket`]
    /// when every loader fails on every seed, or when the winning loader has
    /// no usable refresher. Dropping the returned future cancels all
    /// in-flight attempts.
    pub async fn open_bucket(
        &self,
        name: &str,
        password: &str,
    ) -> Result<Arc<ClusterConfig>, LarimarError> {
        self.open_bucket_with_auth(name, None, password).await
    }

    /// Like [`open_bucket`](Self::open_bucket) with an explicit user for
    /// role-based auth.
    pub async fn open_bucket_with_auth(
        &self,
        name: &str,
        username: Option<&str>,
        password: &str,
    ) -> Result<Arc<ClusterConfig>, LarimarError> {
        let seeds = self.seeds.snapshot();
        if seeds.is_empty() {
            warn!(bucket = name, "cannot open bucket without seed hosts");
            return Err(LarimarError::CouldNotOpenBucket);
        }

        // Loaders run strictly in order; within one loader all seeds race and
        // the first success wins. A seed that never answers is simply aborted
        // once a sibling delivers.
        for loader in &self.loaders {
            let mut attempts = JoinSet::new();
            for seed in &seeds {
                let loader = Arc::clone(loader);
                let seed = seed.clone();
                let bucket = name.to_string();
                let username = username.map(String::from);
                let password = password.to_string();
                attempts.spawn(async move {
                    loader
                        .load_config(&seed, &bucket, username.as_deref(), &password)
                        .await
                });
            }
            while let Some(joined) = attempts.join_next().await {
                match joined {
                    Ok(Ok((loader_type, config))) => {
                        attempts.abort_all();
                        return self
                            .finish_bootstrap(loader_type, config, name, username, password)
                            .await;
                    }
                    Ok(Err(e)) => {
                        debug!(bucket = name, error = %e, "seed attempt failed");
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        debug!(bucket = name, error = %e, "seed attempt aborted abnormally");
                    }
                }
            }
        }

        warn!(bucket = name, "all loaders failed on all seeds");
        Err(LarimarError::CouldNotOpenBucket)
    }

    async fn finish_bootstrap(
        &self,
        loader_type: LoaderType,
        config: BucketConfig,
        name: &str,
        username: Option<&str>,
        password: &str,
    ) -> Result<Arc<ClusterConfig>, LarimarError> {
        let Some(refresher) = self.refreshers.get(&loader_type) else {
            warn!(
                bucket = name,
                ?loader_type,
                "no refresher registered for the loader type that won bootstrap"
            );
            return Err(LarimarError::CouldNotOpenBucket);
        };
        if let Err(e) = refresher.register_bucket(name, username, password).await {
            warn!(bucket = name, error = %e, "refresher registration failed");
            return Err(LarimarError::CouldNotOpenBucket);
        }

        info!(bucket = name, ?loader_type, "bucket bootstrap succeeded");
        self.accept(config);
        Ok(self.config())
    }

    /// The acceptance engine. Applies network resolution, enforces the
    /// per-bucket revision monotonicity rule under the write lock, swaps the
    /// snapshot and enqueues it for subscribers. Returns whether the config
    /// was accepted.
    ///
    /// A config without a revision is only accepted as the initial entry for
    /// its bucket (the bootstrap case); any revisioned config replaces such
    /// a placeholder.
    fn accept(&self, mut config: BucketConfig) -> bool {
        let seeds = self.seeds.snapshot();
        network::resolve(
            &mut config,
            &self.client_config.network_resolution,
            &seeds,
        );

        let mut current = self.current.write();
        let accepted = match current.bucket_config(config.name()).map(BucketConfig::rev) {
            None => true,
            Some(None) => config.rev().is_some(),
            Some(Some(existing)) => config.rev().is_some_and(|proposed| proposed > existing),
        };
        if !accepted {
            debug!(
                bucket = config.name(),
                rev = ?config.rev(),
                "ignoring config that does not advance the bucket revision"
            );
            return false;
        }

        info!(
            bucket = config.name(),
            rev = ?config.rev(),
            network = ?config.use_alternate_network(),
            "accepted bucket config"
        );
        let next = Arc::new(current.with_bucket(config));
        *current = Arc::clone(&next);
        // The send only enqueues; subscribers drain outside the lock, so the
        // fan-out never holds the serializer during delivery.
        let _ = self.updates.send(next);
        true
    }
}
