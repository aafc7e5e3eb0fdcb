// src/core/provider/refresher.rs

//! Refreshers keep already-opened buckets current: each produces a stream of
//! proposed configs that the provider routes into the acceptance engine.

use crate::config::ClientConfig;
use crate::core::cluster::node::NetworkAddress;
use crate::core::errors::LarimarError;
use crate::core::provider::loader::fetch_terse_config;
use crate::core::provider::SeedList;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// The capacity of the proposal broadcast channel. Config changes are rare;
/// a lagging subscriber only loses proposals it would supersede anyway.
const PROPOSAL_BUS_CAPACITY: usize = 64;

/// An externally proposed configuration for one bucket, together with the
/// address the raw payload came from.
#[derive(Debug, Clone)]
pub struct ProposedBucketConfigContext {
    pub bucket_name: String,
    pub raw: Bytes,
    pub origin: Option<NetworkAddress>,
}

impl ProposedBucketConfigContext {
    pub fn new(
        bucket_name: impl Into<String>,
        raw: impl Into<Bytes>,
        origin: Option<NetworkAddress>,
    ) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            raw: raw.into(),
            origin,
        }
    }
}

/// A background source of proposed updates for already-opened buckets.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// The stream of proposed configs. The provider subscribes exactly once
    /// per refresher instance.
    fn configs(&self) -> broadcast::Receiver<ProposedBucketConfigContext>;

    /// Starts refreshing `name`. An error fails the bootstrap of that bucket.
    async fn register_bucket(
        &self,
        name: &str,
        username: Option<&str>,
        password: &str,
    ) -> Result<(), LarimarError>;
}

#[derive(Clone)]
struct BucketCredentials {
    username: Option<String>,
    password: String,
}

/// Polls the HTTP management port of the seed nodes for every registered
/// bucket and emits whatever the server returns as a proposal. The acceptance
/// engine discards stale or unchanged revisions, so the refresher does not
/// try to be clever about deduplication.
pub struct HttpRefresher {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    seeds: Arc<SeedList>,
    buckets: DashMap<String, BucketCredentials>,
    proposals: broadcast::Sender<ProposedBucketConfigContext>,
    shutdown: broadcast::Sender<()>,
}

impl HttpRefresher {
    /// Creates the refresher and spawns its poll task. Must be called from
    /// within a Tokio runtime.
    pub fn spawn(config: Arc<ClientConfig>, seeds: Arc<SeedList>) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_default();
        let (proposals, _) = broadcast::channel(PROPOSAL_BUS_CAPACITY);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let refresher = Arc::new(Self {
            client,
            config,
            seeds,
            buckets: DashMap::new(),
            proposals,
            shutdown,
        });
        tokio::spawn(run_poll_loop(Arc::downgrade(&refresher), shutdown_rx));
        refresher
    }

    /// Stops the poll task. Dropping the last reference has the same effect.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    async fn poll_bucket(&self, name: &str, credentials: &BucketCredentials) {
        for seed in self.seeds.snapshot() {
            match fetch_terse_config(
                &self.client,
                &seed,
                self.config.config_port,
                name,
                credentials.username.as_deref(),
                &credentials.password,
            )
            .await
            {
                Ok(raw) => {
                    let context =
                        ProposedBucketConfigContext::new(name, raw, Some(seed.clone()));
                    if self.proposals.send(context).is_err() {
                        debug!(bucket = name, "polled a config with no active subscribers");
                    }
                    return;
                }
                Err(e) => {
                    debug!(bucket = name, seed = %seed, error = %e, "config poll failed");
                }
            }
        }
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    fn configs(&self) -> broadcast::Receiver<ProposedBucketConfigContext> {
        self.proposals.subscribe()
    }

    async fn register_bucket(
        &self,
        name: &str,
        username: Option<&str>,
        password: &str,
    ) -> Result<(), LarimarError> {
        info!(bucket = name, "registering bucket for http refresh");
        self.buckets.insert(
            name.to_string(),
            BucketCredentials {
                username: username.map(String::from),
                password: password.to_string(),
            },
        );
        Ok(())
    }
}

async fn run_poll_loop(refresher: Weak<HttpRefresher>, mut shutdown_rx: broadcast::Receiver<()>) {
    let interval_ms = match refresher.upgrade() {
        Some(r) => r.config.poll_interval_ms,
        None => return,
    };
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(refresher) = refresher.upgrade() else {
                    return;
                };
                // Clone the registrations out so no map guard is held across
                // the polls.
                let registered: Vec<(String, BucketCredentials)> = refresher
                    .buckets
                    .iter()
                    .map(|entry| (entry.key().clone(), entry.value().clone()))
                    .collect();
                for (name, credentials) in registered {
                    refresher.poll_bucket(&name, &credentials).await;
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("http refresher poll loop shutting down");
                return;
            }
        }
    }
}
