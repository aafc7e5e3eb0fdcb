// src/core/provider/loader.rs

//! Bootstrap loader strategies. A loader attempts to obtain a bucket config
//! from one seed address using one protocol; the provider races loaders over
//! all seeds during bootstrap.

use crate::config::ClientConfig;
use crate::core::cluster::bucket::BucketConfig;
use crate::core::cluster::node::NetworkAddress;
use crate::core::cluster::parser;
use crate::core::errors::LarimarError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The protocol a loader (and its matching refresher) speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderType {
    /// The binary key-value protocol. The concrete loader ships with the
    /// wire-level client; only the tag is defined here.
    Carrier,
    /// The HTTP management protocol.
    Http,
}

/// A bootstrap strategy. `load_config` must be idempotent and free of side
/// effects beyond the network attempt itself; the provider may retry it and
/// abandons attempts that lose the race.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load_config(
        &self,
        seed: &NetworkAddress,
        bucket: &str,
        username: Option<&str>,
        password: &str,
    ) -> Result<(LoaderType, BucketConfig), LarimarError>;
}

/// Loads a bucket config over the HTTP management port.
pub struct HttpLoader {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl HttpLoader {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }
}

#[async_trait]
impl Loader for HttpLoader {
    async fn load_config(
        &self,
        seed: &NetworkAddress,
        bucket: &str,
        username: Option<&str>,
        password: &str,
    ) -> Result<(LoaderType, BucketConfig), LarimarError> {
        let raw = fetch_terse_config(
            &self.client,
            seed,
            self.config.config_port,
            bucket,
            username,
            password,
        )
        .await?;
        let config = parser::parse(&raw, Some(seed))?;
        debug!(bucket, seed = %seed, "loaded config over http");
        Ok((LoaderType::Http, config))
    }
}

/// Fetches the terse single-bucket config from one node. Shared between the
/// HTTP loader and refresher.
pub(crate) async fn fetch_terse_config(
    client: &reqwest::Client,
    seed: &NetworkAddress,
    port: u16,
    bucket: &str,
    username: Option<&str>,
    password: &str,
) -> Result<String, LarimarError> {
    let url = format!(
        "http://{}:{}/pools/default/b/{}",
        http_host(seed),
        port,
        bucket
    );
    let res = client
        .get(&url)
        // Bucket-level auth uses the bucket name as the user.
        .basic_auth(username.unwrap_or(bucket), Some(password))
        .send()
        .await?;
    if res.status() != reqwest::StatusCode::OK {
        return Err(LarimarError::LoaderFailed(format!(
            "config request to {url} returned status {}",
            res.status()
        )));
    }
    Ok(res.text().await?)
}

/// IPv6 literals need brackets inside a URL authority.
fn http_host(seed: &NetworkAddress) -> String {
    let address = seed.address();
    if address.contains(':') {
        format!("[{address}]")
    } else {
        address
    }
}
