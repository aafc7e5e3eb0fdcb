use async_trait::async_trait;
use larimar_client::config::ClientConfig;
use larimar_client::core::cluster::bucket::BucketConfig;
use larimar_client::core::cluster::node::NetworkAddress;
use larimar_client::core::cluster::parser;
use larimar_client::core::provider::{
    ConfigurationProvider, Loader, LoaderType, ProposedBucketConfigContext, Refresher,
};
use larimar_client::LarimarError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const REV_PLACEHOLDER: &str = include_str!("fixtures/config_with_rev_placeholder.json");

fn bucket_config_named(name: &str) -> BucketConfig {
    let raw = format!(
        r#"{{"name": "{name}", "nodeLocator": "vbucket", "nodes": [
            {{"hostname": "127.0.0.1", "services": {{"kv": 11210}}}}
        ]}}"#
    );
    parser::parse(&raw, None).unwrap()
}

#[derive(Clone)]
enum SeedOutcome {
    /// Deliver a config carrying the given bucket name.
    Success(String),
    /// Fail the attempt immediately.
    Failure,
    /// Never answer; the attempt must be abandoned by the caller.
    Hang,
}

struct ScriptedLoader {
    loader_type: LoaderType,
    outcomes: HashMap<String, SeedOutcome>,
    fallback: SeedOutcome,
}

impl ScriptedLoader {
    fn always(loader_type: LoaderType, fallback: SeedOutcome) -> Arc<dyn Loader> {
        Arc::new(Self {
            loader_type,
            outcomes: HashMap::new(),
            fallback,
        })
    }

    fn per_seed(
        loader_type: LoaderType,
        outcomes: HashMap<String, SeedOutcome>,
        fallback: SeedOutcome,
    ) -> Arc<dyn Loader> {
        Arc::new(Self {
            loader_type,
            outcomes,
            fallback,
        })
    }
}

#[async_trait]
impl Loader for ScriptedLoader {
    async fn load_config(
        &self,
        seed: &NetworkAddress,
        _bucket: &str,
        _username: Option<&str>,
        _password: &str,
    ) -> Result<(LoaderType, BucketConfig), LarimarError> {
        let outcome = self.outcomes.get(&seed.address()).unwrap_or(&self.fallback);
        match outcome {
            SeedOutcome::Success(name) => Ok((self.loader_type, bucket_config_named(name))),
            SeedOutcome::Failure => Err(LarimarError::LoaderFailed(
                "could not load config for some reason".into(),
            )),
            SeedOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(LarimarError::LoaderFailed("gave up waiting".into()))
            }
        }
    }
}

struct RecordingRefresher {
    proposals: broadcast::Sender<ProposedBucketConfigContext>,
    registered: Mutex<Vec<String>>,
    fail_registration: bool,
}

impl RecordingRefresher {
    fn new(fail_registration: bool) -> Arc<Self> {
        let (proposals, _) = broadcast::channel(16);
        Arc::new(Self {
            proposals,
            registered: Mutex::new(Vec::new()),
            fail_registration,
        })
    }

    fn emit(&self, context: ProposedBucketConfigContext) {
        self.proposals.send(context).unwrap();
    }
}

#[async_trait]
impl Refresher for RecordingRefresher {
    fn configs(&self) -> broadcast::Receiver<ProposedBucketConfigContext> {
        self.proposals.subscribe()
    }

    async fn register_bucket(
        &self,
        name: &str,
        _username: Option<&str>,
        _password: &str,
    ) -> Result<(), LarimarError> {
        if self.fail_registration {
            return Err(LarimarError::RefresherRegistration("rejected".into()));
        }
        self.registered.lock().push(name.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_opens_bucket() {
    let refresher = RecordingRefresher::new(false);
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![ScriptedLoader::always(
            LoaderType::Carrier,
            SeedOutcome::Success("bucket".into()),
        )],
        HashMap::from([(
            LoaderType::Carrier,
            refresher.clone() as Arc<dyn Refresher>,
        )]),
    );

    provider.seed_hosts(vec![NetworkAddress::localhost()], true);
    let config = provider.open_bucket("bucket", "password").await.unwrap();

    assert!(config.has_bucket("bucket"));
    assert!(!config.has_bucket("other"));
    assert_eq!(vec!["bucket".to_string()], *refresher.registered.lock());
}

#[tokio::test]
async fn test_delegates_to_second_loader_if_first_fails() {
    let refresher = RecordingRefresher::new(false);
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![
            ScriptedLoader::always(LoaderType::Carrier, SeedOutcome::Failure),
            ScriptedLoader::always(LoaderType::Http, SeedOutcome::Success("bucket".into())),
        ],
        HashMap::from([
            (
                LoaderType::Carrier,
                refresher.clone() as Arc<dyn Refresher>,
            ),
            (LoaderType::Http, refresher.clone() as Arc<dyn Refresher>),
        ]),
    );

    provider.seed_hosts(vec![NetworkAddress::localhost()], true);
    let config = provider.open_bucket("bucket", "password").await.unwrap();

    assert!(config.has_bucket("bucket"));
    assert!(!config.has_bucket("other"));
}

#[tokio::test]
async fn test_opens_bucket_if_subset_of_seeds_is_failing() {
    let refresher = RecordingRefresher::new(false);
    let good_seed = NetworkAddress::new("5.6.7.8");
    let bad_seed = NetworkAddress::new("1.2.3.4");

    let loader = ScriptedLoader::per_seed(
        LoaderType::Carrier,
        HashMap::from([(
            good_seed.address(),
            SeedOutcome::Success(format!("bucket-carrier-{}", good_seed.address())),
        )]),
        SeedOutcome::Failure,
    );
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![loader],
        HashMap::from([(
            LoaderType::Carrier,
            refresher.clone() as Arc<dyn Refresher>,
        )]),
    );

    provider.seed_hosts(vec![bad_seed, good_seed], true);
    let config = provider.open_bucket("bucket", "password").await.unwrap();

    assert_eq!(1, config.bucket_configs().len());
    assert!(config.has_bucket("bucket-carrier-5.6.7.8"));
}

/// A seed that never answers must not block selection once another seed has
/// produced a config.
#[tokio::test]
async fn test_opens_bucket_if_subset_of_seeds_is_not_responding() {
    let refresher = RecordingRefresher::new(false);
    let good_seed = NetworkAddress::new("5.6.7.8");
    let bad_seed = NetworkAddress::new("1.2.3.4");

    let loader = ScriptedLoader::per_seed(
        LoaderType::Carrier,
        HashMap::from([(
            good_seed.address(),
            SeedOutcome::Success(format!("bucket-carrier-{}", good_seed.address())),
        )]),
        SeedOutcome::Hang,
    );
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![loader],
        HashMap::from([(
            LoaderType::Carrier,
            refresher.clone() as Arc<dyn Refresher>,
        )]),
    );

    provider.seed_hosts(vec![bad_seed, good_seed], true);
    let config = tokio::time::timeout(
        Duration::from_secs(10),
        provider.open_bucket("bucket", "password"),
    )
    .await
    .expect("bootstrap must not wait for the hanging seed")
    .unwrap();

    assert_eq!(1, config.bucket_configs().len());
    assert!(config.has_bucket("bucket-carrier-5.6.7.8"));
}

#[tokio::test]
async fn test_emits_new_cluster_config_on_bootstrap() {
    let refresher = RecordingRefresher::new(false);
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![ScriptedLoader::always(
            LoaderType::Carrier,
            SeedOutcome::Success("bucket".into()),
        )],
        HashMap::from([(
            LoaderType::Carrier,
            refresher.clone() as Arc<dyn Refresher>,
        )]),
    );

    let mut updates = provider.configs();

    provider.seed_hosts(vec![NetworkAddress::localhost()], true);
    let config = provider.open_bucket("bucket", "password").await.unwrap();
    assert!(config.has_bucket("bucket"));

    let emitted = tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(emitted.has_bucket("bucket"));
}

#[tokio::test]
async fn test_fails_opening_bucket_if_no_config_loaded() {
    let refresher = RecordingRefresher::new(false);
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![ScriptedLoader::always(
            LoaderType::Carrier,
            SeedOutcome::Failure,
        )],
        HashMap::from([(
            LoaderType::Carrier,
            refresher.clone() as Arc<dyn Refresher>,
        )]),
    );

    provider.seed_hosts(vec![NetworkAddress::localhost()], true);
    let err = provider.open_bucket("bucket", "password").await.unwrap_err();

    assert_eq!(LarimarError::CouldNotOpenBucket, err);
    assert_eq!("Could not open bucket.", err.to_string());
}

#[tokio::test]
async fn test_fails_opening_bucket_without_seed_hosts() {
    let refresher = RecordingRefresher::new(false);
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![ScriptedLoader::always(
            LoaderType::Carrier,
            SeedOutcome::Success("bucket".into()),
        )],
        HashMap::from([(
            LoaderType::Carrier,
            refresher.clone() as Arc<dyn Refresher>,
        )]),
    );

    let err = provider.open_bucket("bucket", "password").await.unwrap_err();
    assert_eq!(LarimarError::CouldNotOpenBucket, err);
}

/// A loader type without a registered refresher is a wiring bug and fails
/// the bootstrap.
#[tokio::test]
async fn test_fails_opening_bucket_without_matching_refresher() {
    let refresher = RecordingRefresher::new(false);
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![ScriptedLoader::always(
            LoaderType::Carrier,
            SeedOutcome::Success("bucket".into()),
        )],
        HashMap::from([(LoaderType::Http, refresher.clone() as Arc<dyn Refresher>)]),
    );

    provider.seed_hosts(vec![NetworkAddress::localhost()], true);
    let err = provider.open_bucket("bucket", "password").await.unwrap_err();
    assert_eq!(LarimarError::CouldNotOpenBucket, err);
}

#[tokio::test]
async fn test_fails_opening_bucket_if_refresher_registration_fails() {
    let refresher = RecordingRefresher::new(true);
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        vec![ScriptedLoader::always(
            LoaderType::Carrier,
            SeedOutcome::Success("bucket".into()),
        )],
        HashMap::from([(
            LoaderType::Carrier,
            refresher.clone() as Arc<dyn Refresher>,
        )]),
    );

    provider.seed_hosts(vec![NetworkAddress::localhost()], true);
    let err = provider.open_bucket("bucket", "password").await.unwrap_err();
    assert_eq!(LarimarError::CouldNotOpenBucket, err);
}

/// Proposals flowing out of a refresher reach the acceptance engine without
/// any caller involvement.
#[tokio::test]
async fn test_routes_refresher_proposals_into_acceptance() {
    let refresher = RecordingRefresher::new(false);
    let provider = ConfigurationProvider::new(
        ClientConfig::default(),
        Vec::new(),
        HashMap::from([(
            LoaderType::Carrier,
            refresher.clone() as Arc<dyn Refresher>,
        )]),
    );
    provider.seed_hosts(vec![NetworkAddress::localhost()], true);

    refresher.emit(ProposedBucketConfigContext::new(
        "default",
        REV_PLACEHOLDER.replace("$REV", "1"),
        None,
    ));

    let mut accepted = false;
    for _ in 0..100 {
        if provider.config().has_bucket("default") {
            accepted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(accepted);
    assert_eq!(
        Some(1),
        provider.config().bucket_config("default").unwrap().rev()
    );
}
