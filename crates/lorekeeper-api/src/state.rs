//! Application state wiring all services together.
//!
//! Core services are generic over their ports; AppState pins them to the
//! concrete infra implementations and is shared by every handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use lorekeeper_core::agent::{OrchestratorSettings, SessionOrchestrator};
use lorekeeper_core::auth::{ConnectionAuthorizer, KeySetCache, TokenVerifier, VerifierPolicy};
use lorekeeper_core::chat::history::ChatHistoryStore;
use lorekeeper_core::connection::ConnectionLifecycle;
use lorekeeper_core::tools::{DiceRoller, ToolRegistry};
use lorekeeper_infra::auth::HttpKeySetSource;
use lorekeeper_infra::config::{database_url, resolve_under};
use lorekeeper_infra::llm::bedrock::BedrockEndpoint;
use lorekeeper_infra::llm::{bedrock_endpoint, create_provider};
use lorekeeper_infra::sqlite::connection::SqliteConnectionStore;
use lorekeeper_infra::sqlite::history::SqliteChatHistory;
use lorekeeper_infra::sqlite::pool::DatabasePool;
use lorekeeper_infra::storage::files::LocalCampaignFiles;
use lorekeeper_infra::vector::campaign::LanceCampaignIndex;
use lorekeeper_infra::vector::embedder::BedrockEmbedder;
use lorekeeper_infra::vector::lance::LanceVectorStore;
use lorekeeper_types::config::ServiceConfig;

use crate::hub::ConnectionHub;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteSearch = LanceCampaignIndex<BedrockEmbedder>;

pub type ConcreteOrchestrator =
    SessionOrchestrator<Arc<SqliteChatHistory>, Arc<ConcreteSearch>, Arc<LocalCampaignFiles>>;

pub type ConcreteAuthorizer = ConnectionAuthorizer<HttpKeySetSource>;

pub type ConcreteLifecycle = ConnectionLifecycle<SqliteConnectionStore>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub authorizer: Arc<ConcreteAuthorizer>,
    pub lifecycle: Arc<ConcreteLifecycle>,
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub history: Arc<SqliteChatHistory>,
    pub hub: Arc<ConnectionHub>,
    /// One async lock per session id with a message in flight.
    pub session_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    pub invocation_timeout: Duration,
    pub db_pool: DatabasePool,
}

/// Open the database and the vector store under `data_dir`.
pub async fn open_stores(
    config: &ServiceConfig,
    data_dir: &Path,
) -> anyhow::Result<(DatabasePool, LanceVectorStore)> {
    tokio::fs::create_dir_all(data_dir).await?;
    let db_pool = DatabasePool::new(&database_url(data_dir)).await?;
    let vectors =
        LanceVectorStore::new(resolve_under(data_dir, &config.storage.vector_store_dir)).await?;
    Ok((db_pool, vectors))
}

/// Bedrock endpoint for both LLM tiers and embeddings.
pub fn endpoint(config: &ServiceConfig, token: SecretString) -> anyhow::Result<BedrockEndpoint> {
    Ok(bedrock_endpoint(token, &config.models.region)?)
}

impl AppState {
    /// Connect to the database and vector store and wire every service.
    pub async fn init(
        config: ServiceConfig,
        data_dir: PathBuf,
        bedrock_token: SecretString,
    ) -> anyhow::Result<Self> {
        if config.auth.jwks_url.is_empty() {
            anyhow::bail!("auth.jwks_url is not configured (set it in config.toml or pass --jwks-url)");
        }

        let (db_pool, vectors) = open_stores(&config, &data_dir).await?;
        let endpoint = endpoint(&config, bedrock_token)?;

        let key_source = HttpKeySetSource::new(config.auth.jwks_url.clone())?;
        let keys = KeySetCache::new(key_source)
            .with_refresh_cooldown(Duration::from_secs(config.auth.refresh_cooldown_secs));
        let verifier = TokenVerifier::new(Arc::new(keys), VerifierPolicy::from_config(&config.auth));
        let authorizer = ConnectionAuthorizer::new(Arc::new(verifier));

        let lifecycle = ConnectionLifecycle::new(SqliteConnectionStore::new(db_pool.clone()))
            .with_ttl_secs(config.storage.connection_ttl_secs);

        let history = Arc::new(SqliteChatHistory::new(db_pool.clone()));
        let search = Arc::new(LanceCampaignIndex::new(
            vectors,
            BedrockEmbedder::new(endpoint.clone(), config.models.embedding_model.clone()),
        ));
        let files = Arc::new(LocalCampaignFiles::new(resolve_under(
            &data_dir,
            &config.storage.campaign_files_dir,
        )));
        let tools = ToolRegistry::new(search, files, DiceRoller::from_entropy())?
            .with_history_token_budget(config.agent.max_history_tokens as usize);

        let orchestrator = SessionOrchestrator::new(
            create_provider(&endpoint),
            history.clone(),
            tools,
            OrchestratorSettings::from_config(&config),
        );

        tracing::info!(
            data_dir = %data_dir.display(),
            planning_model = %config.models.planning_model,
            synthesis_model = %config.models.synthesis_model,
            max_iterations = config.agent.max_iterations,
            "application state initialized"
        );

        Ok(Self {
            invocation_timeout: Duration::from_secs(config.agent.invocation_timeout_secs),
            config: Arc::new(config),
            authorizer: Arc::new(authorizer),
            lifecycle: Arc::new(lifecycle),
            orchestrator: Arc::new(orchestrator),
            history,
            hub: Arc::new(ConnectionHub::new()),
            session_locks: Arc::new(DashMap::new()),
            db_pool,
        })
    }

    /// The lock serializing messages for `session_id`.
    pub fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the session's lock entry once nobody else holds or waits on it.
    pub fn release_session_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.session_locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Periodically purge expired connection records and chat histories
    /// until `shutdown` is cancelled.
    pub fn spawn_purge_sweeper(
        &self,
        every: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let lifecycle = self.lifecycle.clone();
        let history = self.history.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = lifecycle.purge_expired().await {
                            tracing::warn!(error = %e, "connection purge failed");
                        }
                        match history.purge_expired(chrono::Utc::now()).await {
                            Ok(0) => {}
                            Ok(removed) => tracing::debug!(removed, "expired chat histories purged"),
                            Err(e) => tracing::warn!(error = %e, "chat history purge failed"),
                        }
                    }
                }
            }
            tracing::debug!("purge sweeper stopped");
        })
    }
}
