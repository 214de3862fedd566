use std::sync::Arc;

use sambung_domain::connections::ConnectionService;
use sambung_domain::dispatch::GrantDispatcher;
use sambung_domain::ports::connections::ConnectionRequestRepository;
use sambung_domain::ports::directory::UserDirectory;
use sambung_domain::ports::projects::ProjectStore;
use sambung_domain::ports::replay::ReplayStore;
use sambung_domain::replay::{ReplayConfig, ReplayGuard};
use sambung_infra::config::AppConfig;
use sambung_infra::db::{self, DbConfig};
use sambung_infra::replay::RedisReplayStore;
use sambung_infra::repositories::{
    InMemoryConnectionRequestRepository, InMemoryProjectStore, InMemoryUserDirectory,
    SurrealConnectionRequestRepository, SurrealProjectStore, SurrealUserDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub replay: ReplayGuard,
    pub connections: Arc<dyn ConnectionRequestRepository>,
    pub directory: Arc<dyn UserDirectory>,
    pub projects: Arc<dyn ProjectStore>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = RedisReplayStore::connect(&config.redis_url).await?;
        let replay = ReplayGuard::new(Arc::new(store), ReplayConfig::default());

        if config.data_backend.eq_ignore_ascii_case("surreal") {
            let db_config = DbConfig::from_app_config(&config);
            db::health_check(&db_config).await?;
            let client = db::connect(&db_config).await?;
            let connections = Arc::new(SurrealConnectionRequestRepository::with_client(
                client.clone(),
            ));
            let directory = Arc::new(SurrealUserDirectory::with_client(client.clone()));
            let projects = Arc::new(SurrealProjectStore::with_client(client));
            return Ok(Self::assemble(
                config,
                replay,
                connections,
                directory,
                projects,
            ));
        }

        let connections = Arc::new(InMemoryConnectionRequestRepository::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let projects = Arc::new(InMemoryProjectStore::new());
        Ok(Self::assemble(
            config,
            replay,
            connections,
            directory,
            projects,
        ))
    }

    #[allow(dead_code)]
    pub fn with_stores(
        config: AppConfig,
        replay_store: Arc<dyn ReplayStore>,
        connections: Arc<dyn ConnectionRequestRepository>,
        directory: Arc<dyn UserDirectory>,
        projects: Arc<dyn ProjectStore>,
    ) -> Self {
        let replay = ReplayGuard::new(replay_store, ReplayConfig::default());
        Self::assemble(config, replay, connections, directory, projects)
    }

    fn assemble(
        config: AppConfig,
        replay: ReplayGuard,
        connections: Arc<dyn ConnectionRequestRepository>,
        directory: Arc<dyn UserDirectory>,
        projects: Arc<dyn ProjectStore>,
    ) -> Self {
        Self {
            config,
            replay,
            connections,
            directory,
            projects,
        }
    }

    pub fn connection_service(&self) -> ConnectionService {
        let dispatcher = GrantDispatcher::new(self.projects.clone(), self.config.retry_policy());
        ConnectionService::new(
            self.connections.clone(),
            self.directory.clone(),
            self.projects.clone(),
            dispatcher,
        )
    }
}
