use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::{memory::InMemoryUserRepo, repo::PgUserRepo, repo::UserRepo};
use crate::config::{AppConfig, StorageKind};
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepo>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        if config.uses_default_secret() {
            warn!("JWT_SECRET is not set; using the development placeholder secret");
        }

        let users: Arc<dyn UserRepo> = match config.storage {
            StorageKind::Postgres => {
                let pool = db::connect(&config.database_url).await?;
                db::migrate(&pool).await?;
                info!("connected to postgres");
                Arc::new(PgUserRepo::new(pool))
            }
            StorageKind::Memory => {
                warn!("using in-memory user store; users are lost on restart");
                Arc::new(InMemoryUserRepo::new())
            }
        };

        Ok(Self::from_parts(users, Arc::new(config)))
    }

    pub fn from_parts(users: Arc<dyn UserRepo>, config: Arc<AppConfig>) -> Self {
        Self { users, config }
    }

    /// State backed by a fresh `InMemoryUserRepo`.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::from_parts(Arc::new(InMemoryUserRepo::new()), Arc::new(config))
    }
}
