use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db;
use crate::users::{memory_repo::InMemoryUserStore, pg_repo::PgUserStore, repo::UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users = if config.uses_memory_store() {
            warn!("DATABASE_URL is memory://; users are not persisted");
            Arc::new(InMemoryUserStore::new()) as Arc<dyn UserStore>
        } else {
            let pool = db::connect(&config).await?;
            db::migrate(&pool).await?;
            info!("database ready");
            Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>
        };

        Ok(Self::from_parts(config, users))
    }

    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserStore>) -> Self {
        Self { config, users }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(test_config()),
            Arc::new(InMemoryUserStore::new()) as Arc<dyn UserStore>,
        )
    }
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    use crate::config::{JwtConfig, ServerConfig};

    AppConfig {
        database_url: "memory://".into(),
        max_connections: 1,
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        jwt: JwtConfig {
            secret: "test".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
            required: false,
        },
    }
}
