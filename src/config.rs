use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    /// Attach bearer verification to the user routes.
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub server: ServerConfig,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = env_parse("DB_MAX_CONNECTIONS").unwrap_or(10);
        let server = ServerConfig {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT").unwrap_or(8080),
        };
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "user-directory".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "user-directory-clients".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(10),
            required: env_parse("AUTH_REQUIRED").unwrap_or(false),
        };
        Ok(Self {
            database_url,
            max_connections,
            server,
            jwt,
        })
    }

    /// `memory://` selects the in-process store instead of Postgres.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}
