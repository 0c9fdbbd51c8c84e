use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::repositories::{AccountStore, PostgresAccountStore};
use crate::services::{IdentityService, RateOracleClient, SecretCache};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("DATABASE_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()
                .context("DATABASE_PORT must be a valid port number")?,
            username: env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("DATABASE_PASSWORD").unwrap_or_default(),
            database: env::var("DATABASE_NAME").unwrap_or_else(|_| "often_gateway".to_string()),
            ssl_mode: env::var("DATABASE_SSL_MODE").unwrap_or_else(|_| "prefer".to_string()),
        })
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

/// Process-wide configuration plus the shared, long-lived service handles
/// every handler needs. Cloning an `AppConfig` is cheap: the store and every
/// cache below are `Arc`-backed, so a clone shares the same underlying
/// `PgPool` and caches rather than duplicating them.
#[derive(Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub admin_api_key: String,
    pub firebase_web_api_key: String,
    pub gcp_project: String,
    pub store: Arc<dyn AccountStore>,
    pub secret_cache: Arc<SecretCache>,
    pub identity: Arc<IdentityService>,
    pub rate_oracle: Arc<RateOracleClient>,
    pub http_client: reqwest::Client,
}

impl AppConfig {
    pub async fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let database = DatabaseConfig::from_env()?;
        let pool = PgPool::connect(&database.connection_string())
            .await
            .context("failed to connect to the account/ledger database")?;

        let admin_api_key = env::var("ADMIN_API_KEY").context("ADMIN_API_KEY must be set")?;
        let firebase_web_api_key =
            env::var("FIREBASE_WEB_API_KEY").context("FIREBASE_WEB_API_KEY must be set")?;
        let gcp_project = env::var("GCP_PROJECT").context("GCP_PROJECT must be set")?;

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("failed to build the shared HTTP client")?;

        let account_store = PostgresAccountStore::new(pool.clone());
        account_store
            .initialize()
            .await
            .context("failed to initialize accounts/transactions schema")?;
        let store: Arc<dyn AccountStore> = Arc::new(account_store);
        let secret_cache = Arc::new(SecretCache::new(gcp_project.clone(), http_client.clone()));
        let identity = Arc::new(IdentityService::new(http_client.clone()));
        let rate_oracle = Arc::new(RateOracleClient::new(
            http_client.clone(),
            env::var("RATE_ORACLE_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3/simple/price".to_string()),
        ));

        Ok(Self {
            database,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            cors_origins,
            admin_api_key,
            firebase_web_api_key,
            gcp_project,
            store,
            secret_cache,
            identity,
            rate_oracle,
            http_client,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
