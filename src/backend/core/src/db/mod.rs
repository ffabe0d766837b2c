//! Storage layer for Warden.
//!
//! PostgreSQL (via sqlx) is the production backend; [`MemoryStore`] keeps
//! everything in process. Both implement [`IdentityRepository`] and
//! [`RoleGraph`], and [`Storage`] hands them out as trait objects.

mod graph;
mod identities;
pub mod memory;

pub use memory::MemoryStore;

use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{Config, DatabaseConfig, StorageBackend};
use crate::error::{Result, WardenError};
use crate::identity::IdentityRepository;
use crate::rbac::graph::RoleGraph;

// ═══════════════════════════════════════════════════════════════════════════════
// Postgres
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database pool connected"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database connectivity by executing a simple query.
    pub async fn check_connectivity(&self) -> Result<Duration> {
        let start = Instant::now();
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Database connectivity check failed");
                WardenError::from(e)
            })?;
        let latency = start.elapsed();
        if latency > Duration::from_millis(100) {
            warn!(
                latency_ms = latency.as_millis() as u64,
                "Database connectivity check latency is high"
            );
        }
        Ok(latency)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Storage
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a storage health probe.
#[derive(Debug, Clone, Serialize)]
pub struct StorageHealth {
    pub backend: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// The configured storage backend behind the two repository seams.
#[derive(Clone)]
pub struct Storage {
    identities: Arc<dyn IdentityRepository>,
    graph: Arc<dyn RoleGraph>,
    database: Option<Database>,
}

impl Storage {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            identities: store.clone(),
            graph: store,
            database: None,
        }
    }

    pub fn postgres(database: Database) -> Self {
        let shared = Arc::new(database.clone());
        Self {
            identities: shared.clone(),
            graph: shared,
            database: Some(database),
        }
    }

    /// Build the backend named by `storage.backend`, connecting and
    /// migrating when it is Postgres.
    pub async fn from_config(config: &Config) -> Result<Self> {
        match config.storage.backend {
            StorageBackend::Memory => {
                warn!("Using in-memory storage; data is lost on restart");
                Ok(Self::memory())
            }
            StorageBackend::Postgres => {
                let database = Database::connect(&config.database).await?;
                if config.database.run_migrations {
                    database.migrate().await?;
                }
                Ok(Self::postgres(database))
            }
        }
    }

    pub fn identities(&self) -> Arc<dyn IdentityRepository> {
        self.identities.clone()
    }

    pub fn graph(&self) -> Arc<dyn RoleGraph> {
        self.graph.clone()
    }

    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    pub async fn health(&self) -> StorageHealth {
        match &self.database {
            None => StorageHealth {
                backend: "memory",
                healthy: true,
                latency_ms: None,
            },
            Some(db) => match db.check_connectivity().await {
                Ok(latency) => StorageHealth {
                    backend: "postgres",
                    healthy: true,
                    latency_ms: Some(latency.as_millis() as u64),
                },
                Err(_) => StorageHealth {
                    backend: "postgres",
                    healthy: false,
                    latency_ms: None,
                },
            },
        }
    }
}
