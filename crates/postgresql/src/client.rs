//! PostgreSQL client utilities
//!
//! A fixed set of clients handed out round-robin. Each client is used by one
//! caller at a time.

use std::sync::atomic::{AtomicUsize, Ordering};
use sync_core::StoreError;
use tokio::sync::{Mutex, MutexGuard};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

use crate::config::PostgresConfig;

/// Round-robin pool of connected clients.
pub struct ClientPool {
    clients: Vec<Mutex<Client>>,
    next: AtomicUsize,
}

impl ClientPool {
    /// Open `pool.max_size` connections (at least one) and probe each with `SELECT 1`.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pg_config = config
            .to_pg_config()
            .map_err(|e| StoreError::Connection(format!("invalid PostgreSQL configuration: {e}")))?;
        let size = config.pool.max_size.max(1);
        let timeout = config.pool.connect_timeout();

        let mut clients = Vec::with_capacity(size);
        for n in 0..size {
            let connecting = pg_config.connect(NoTls);
            let (client, connection) = tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| {
                    StoreError::Connection(format!(
                        "timed out connecting to PostgreSQL at {}",
                        config.describe()
                    ))
                })?
                .map_err(|e| StoreError::Connection(e.to_string()))?;

            // Spawn connection handler
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("PostgreSQL connection error: {e}");
                }
            });

            client
                .simple_query("SELECT 1")
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            debug!("PostgreSQL client {n} connected");
            clients.push(Mutex::new(client));
        }

        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    /// Take the next client in rotation, waiting if it is busy.
    pub async fn acquire(&self) -> MutexGuard<'_, Client> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients[index].lock().await
    }

    pub fn size(&self) -> usize {
        self.clients.len()
    }
}
