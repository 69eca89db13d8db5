use dvpn_common::db::{
    Id,
    models::{ModelError, Session},
};
use sqlx::SqlitePool;

/// Durable record of sessions served by this node.
///
/// Every mutation targets a single row by primary key so concurrent jobs never
/// overwrite each other's changes.
#[trait_variant::make(Send)]
pub trait SessionLedger {
    /// Active session for a given peer key, closed sessions are ignored.
    async fn find_by_key(&self, key: &str) -> Result<Option<Session<Id>>, ModelError>;

    /// All sessions in insertion order.
    async fn find_all(&self) -> Result<Vec<Session<Id>>, ModelError>;

    /// Overwrite counters of an active session. Returns `false` if the session is closed or gone.
    async fn update_counters(
        &self,
        id: Id,
        upload: u64,
        download: u64,
    ) -> Result<bool, ModelError>;

    async fn set_address(&self, id: Id, address: &str) -> Result<(), ModelError>;

    /// Delete all closed sessions, returns the number of deleted rows.
    async fn delete_closed(&self) -> Result<u64, ModelError>;
}

/// [`SessionLedger`] backed by the node database.
#[derive(Clone, Debug)]
pub struct DbSessionLedger {
    pool: SqlitePool,
}

impl DbSessionLedger {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SessionLedger for DbSessionLedger {
    async fn find_by_key(&self, key: &str) -> Result<Option<Session<Id>>, ModelError> {
        Ok(Session::find_active_by_key(&self.pool, key).await?)
    }

    async fn find_all(&self) -> Result<Vec<Session<Id>>, ModelError> {
        Ok(Session::all(&self.pool).await?)
    }

    async fn update_counters(
        &self,
        id: Id,
        upload: u64,
        download: u64,
    ) -> Result<bool, ModelError> {
        Session::update_counters(&self.pool, id, upload, download).await
    }

    async fn set_address(&self, id: Id, address: &str) -> Result<(), ModelError> {
        Session::set_address(&self.pool, id, address).await
    }

    async fn delete_closed(&self) -> Result<u64, ModelError> {
        Ok(Session::delete_closed(&self.pool).await?)
    }
}
