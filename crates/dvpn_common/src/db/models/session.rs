use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, SqliteExecutor, query, query_as, query_scalar, sqlite::SqliteRow};

use crate::db::{Id, NoId, models::ModelError};

/// Address value marking a session as closed and pending deletion.
pub const CLOSED_ADDRESS: &str = "";

/// A billable VPN session binding a peer key to a subscription quota.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Session<I = NoId> {
    pub id: I,
    // WireGuard public key of the peer
    pub key: String,
    // chain account the session is billed to, empty once closed
    pub address: String,
    // bytes authorized by the subscription
    pub available: u64,
    pub upload: u64,
    pub download: u64,
    pub created_at: DateTime<Utc>,
}

impl<I> Session<I> {
    /// Closed sessions are excluded from chain updates and removed by the next sweep.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.address == CLOSED_ADDRESS
    }
}

impl fmt::Display for Session<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {} (peer {})", self.id, self.key)
    }
}

// SQLite only stores signed 64-bit integers
fn to_db_counter(value: u64) -> Result<i64, ModelError> {
    i64::try_from(value).map_err(|_| ModelError::CounterOutOfRange(value))
}

fn from_db_counter(row: &SqliteRow, column: &str) -> Result<u64, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })
}

impl FromRow<'_, SqliteRow> for Session<Id> {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            address: row.try_get("address")?,
            available: from_db_counter(row, "available")?,
            upload: from_db_counter(row, "upload")?,
            download: from_db_counter(row, "download")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Session {
    #[must_use]
    pub fn new<K: Into<String>, A: Into<String>>(key: K, address: A, available: u64) -> Self {
        Self {
            id: NoId,
            key: key.into(),
            address: address.into(),
            available,
            upload: 0,
            download: 0,
            created_at: Utc::now(),
        }
    }

    pub async fn save<'e, E>(self, executor: E) -> Result<Session<Id>, ModelError>
    where
        E: SqliteExecutor<'e>,
    {
        let id = query_scalar::<_, Id>(
            "INSERT INTO session (key, address, available, upload, download, created_at) \
            VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&self.key)
        .bind(&self.address)
        .bind(to_db_counter(self.available)?)
        .bind(to_db_counter(self.upload)?)
        .bind(to_db_counter(self.download)?)
        .bind(self.created_at)
        .fetch_one(executor)
        .await?;

        Ok(Session {
            id,
            key: self.key,
            address: self.address,
            available: self.available,
            upload: self.upload,
            download: self.download,
            created_at: self.created_at,
        })
    }
}

impl Session<Id> {
    pub async fn find_by_id<'e, E>(executor: E, id: Id) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_as("SELECT * FROM session WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Find the active (not closed) session for a given peer key.
    pub async fn find_active_by_key<'e, E>(
        executor: E,
        key: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_as("SELECT * FROM session WHERE key = ? AND address != '' LIMIT 1")
            .bind(key)
            .fetch_optional(executor)
            .await
    }

    /// All sessions in insertion order, closed ones included.
    pub async fn all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_as("SELECT * FROM session ORDER BY id")
            .fetch_all(executor)
            .await
    }

    /// Overwrite traffic counters of an active session.
    ///
    /// Closed sessions are left untouched. Returns `true` if a row was updated.
    pub async fn update_counters<'e, E>(
        executor: E,
        id: Id,
        upload: u64,
        download: u64,
    ) -> Result<bool, ModelError>
    where
        E: SqliteExecutor<'e>,
    {
        let result = query(
            "UPDATE session SET upload = ?, download = ? WHERE id = ? AND address != ''",
        )
        .bind(to_db_counter(upload)?)
        .bind(to_db_counter(download)?)
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_address<'e, E>(executor: E, id: Id, address: &str) -> Result<(), ModelError>
    where
        E: SqliteExecutor<'e>,
    {
        let result = query("UPDATE session SET address = ? WHERE id = ?")
            .bind(address)
            .bind(id)
            .execute(executor)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ModelError::NotFound(id));
        }

        Ok(())
    }

    /// Mark the session as closed so the next sweep deletes it.
    pub async fn close<'e, E>(executor: E, id: Id) -> Result<(), ModelError>
    where
        E: SqliteExecutor<'e>,
    {
        Self::set_address(executor, id, CLOSED_ADDRESS).await
    }

    /// Delete all closed sessions. Returns the number of removed rows.
    pub async fn delete_closed<'e, E>(executor: E) -> Result<u64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = query("DELETE FROM session WHERE address = ''")
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
