use thiserror::Error;

use crate::db::Id;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("Byte counter {0} exceeds the storable range")]
    CounterOutOfRange(u64),
    #[error("Session with ID {0} does not exist")]
    NotFound(Id),
}
