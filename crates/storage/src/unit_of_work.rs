use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::StorageError;

/// A transaction scoped to one multi-statement write.
///
/// Nothing is persisted unless [`UnitOfWork::commit`] is called. Dropping the
/// value on any other path (an early `?` return, a panic unwinding through the
/// caller) rolls the transaction back and hands the connection back to the pool.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    /// Waits at most the pool's acquire timeout for a connection.
    pub(crate) async fn begin(pool: &SqlitePool) -> Result<Self, StorageError> {
        let tx = pool.begin().await?;
        Ok(Self { tx })
    }

    pub(crate) fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }
}
