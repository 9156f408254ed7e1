use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use shared::{
    domain::{ConversationId, MemberRole, UserId},
    protocol::UserSummary,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use tracing::debug;

mod conversations;
mod error;
mod messages;
mod unit_of_work;

pub use conversations::StoredMember;
pub use error::StorageError;
pub use messages::{AppendedMessage, MAX_PAGE_SIZE};
pub use unit_of_work::UnitOfWork;

#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl StorageOptions {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount<'a> {
    pub username: &'a str,
    pub firstname: Option<&'a str>,
    pub lastname: Option<&'a str>,
    pub is_admin: bool,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        Self::connect(StorageOptions::new(database_url)).await
    }

    pub async fn connect(options: StorageOptions) -> Result<Self, StorageError> {
        ensure_sqlite_parent_dir_exists(&options.database_url)?;

        let mut connect_options = SqliteConnectOptions::from_str(&options.database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(options.busy_timeout);
        if sqlite_path(&options.database_url).is_some() {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(max_connections = options.max_connections, "storage pool ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn unit_of_work(&self) -> Result<UnitOfWork, StorageError> {
        UnitOfWork::begin(&self.pool).await
    }

    pub async fn health_check(&self) -> Result<(), StorageError> {
        let _: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Mirrors an identity-provider account locally; existing usernames keep their id.
    pub async fn upsert_account(&self, account: NewAccount<'_>) -> Result<UserId, StorageError> {
        let rec = sqlx::query(
            "INSERT INTO accounts (username, firstname, lastname, is_admin) VALUES (?, ?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET
                firstname = excluded.firstname,
                lastname = excluded.lastname,
                is_admin = excluded.is_admin
             RETURNING id",
        )
        .bind(account.username)
        .bind(account.firstname)
        .bind(account.lastname)
        .bind(account.is_admin)
        .fetch_one(&self.pool)
        .await?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn load_account(&self, user_id: UserId) -> Result<Option<Account>, StorageError> {
        let row = sqlx::query(
            "SELECT id, username, firstname, lastname, is_admin FROM accounts WHERE id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Account {
            id: UserId(r.get::<i64, _>(0)),
            username: r.get::<String, _>(1),
            firstname: r.get::<Option<String>, _>(2),
            lastname: r.get::<Option<String>, _>(3),
            is_admin: r.get::<bool, _>(4),
        }))
    }

    pub async fn account_exists(&self, user_id: UserId) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM accounts WHERE id = ? LIMIT 1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Named accounts first by first name, then last name; blank names compare as NULL.
    pub async fn list_accounts(&self) -> Result<Vec<UserSummary>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, username, COALESCE(firstname, '') AS firstname, COALESCE(lastname, '') AS lastname
             FROM accounts
             ORDER BY
                NULLIF(TRIM(COALESCE(firstname, '')), '') ASC,
                NULLIF(TRIM(COALESCE(lastname, '')), '') ASC,
                id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| UserSummary {
                id: UserId(r.get::<i64, _>(0)),
                username: r.get::<String, _>(1),
                firstname: r.get::<String, _>(2),
                lastname: r.get::<String, _>(3),
            })
            .collect())
    }

    pub async fn is_member(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT 1 FROM conversation_members WHERE conversation_id = ? AND user_id = ? LIMIT 1",
        )
        .bind(conversation_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Idempotent: an existing membership keeps its role.
    pub async fn add_member(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        role: MemberRole,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO conversation_members (conversation_id, user_id, role) VALUES (?, ?, ?)
             ON CONFLICT(conversation_id, user_id) DO NOTHING",
        )
        .bind(conversation_id.0)
        .bind(user_id.0)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<(), StorageError> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
