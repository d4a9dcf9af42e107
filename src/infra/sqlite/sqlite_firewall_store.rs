// SQLite-backed firewall store.
//
// Tables:
// - users: Accounts the firewall can block
// - contents: Root and child contents
// - events: Append-only event ledger
// - balance_operations: Append-only point ledger
// - firewall_snapshots: Pre-block state of every blocked entity
//
// The pool holds a single connection, so transactions are serialized and a
// count-then-block sequence can never interleave with another one.

use crate::core::content::{
    AccountStatus, BlockedSnapshot, Content, ContentKind, ContentStatus, UserAccount,
};
use crate::core::events::{Event, EventMetadata, EventType};
use crate::core::firewall::{FirewallError, FirewallStore, FirewallTx};
use crate::core::ledger::{BalanceType, ContentContribution, LedgerEntry};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use std::net::IpAddr;
use std::path::Path;
use uuid::Uuid;

const CONTENT_COLUMNS: &str = "id, owner_id, parent_id, slug, title, status, \
    created_at, updated_at, published_at, deleted_at";
const USER_COLUMNS: &str =
    "id, username, email, notifications, features, status, created_at, updated_at";
const EVENT_COLUMNS: &str = "id, type, originator_user_id, originator_ip, metadata, created_at";
const ENTRY_COLUMNS: &str =
    "id, balance_type, recipient_id, amount, content_id, originator_event_id, created_at";

pub struct SqliteFirewallStore {
    pool: Pool<Sqlite>,
}

impl SqliteFirewallStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        // An in-memory database lives exactly as long as its connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&conn_str)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// A private database that disappears with the store.
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT NOT NULL,
                notifications BOOLEAN NOT NULL DEFAULT 1,
                features TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username
                ON users(lower(username));
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                parent_id TEXT,
                slug TEXT,
                title TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                published_at TEXT,
                deleted_at TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_contents_owner_slug
                ON contents(owner_id, slug);
            CREATE INDEX IF NOT EXISTS idx_contents_owner_created
                ON contents(owner_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        // related_event_id is NULL for everything but moderation events, and
        // NULLs never collide in a unique index
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                originator_user_id TEXT,
                originator_ip TEXT NOT NULL,
                metadata TEXT NOT NULL,
                related_event_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_related
                ON events(related_event_id);
            CREATE INDEX IF NOT EXISTS idx_events_type_ip
                ON events(type, originator_ip, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balance_operations (
                id TEXT PRIMARY KEY,
                balance_type TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                content_id TEXT,
                originator_event_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_balance_operations_recipient
                ON balance_operations(recipient_id);
            CREATE INDEX IF NOT EXISTS idx_balance_operations_originator
                ON balance_operations(originator_event_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS firewall_snapshots (
                event_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                prior_status TEXT NOT NULL,
                prior_deleted_at TEXT,
                prior_updated_at TEXT NOT NULL,
                PRIMARY KEY (event_id, entity_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Both ledgers are append-only
        for table in ["events", "balance_operations"] {
            for operation in ["UPDATE", "DELETE"] {
                let trigger = format!(
                    r#"
                    CREATE TRIGGER IF NOT EXISTS {table}_no_{op}
                    BEFORE {operation} ON {table}
                    BEGIN
                        SELECT RAISE(ABORT, '{table} is append-only');
                    END;
                    "#,
                    table = table,
                    op = operation.to_lowercase(),
                    operation = operation,
                );
                sqlx::query(&trigger).execute(&self.pool).await?;
            }
        }

        Ok(())
    }
}

// ============================================================================
// STORE
// ============================================================================

#[async_trait]
impl FirewallStore for SqliteFirewallStore {
    type Tx = SqliteFirewallTx;

    async fn begin(&self) -> Result<Self::Tx, FirewallError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(SqliteFirewallTx { tx })
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, FirewallError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_event(&mut conn, id).await
    }

    async fn find_content(&self, id: Uuid) -> Result<Option<Content>, FirewallError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_content(&mut conn, id).await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserAccount>, FirewallError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_user(&mut conn, id).await
    }

    async fn contents_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Content>, FirewallError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_contents(&mut conn, ids).await
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<UserAccount>, FirewallError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_users(&mut conn, ids).await
    }

    async fn balance(&self, recipient_id: Uuid) -> Result<i64, FirewallError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM balance_operations
            WHERE recipient_id = ?
            "#,
        )
        .bind(recipient_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.try_get("total").map_err(db_err)
    }

    async fn entries_for(&self, recipient_id: Uuid) -> Result<Vec<LedgerEntry>, FirewallError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM balance_operations WHERE recipient_id = ? ORDER BY created_at, id",
            ENTRY_COLUMNS
        ))
        .bind(recipient_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn events_of_type(&self, event_type: EventType) -> Result<Vec<Event>, FirewallError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM events WHERE type = ? ORDER BY created_at, id",
            EVENT_COLUMNS
        ))
        .bind(event_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(event_from_row).collect()
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

pub struct SqliteFirewallTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl FirewallTx for SqliteFirewallTx {
    async fn recent_contents(
        &mut self,
        owner_id: Uuid,
        kind: ContentKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<Content>, FirewallError> {
        let parent_filter = match kind {
            ContentKind::Root => "parent_id IS NULL",
            ContentKind::Child => "parent_id IS NOT NULL",
        };
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM contents
            WHERE owner_id = ? AND {} AND created_at >= ? AND status != 'firewall'
            ORDER BY created_at, id
            "#,
            CONTENT_COLUMNS, parent_filter
        ))
        .bind(owner_id.to_string())
        .bind(ts(&since))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter().map(content_from_row).collect()
    }

    async fn insert_content(&mut self, content: &Content) -> Result<(), FirewallError> {
        sqlx::query(
            r#"
            INSERT INTO contents (id, owner_id, parent_id, slug, title, status,
                                  created_at, updated_at, published_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(content.id.to_string())
        .bind(content.owner_id.to_string())
        .bind(content.parent_id.map(|id| id.to_string()))
        .bind(&content.slug)
        .bind(&content.title)
        .bind(content.status.as_str())
        .bind(ts(&content.created_at))
        .bind(ts(&content.updated_at))
        .bind(content.published_at.as_ref().map(ts))
        .bind(content.deleted_at.as_ref().map(ts))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn slug_taken(&mut self, owner_id: Uuid, slug: &str) -> Result<bool, FirewallError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM contents WHERE owner_id = ? AND slug = ?")
            .bind(owner_id.to_string())
            .bind(slug)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
        let n: i64 = row.try_get("n").map_err(db_err)?;
        Ok(n > 0)
    }

    async fn contents_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<Content>, FirewallError> {
        fetch_contents(&mut self.tx, ids).await
    }

    async fn update_content_state(
        &mut self,
        id: Uuid,
        status: ContentStatus,
        deleted_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), FirewallError> {
        let result = sqlx::query(
            "UPDATE contents SET status = ?, deleted_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(deleted_at.as_ref().map(ts))
        .bind(ts(&updated_at))
        .bind(id.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(FirewallError::NotFound(format!("content {}", id)));
        }
        Ok(())
    }

    async fn recent_signups(
        &mut self,
        ip: IpAddr,
        since: DateTime<Utc>,
    ) -> Result<Vec<UserAccount>, FirewallError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.username, u.email, u.notifications, u.features, u.status,
                   u.created_at, u.updated_at
            FROM events e
            JOIN users u ON u.id = json_extract(e.metadata, '$.id')
            WHERE e.type = 'create:user'
              AND e.originator_ip = ?
              AND e.created_at >= ?
              AND u.status != 'firewall'
            ORDER BY e.created_at, e.id
            "#,
        )
        .bind(ip.to_string())
        .bind(ts(&since))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter().map(user_from_row).collect()
    }

    async fn insert_user(&mut self, user: &UserAccount) -> Result<(), FirewallError> {
        let features = serde_json::to_string(&user.features)
            .map_err(|e| FirewallError::StorageError(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, notifications, features, status,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.notifications)
        .bind(features)
        .bind(user.status.as_str())
        .bind(ts(&user.created_at))
        .bind(ts(&user.updated_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn username_taken(&mut self, username: &str) -> Result<bool, FirewallError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM users WHERE lower(username) = lower(?)")
            .bind(username)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
        let n: i64 = row.try_get("n").map_err(db_err)?;
        Ok(n > 0)
    }

    async fn users_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<UserAccount>, FirewallError> {
        fetch_users(&mut self.tx, ids).await
    }

    async fn update_user_status(
        &mut self,
        id: Uuid,
        status: AccountStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), FirewallError> {
        let result = sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(ts(&updated_at))
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(FirewallError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }

    async fn save_snapshot(&mut self, snapshot: &BlockedSnapshot) -> Result<(), FirewallError> {
        sqlx::query(
            r#"
            INSERT INTO firewall_snapshots (event_id, entity_id, prior_status,
                                            prior_deleted_at, prior_updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.event_id.to_string())
        .bind(snapshot.entity_id.to_string())
        .bind(&snapshot.prior_status)
        .bind(snapshot.prior_deleted_at.as_ref().map(ts))
        .bind(ts(&snapshot.prior_updated_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn snapshots_for(
        &mut self,
        event_id: Uuid,
    ) -> Result<Vec<BlockedSnapshot>, FirewallError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, entity_id, prior_status, prior_deleted_at, prior_updated_at
            FROM firewall_snapshots
            WHERE event_id = ?
            "#,
        )
        .bind(event_id.to_string())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(BlockedSnapshot {
                    event_id: get_uuid(row, "event_id")?,
                    entity_id: get_uuid(row, "entity_id")?,
                    prior_status: row.try_get("prior_status").map_err(db_err)?,
                    prior_deleted_at: get_opt_ts(row, "prior_deleted_at")?,
                    prior_updated_at: get_ts(row, "prior_updated_at")?,
                })
            })
            .collect()
    }

    async fn content_contribution(
        &mut self,
        content_id: Uuid,
        owner_id: Uuid,
    ) -> Result<ContentContribution, FirewallError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE((SELECT SUM(amount) FROM balance_operations
                          WHERE balance_type = ? AND recipient_id = ?), 0)
                    AS content_net,
                COALESCE((SELECT SUM(amount) FROM balance_operations
                          WHERE balance_type = ? AND recipient_id = ?
                            AND content_id = ?), 0)
                    AS owner_net
            "#,
        )
        .bind(BalanceType::ContentPoints.as_str())
        .bind(content_id.to_string())
        .bind(BalanceType::UserPoints.as_str())
        .bind(owner_id.to_string())
        .bind(content_id.to_string())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;

        Ok(ContentContribution {
            content_id,
            owner_id,
            content_net: row.try_get("content_net").map_err(db_err)?,
            owner_net: row.try_get("owner_net").map_err(db_err)?,
        })
    }

    async fn insert_entry(&mut self, entry: &LedgerEntry) -> Result<(), FirewallError> {
        sqlx::query(
            r#"
            INSERT INTO balance_operations (id, balance_type, recipient_id, amount, content_id,
                                            originator_event_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.balance_type.as_str())
        .bind(entry.recipient_id.to_string())
        .bind(entry.amount)
        .bind(entry.content_id.map(|id| id.to_string()))
        .bind(entry.originator_event_id.to_string())
        .bind(ts(&entry.created_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn entries_originated_by(
        &mut self,
        event_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, FirewallError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM balance_operations
            WHERE originator_event_id = ?
            ORDER BY created_at, id
            "#,
            ENTRY_COLUMNS
        ))
        .bind(event_id.to_string())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn append_event(&mut self, event: &Event) -> Result<(), FirewallError> {
        let metadata = serde_json::to_string(&event.metadata)
            .map_err(|e| FirewallError::StorageError(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO events (id, type, originator_user_id, originator_ip, metadata,
                                related_event_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.event_type.as_str())
        .bind(event.originator_user_id.map(|id| id.to_string()))
        .bind(event.originator_ip.to_string())
        .bind(metadata)
        .bind(event.related_event().map(|id| id.to_string()))
        .bind(ts(&event.created_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_event(&mut self, id: Uuid) -> Result<Option<Event>, FirewallError> {
        fetch_event(&mut self.tx, id).await
    }

    async fn find_resolution(
        &mut self,
        firewall_event_id: Uuid,
    ) -> Result<Option<Event>, FirewallError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM events WHERE related_event_id = ?",
            EVENT_COLUMNS
        ))
        .bind(firewall_event_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn commit(self) -> Result<(), FirewallError> {
        self.tx.commit().await.map_err(db_err)
    }
}

// ============================================================================
// QUERIES SHARED BY STORE AND TRANSACTION
// ============================================================================

async fn fetch_content(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<Content>, FirewallError> {
    let row = sqlx::query(&format!("SELECT {} FROM contents WHERE id = ?", CONTENT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(content_from_row).transpose()
}

async fn fetch_contents(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
) -> Result<Vec<Content>, FirewallError> {
    let mut contents = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(content) = fetch_content(conn, *id).await? {
            contents.push(content);
        }
    }
    Ok(contents)
}

async fn fetch_user(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<UserAccount>, FirewallError> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(user_from_row).transpose()
}

async fn fetch_users(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
) -> Result<Vec<UserAccount>, FirewallError> {
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(user) = fetch_user(conn, *id).await? {
            users.push(user);
        }
    }
    Ok(users)
}

async fn fetch_event(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<Event>, FirewallError> {
    let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(event_from_row).transpose()
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn db_err(e: sqlx::Error) -> FirewallError {
    FirewallError::StorageError(e.to_string())
}

/// Fixed-width RFC 3339, so text order is time order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, FirewallError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FirewallError::StorageError(format!("bad timestamp {}: {}", raw, e)))
}

fn get_ts(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, FirewallError> {
    let raw: String = row.try_get(column).map_err(db_err)?;
    parse_ts(&raw)
}

fn get_opt_ts(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, FirewallError> {
    let raw: Option<String> = row.try_get(column).map_err(db_err)?;
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid, FirewallError> {
    Uuid::parse_str(raw).map_err(|e| FirewallError::StorageError(format!("bad id {}: {}", raw, e)))
}

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, FirewallError> {
    let raw: String = row.try_get(column).map_err(db_err)?;
    parse_uuid(&raw)
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, FirewallError> {
    let raw: Option<String> = row.try_get(column).map_err(db_err)?;
    raw.as_deref().map(parse_uuid).transpose()
}

fn content_from_row(row: &SqliteRow) -> Result<Content, FirewallError> {
    let status: String = row.try_get("status").map_err(db_err)?;
    Ok(Content {
        id: get_uuid(row, "id")?,
        owner_id: get_uuid(row, "owner_id")?,
        parent_id: get_opt_uuid(row, "parent_id")?,
        slug: row.try_get("slug").map_err(db_err)?,
        title: row.try_get("title").map_err(db_err)?,
        status: status.parse().map_err(FirewallError::StorageError)?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
        published_at: get_opt_ts(row, "published_at")?,
        deleted_at: get_opt_ts(row, "deleted_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<UserAccount, FirewallError> {
    let status: String = row.try_get("status").map_err(db_err)?;
    let features: String = row.try_get("features").map_err(db_err)?;
    Ok(UserAccount {
        id: get_uuid(row, "id")?,
        username: row.try_get("username").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        notifications: row.try_get("notifications").map_err(db_err)?,
        features: serde_json::from_str(&features)
            .map_err(|e| FirewallError::StorageError(e.to_string()))?,
        status: status.parse().map_err(FirewallError::StorageError)?,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<Event, FirewallError> {
    let event_type: String = row.try_get("type").map_err(db_err)?;
    let ip: String = row.try_get("originator_ip").map_err(db_err)?;
    let metadata: String = row.try_get("metadata").map_err(db_err)?;
    Ok(Event {
        id: get_uuid(row, "id")?,
        event_type: event_type.parse().map_err(FirewallError::StorageError)?,
        originator_user_id: get_opt_uuid(row, "originator_user_id")?,
        originator_ip: ip
            .parse()
            .map_err(|_| FirewallError::StorageError(format!("bad ip {}", ip)))?,
        metadata: serde_json::from_str::<EventMetadata>(&metadata)
            .map_err(|e| FirewallError::StorageError(e.to_string()))?,
        created_at: get_ts(row, "created_at")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, FirewallError> {
    let balance_type: String = row.try_get("balance_type").map_err(db_err)?;
    Ok(LedgerEntry {
        id: get_uuid(row, "id")?,
        balance_type: balance_type.parse().map_err(FirewallError::StorageError)?,
        recipient_id: get_uuid(row, "recipient_id")?,
        amount: row.try_get("amount").map_err(db_err)?,
        content_id: get_opt_uuid(row, "content_id")?,
        originator_event_id: get_uuid(row, "originator_event_id")?,
        created_at: get_ts(row, "created_at")?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
