//! SQLite-backed implementation of the bridge store contract.

use {async_trait::async_trait, sqlx::SqlitePool};

use crate::{
    Error, Result,
    contract::{InstanceStore, MessageHistory, TopologyStore},
    entities::{
        ConnectionRecord, MessageRecord, NewMessage, NewServiceInstance, NewThread,
        ServiceInstanceRecord, ThreadRecord,
    },
};

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: i64,
    module_name: String,
    instance_name: String,
    configured: i64,
    enabled: i64,
    primary_mode: i64,
    config: String,
}

impl TryFrom<InstanceRow> for ServiceInstanceRecord {
    type Error = Error;

    fn try_from(r: InstanceRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            module_name: r.module_name,
            instance_name: r.instance_name,
            configured: r.configured != 0,
            enabled: r.enabled != 0,
            primary_mode: r.primary_mode != 0,
            config: serde_json::from_str(&r.config)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ThreadRow {
    id: i64,
    external_id: String,
    name: String,
    service_id: i64,
    connection_id: i64,
}

impl From<ThreadRow> for ThreadRecord {
    fn from(r: ThreadRow) -> Self {
        Self {
            id: r.id,
            external_id: r.external_id,
            name: r.name,
            service_id: r.service_id,
            connection_id: r.connection_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    content: String,
    attachments: String,
    author_username: String,
    author_external_id: String,
    author_avatar_url: Option<String>,
    origin_service_id: i64,
    origin_thread_id: i64,
    connection_id: i64,
    created_at: i64,
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            content: r.content,
            attachments: serde_json::from_str(&r.attachments)?,
            author_username: r.author_username,
            author_external_id: r.author_external_id,
            author_avatar_url: r.author_avatar_url,
            origin_service_id: r.origin_service_id,
            origin_thread_id: r.origin_thread_id,
            connection_id: r.connection_id,
            created_at: r.created_at,
        })
    }
}

/// SQLite-backed bridge store.
pub struct SqliteBridgeStore {
    pool: SqlitePool,
}

impl SqliteBridgeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist. Called once at startup and by
    /// tests that use in-memory databases.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS service_instances (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                module_name   TEXT    NOT NULL,
                instance_name TEXT    NOT NULL,
                configured    INTEGER NOT NULL DEFAULT 0,
                enabled       INTEGER NOT NULL DEFAULT 1,
                primary_mode  INTEGER NOT NULL DEFAULT 0,
                config        TEXT    NOT NULL DEFAULT '{}',
                UNIQUE (module_name, instance_name)
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS connections (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT    NOT NULL UNIQUE
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS threads (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id   TEXT    NOT NULL,
                name          TEXT    NOT NULL,
                service_id    INTEGER NOT NULL,
                connection_id INTEGER NOT NULL,
                UNIQUE (service_id, connection_id, external_id)
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                content            TEXT    NOT NULL,
                attachments        TEXT    NOT NULL DEFAULT '[]',
                author_username    TEXT    NOT NULL,
                author_external_id TEXT    NOT NULL,
                author_avatar_url  TEXT,
                origin_service_id  INTEGER NOT NULL,
                origin_thread_id   INTEGER NOT NULL,
                connection_id      INTEGER NOT NULL,
                created_at         INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for SqliteBridgeStore {
    async fn list_instances(&self) -> Result<Vec<ServiceInstanceRecord>> {
        let rows =
            sqlx::query_as::<_, InstanceRow>("SELECT * FROM service_instances ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_enabled_instances(&self) -> Result<Vec<ServiceInstanceRecord>> {
        let rows = sqlx::query_as::<_, InstanceRow>(
            "SELECT * FROM service_instances WHERE enabled = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_instance(&self, id: i64) -> Result<Option<ServiceInstanceRecord>> {
        let row = sqlx::query_as::<_, InstanceRow>("SELECT * FROM service_instances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_instance_by_name(
        &self,
        module_name: &str,
        instance_name: &str,
    ) -> Result<Option<ServiceInstanceRecord>> {
        let row = sqlx::query_as::<_, InstanceRow>(
            "SELECT * FROM service_instances WHERE module_name = ? AND instance_name = ?",
        )
        .bind(module_name)
        .bind(instance_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create_instance(&self, instance: NewServiceInstance) -> Result<ServiceInstanceRecord> {
        if self
            .find_instance_by_name(&instance.module_name, &instance.instance_name)
            .await?
            .is_some()
        {
            return Err(Error::conflict(
                "service instance",
                format!("{}/{}", instance.module_name, instance.instance_name),
            ));
        }

        let config_json = serde_json::to_string(&instance.config)?;
        let result = sqlx::query(
            r#"INSERT INTO service_instances
               (module_name, instance_name, configured, enabled, primary_mode, config)
               VALUES (?, ?, 1, ?, ?, ?)"#,
        )
        .bind(&instance.module_name)
        .bind(&instance.instance_name)
        .bind(instance.enabled as i64)
        .bind(instance.primary_mode as i64)
        .bind(&config_json)
        .execute(&self.pool)
        .await?;

        Ok(ServiceInstanceRecord {
            id: result.last_insert_rowid(),
            module_name: instance.module_name,
            instance_name: instance.instance_name,
            configured: true,
            enabled: instance.enabled,
            primary_mode: instance.primary_mode,
            config: instance.config,
        })
    }

    async fn set_instance_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let result = sqlx::query("UPDATE service_instances SET enabled = ? WHERE id = ?")
            .bind(enabled as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("service instance", id));
        }
        Ok(())
    }

    async fn set_instance_config(&self, id: i64, config: serde_json::Value) -> Result<()> {
        let config_json = serde_json::to_string(&config)?;
        let result =
            sqlx::query("UPDATE service_instances SET config = ?, configured = 1 WHERE id = ?")
                .bind(&config_json)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("service instance", id));
        }
        Ok(())
    }

    async fn remove_instance(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM threads WHERE service_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM service_instances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("service instance", id));
        }
        Ok(())
    }
}

#[async_trait]
impl TopologyStore for SqliteBridgeStore {
    async fn list_connections(&self) -> Result<Vec<ConnectionRecord>> {
        let rows = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM connections ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| ConnectionRecord { id, name })
            .collect())
    }

    async fn find_connection_by_name(&self, name: &str) -> Result<Option<ConnectionRecord>> {
        let row = sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM connections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, name)| ConnectionRecord { id, name }))
    }

    async fn create_connection(&self, name: &str) -> Result<ConnectionRecord> {
        if self.find_connection_by_name(name).await?.is_some() {
            return Err(Error::conflict("connection", name));
        }
        let result = sqlx::query("INSERT INTO connections (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(ConnectionRecord {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    async fn remove_connection(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM threads WHERE connection_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("connection", id));
        }
        Ok(())
    }

    async fn find_thread(
        &self,
        service_id: i64,
        external_id: &str,
    ) -> Result<Option<ThreadRecord>> {
        let row = sqlx::query_as::<_, ThreadRow>(
            "SELECT * FROM threads WHERE service_id = ? AND external_id = ?",
        )
        .bind(service_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn threads_of_connection(&self, connection_id: i64) -> Result<Vec<ThreadRecord>> {
        let rows =
            sqlx::query_as::<_, ThreadRow>("SELECT * FROM threads WHERE connection_id = ? ORDER BY id")
                .bind(connection_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_thread(&self, thread: NewThread) -> Result<ThreadRecord> {
        // A thread belongs to at most one connection at a time.
        if self
            .find_thread(thread.service_id, &thread.external_id)
            .await?
            .is_some()
        {
            return Err(Error::conflict("thread", &thread.external_id));
        }
        let result = sqlx::query(
            "INSERT INTO threads (external_id, name, service_id, connection_id) VALUES (?, ?, ?, ?)",
        )
        .bind(&thread.external_id)
        .bind(&thread.name)
        .bind(thread.service_id)
        .bind(thread.connection_id)
        .execute(&self.pool)
        .await?;
        Ok(ThreadRecord {
            id: result.last_insert_rowid(),
            external_id: thread.external_id,
            name: thread.name,
            service_id: thread.service_id,
            connection_id: thread.connection_id,
        })
    }

    async fn remove_thread(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("thread", id));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHistory for SqliteBridgeStore {
    async fn append_message(&self, message: NewMessage) -> Result<MessageRecord> {
        let attachments_json = serde_json::to_string(&message.attachments)?;
        let result = sqlx::query(
            r#"INSERT INTO messages
               (content, attachments, author_username, author_external_id, author_avatar_url,
                origin_service_id, origin_thread_id, connection_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&message.content)
        .bind(&attachments_json)
        .bind(&message.author_username)
        .bind(&message.author_external_id)
        .bind(&message.author_avatar_url)
        .bind(message.origin_service_id)
        .bind(message.origin_thread_id)
        .bind(message.connection_id)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(MessageRecord {
            id: result.last_insert_rowid(),
            content: message.content,
            attachments: message.attachments,
            author_username: message.author_username,
            author_external_id: message.author_external_id,
            author_avatar_url: message.author_avatar_url,
            origin_service_id: message.origin_service_id,
            origin_thread_id: message.origin_thread_id,
            connection_id: message.connection_id,
            created_at: message.created_at,
        })
    }

    async fn recent_messages(&self, connection_id: i64, limit: u32) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE connection_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(connection_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
