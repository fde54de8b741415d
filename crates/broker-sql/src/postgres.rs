use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, Executor, PgConnection};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::SqlError;
use crate::facade::{SqlEngine, SqlSession};
use crate::identifiers::{BINDING_USER_PREFIX, binding_user_name, is_safe_identifier};
use crate::password::{MasterPasswordSeed, binding_password, binding_username};

pub struct PostgresEngine {
    seed: MasterPasswordSeed,
}

impl PostgresEngine {
    pub fn new(seed: MasterPasswordSeed) -> Self {
        Self { seed }
    }
}

fn is_safe_extension_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn map_connect_error(err: sqlx::Error, username: &str, db_name: &str) -> SqlError {
    if let sqlx::Error::Database(ref db_err) = err {
        // 28P01 invalid_password, 28000 invalid_authorization_specification.
        if matches!(db_err.code().as_deref(), Some("28P01") | Some("28000")) {
            return SqlError::LoginFailed {
                username: username.to_string(),
                database: db_name.to_string(),
            };
        }
    }
    SqlError::Engine(err)
}

#[async_trait]
impl SqlEngine for PostgresEngine {
    async fn open(
        &self,
        address: &str,
        port: u16,
        db_name: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn SqlSession>, SqlError> {
        let options = PgConnectOptions::new()
            .host(address)
            .port(port)
            .database(db_name)
            .username(username)
            .password(password);

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| map_connect_error(e, username, db_name))?;

        Ok(Box::new(PostgresSession {
            conn: Mutex::new(conn),
            seed: self.seed.clone(),
        }))
    }
}

pub struct PostgresSession {
    conn: Mutex<PgConnection>,
    seed: MasterPasswordSeed,
}

#[async_trait]
impl SqlSession for PostgresSession {
    async fn close(self: Box<Self>) -> Result<(), SqlError> {
        self.conn.into_inner().close().await?;
        Ok(())
    }

    async fn create_user(
        &self,
        binding_id: &str,
        db_name: &str,
    ) -> Result<(String, String), SqlError> {
        let username = binding_user_name(&binding_username(&self.seed, binding_id));
        let password = binding_password(&self.seed, binding_id, db_name);
        debug_assert!(is_safe_identifier(&username));

        let mut conn = self.conn.lock().await;
        conn.execute(format!("CREATE ROLE \"{username}\" LOGIN PASSWORD '{password}'").as_str())
            .await?;
        conn.execute(
            format!("GRANT ALL PRIVILEGES ON DATABASE \"{db_name}\" TO \"{username}\"").as_str(),
        )
        .await?;

        info!(binding_id, username = username.as_str(), "created binding user");
        Ok((username, password))
    }

    async fn drop_user(&self, binding_id: &str) -> Result<(), SqlError> {
        let username = binding_user_name(&binding_username(&self.seed, binding_id));
        let mut conn = self.conn.lock().await;
        drop_role(&mut conn, &username).await
    }

    async fn create_extensions(&self, names: &[String]) -> Result<(), SqlError> {
        let mut conn = self.conn.lock().await;
        for name in names {
            if !is_safe_extension_name(name) {
                warn!(extension = name.as_str(), "refusing unsafe extension name");
                continue;
            }
            conn.execute(format!("CREATE EXTENSION IF NOT EXISTS \"{name}\"").as_str())
                .await?;
        }
        Ok(())
    }

    async fn drop_extensions(&self, names: &[String]) -> Result<(), SqlError> {
        let mut conn = self.conn.lock().await;
        for name in names {
            if !is_safe_extension_name(name) {
                continue;
            }
            conn.execute(format!("DROP EXTENSION IF EXISTS \"{name}\"").as_str())
                .await?;
        }
        Ok(())
    }

    async fn reset_state(&self) -> Result<(), SqlError> {
        let mut conn = self.conn.lock().await;
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT rolname FROM pg_roles WHERE rolname LIKE $1")
                .bind(format!("{BINDING_USER_PREFIX}%"))
                .fetch_all(&mut *conn)
                .await?;

        for (rolname,) in rows {
            drop_role(&mut conn, &rolname).await?;
        }
        Ok(())
    }
}

async fn drop_role(conn: &mut PgConnection, rolname: &str) -> Result<(), SqlError> {
    if !is_safe_identifier(rolname) {
        return Ok(());
    }
    // ownership must be cleared before DROP ROLE will succeed.
    let _ = conn
        .execute(format!("REASSIGN OWNED BY \"{rolname}\" TO CURRENT_USER").as_str())
        .await;
    let _ = conn
        .execute(format!("DROP OWNED BY \"{rolname}\"").as_str())
        .await;
    conn.execute(format!("DROP ROLE IF EXISTS \"{rolname}\"").as_str())
        .await?;
    Ok(())
}
