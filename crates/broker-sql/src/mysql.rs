use async_trait::async_trait;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::{Connection, Executor, MySqlConnection};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::SqlError;
use crate::facade::{SqlEngine, SqlSession};
use crate::identifiers::{BINDING_USER_PREFIX, binding_user_name, is_safe_identifier};
use crate::password::{MasterPasswordSeed, binding_password, binding_username};

pub struct MysqlEngine {
    seed: MasterPasswordSeed,
}

impl MysqlEngine {
    pub fn new(seed: MasterPasswordSeed) -> Self {
        Self { seed }
    }
}

fn map_connect_error(err: sqlx::Error, username: &str, db_name: &str) -> SqlError {
    if let sqlx::Error::Database(ref db_err) = err {
        // 1045 ER_ACCESS_DENIED_ERROR
        if db_err.code().as_deref() == Some("1045") {
            return SqlError::LoginFailed {
                username: username.to_string(),
                database: db_name.to_string(),
            };
        }
    }
    SqlError::Engine(err)
}

#[async_trait]
impl SqlEngine for MysqlEngine {
    async fn open(
        &self,
        address: &str,
        port: u16,
        db_name: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn SqlSession>, SqlError> {
        let options = MySqlConnectOptions::new()
            .host(address)
            .port(port)
            .database(db_name)
            .username(username)
            .password(password);

        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| map_connect_error(e, username, db_name))?;

        Ok(Box::new(MysqlSession {
            conn: Mutex::new(conn),
            seed: self.seed.clone(),
        }))
    }
}

pub struct MysqlSession {
    conn: Mutex<MySqlConnection>,
    seed: MasterPasswordSeed,
}

#[async_trait]
impl SqlSession for MysqlSession {
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
        conn.execute(
            format!("CREATE USER '{username}'@'%' IDENTIFIED BY '{password}'").as_str(),
        )
        .await?;
        conn.execute(format!("GRANT ALL PRIVILEGES ON `{db_name}`.* TO '{username}'@'%'").as_str())
            .await?;
        conn.execute("FLUSH PRIVILEGES").await?;

        info!(binding_id, username = username.as_str(), "created binding user");
        Ok((username, password))
    }

    async fn drop_user(&self, binding_id: &str) -> Result<(), SqlError> {
        let username = binding_user_name(&binding_username(&self.seed, binding_id));
        let mut conn = self.conn.lock().await;
        drop_user(&mut conn, &username).await
    }

    /// MySQL has no `CREATE EXTENSION` concept; this is a no-op by design.
    async fn create_extensions(&self, _names: &[String]) -> Result<(), SqlError> {
        Ok(())
    }

    async fn drop_extensions(&self, _names: &[String]) -> Result<(), SqlError> {
        Ok(())
    }

    async fn reset_state(&self) -> Result<(), SqlError> {
        let mut conn = self.conn.lock().await;
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT User FROM mysql.user WHERE User LIKE ?")
                .bind(format!("{BINDING_USER_PREFIX}%"))
                .fetch_all(&mut *conn)
                .await?;

        for (user,) in rows {
            drop_user(&mut conn, &user).await?;
        }
        Ok(())
    }
}

async fn drop_user(conn: &mut MySqlConnection, username: &str) -> Result<(), SqlError> {
    if !is_safe_identifier(username) {
        return Ok(());
    }
    conn.execute(format!("DROP USER IF EXISTS '{username}'@'%'").as_str())
        .await?;
    Ok(())
}
