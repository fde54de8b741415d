//! SQL Engine Facade: a thin, engine-agnostic interface the orchestrator
//! drives during Bind/Unbind and reconciliation. `Open` returns a scoped
//! session; every other operation is a method on that session so a single
//! connection is reused for the duration of one reconciliation tick.

use async_trait::async_trait;

use crate::error::SqlError;

#[async_trait]
pub trait SqlSession: Send + Sync {
    async fn close(self: Box<Self>) -> Result<(), SqlError>;

    /// Returns (generated username, generated password). Both are
    /// deterministic with respect to seed + `binding_id` + `db_name`.
    async fn create_user(&self, binding_id: &str, db_name: &str) -> Result<(String, String), SqlError>;

    async fn drop_user(&self, binding_id: &str) -> Result<(), SqlError>;

    /// Best-effort, engine-specific. Engines that don't support extensions
    /// treat this as a no-op rather than an error.
    async fn create_extensions(&self, names: &[String]) -> Result<(), SqlError>;

    async fn drop_extensions(&self, names: &[String]) -> Result<(), SqlError>;

    /// Drops every non-master role/user this broker previously created.
    /// Used after a restore to shed binding users the snapshot carries but
    /// the platform no longer has binding records for.
    async fn reset_state(&self) -> Result<(), SqlError>;
}

#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Fails with `SqlError::LoginFailed` on bad credentials.
    async fn open(
        &self,
        address: &str,
        port: u16,
        db_name: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn SqlSession>, SqlError>;
}
