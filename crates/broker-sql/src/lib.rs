//! broker-sql
//!
//! SQL Engine Facade (Postgres/MySQL) and deterministic Password Derivation.
//! No binding credential is ever persisted: usernames and passwords are
//! recomputed from a process-wide seed whenever they're needed.

pub mod error;
pub mod facade;
pub mod identifiers;
pub mod mysql;
pub mod password;
pub mod postgres;

pub use error::SqlError;
pub use facade::{SqlEngine, SqlSession};
pub use mysql::MysqlEngine;
pub use password::{
    MasterPasswordSeed, binding_password, binding_username, master_password, master_username,
};
pub use postgres::PostgresEngine;
