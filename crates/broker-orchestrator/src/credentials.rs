//! Bind response shape, per spec §6. URI syntax is engine-specific and
//! includes reconnect hints (`?sslmode=require`, `?useSSL=true`) since the
//! caller never sees the broker again between bind and first connection.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BindingCredentials {
    pub host: String,
    pub port: i32,
    pub name: String,
    pub username: String,
    pub password: String,
    pub uri: String,
    pub jdbcuri: String,
}

pub fn build_credentials(
    engine_family: &str,
    host: &str,
    port: i32,
    db_name: &str,
    username: &str,
    password: &str,
) -> BindingCredentials {
    let (uri, jdbcuri) = match engine_family {
        "postgres" => (
            format!("postgres://{username}:{password}@{host}:{port}/{db_name}?sslmode=require"),
            format!(
                "jdbc:postgresql://{host}:{port}/{db_name}?user={username}&password={password}&ssl=true"
            ),
        ),
        "mysql" => (
            format!("mysql://{username}:{password}@{host}:{port}/{db_name}?useSSL=true"),
            format!(
                "jdbc:mysql://{host}:{port}/{db_name}?user={username}&password={password}&useSSL=true"
            ),
        ),
        other => (
            format!("{other}://{username}:{password}@{host}:{port}/{db_name}"),
            format!("jdbc:{other}://{host}:{port}/{db_name}?user={username}&password={password}"),
        ),
    };

    BindingCredentials {
        host: host.to_string(),
        port,
        name: db_name.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        uri,
        jdbcuri,
    }
}
