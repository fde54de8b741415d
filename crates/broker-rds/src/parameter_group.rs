//! Parameter Group Selector: chooses or synthesizes a DB parameter group
//! name for a (plan, requested-extensions) tuple and ensures it exists with
//! the parameter values the plan's extensions require.

use tracing::{debug, info};

use crate::error::RdsError;
use crate::facade::{ApplyMethod, ParameterSetting, RdsFacade};

/// Static, process-wide allow-list of extensions that require a preload
/// library, per engine family. Extensions not listed here are installed
/// lazily via `CREATE EXTENSION` and never touch the parameter group.
fn preload_extensions_for_family(engine_family: &str) -> &'static [&'static str] {
    match engine_family {
        "postgres" => &["pg_stat_statements", "pg_cron", "timescaledb", "pgaudit"],
        "mysql" => &[],
        _ => &[],
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Compose the canonical parameter group name for a plan+extension tuple.
/// Only extensions that require a preload library participate in the name;
/// extensions that install lazily are invisible to the parameter group and
/// therefore to its name.
pub fn canonical_name(
    db_prefix: &str,
    engine: &str,
    engine_version: &str,
    broker_name: &str,
    engine_family: &str,
    requested_extensions: &[String],
) -> String {
    let preload_allowed = preload_extensions_for_family(engine_family);
    let mut preload_exts: Vec<String> = requested_extensions
        .iter()
        .map(|e| normalize(e))
        .filter(|e| preload_allowed.contains(&e.as_str()))
        .collect();
    preload_exts.sort();
    preload_exts.dedup();

    let mut name = format!(
        "{}-{}{}-{}",
        normalize(db_prefix),
        normalize(engine),
        normalize(engine_version),
        normalize(broker_name),
    );
    for ext in &preload_exts {
        name.push('-');
        name.push_str(ext);
    }
    name
}

/// `GetParameterGroup` -> `CreateParameterGroup` -> `ModifyParameterGroup`.
/// Idempotent: re-running against an already-configured group is a no-op
/// other than the redundant API calls.
pub async fn ensure_parameter_group(
    facade: &dyn RdsFacade,
    name: &str,
    engine_family: &str,
    requested_extensions: &[String],
    supports_force_ssl: bool,
    supports_log_retention: bool,
) -> Result<String, RdsError> {
    match facade.get_parameter_group(name).await {
        Ok(()) => {
            debug!(parameter_group = name, "parameter group already exists");
            return Ok(name.to_string());
        }
        Err(RdsError::ParameterGroupNotFound(_)) => {}
        Err(e) => return Err(e),
    }

    info!(parameter_group = name, %engine_family, "creating parameter group");
    facade.create_parameter_group(name, engine_family).await?;

    let mut settings = Vec::new();
    if supports_force_ssl {
        settings.push(ParameterSetting {
            name: "rds.force_ssl".to_string(),
            value: "1".to_string(),
            apply_method: ApplyMethod::PendingReboot,
        });
    }
    if supports_log_retention {
        settings.push(ParameterSetting {
            name: "rds.log_retention_period".to_string(),
            value: "10080".to_string(),
            apply_method: ApplyMethod::Immediate,
        });
    }

    let preload_allowed = preload_extensions_for_family(engine_family);
    let mut preload_exts: Vec<String> = requested_extensions
        .iter()
        .map(|e| normalize(e))
        .filter(|e| preload_allowed.contains(&e.as_str()))
        .collect();
    preload_exts.sort();
    preload_exts.dedup();

    if !preload_exts.is_empty() {
        settings.push(ParameterSetting {
            name: "shared_preload_libraries".to_string(),
            value: preload_exts.join(","),
            apply_method: ApplyMethod::PendingReboot,
        });
    }

    if !settings.is_empty() {
        facade.modify_parameter_group(name, settings).await?;
    }

    Ok(name.to_string())
}
