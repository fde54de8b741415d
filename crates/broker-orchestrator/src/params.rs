//! User-supplied JSON parameters for Provision/Update, per spec §6.
//!
//! Unknown fields are a validation error — unless the corresponding
//! `AllowUser*Parameters` config flag is `false`, in which case the whole
//! params block is ignored instead of parsed.

use serde::Deserialize;

use crate::error::BrokerError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionParameters {
    pub restore_from_latest_snapshot_of: Option<String>,
    pub skip_final_snapshot: Option<bool>,
    #[serde(default)]
    pub enabled_extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateParameters {
    pub skip_final_snapshot: Option<bool>,
    #[serde(default)]
    pub enabled_extensions: Option<Vec<String>>,
    pub apply_at_maintenance_window: Option<bool>,
    pub reboot: Option<bool>,
    pub force_failover: Option<bool>,
}

/// Parse raw JSON params, honoring the `allow` flag: when `false`, an absent
/// params block is synthesized instead of parsing (and therefore validating)
/// the caller's input at all.
pub fn parse_provision_parameters(
    raw: Option<&serde_json::Value>,
    allow: bool,
) -> Result<ProvisionParameters, BrokerError> {
    if !allow {
        return Ok(ProvisionParameters::default());
    }
    match raw {
        None => Ok(ProvisionParameters::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| BrokerError::Validation(format!("invalid provision parameters: {e}"))),
    }
}

pub fn parse_update_parameters(
    raw: Option<&serde_json::Value>,
    allow: bool,
) -> Result<UpdateParameters, BrokerError> {
    if !allow {
        return Ok(UpdateParameters::default());
    }
    match raw {
        None => Ok(UpdateParameters::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| BrokerError::Validation(format!("invalid update parameters: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_field_is_a_validation_error() {
        let raw = serde_json::json!({"not_a_real_field": true});
        let result = parse_provision_parameters(Some(&raw), true);
        assert!(result.is_err());
    }

    #[test]
    fn params_ignored_entirely_when_disallowed() {
        let raw = serde_json::json!({"not_a_real_field": true});
        let result = parse_provision_parameters(Some(&raw), false).unwrap();
        assert!(result.enabled_extensions.is_none());
    }

    #[test]
    fn known_fields_parse() {
        let raw = serde_json::json!({
            "restore_from_latest_snapshot_of": "guid-1",
            "skip_final_snapshot": true,
            "enabled_extensions": ["uuid-ossp"],
        });
        let parsed = parse_provision_parameters(Some(&raw), true).unwrap();
        assert_eq!(parsed.restore_from_latest_snapshot_of.as_deref(), Some("guid-1"));
        assert_eq!(parsed.skip_final_snapshot, Some(true));
    }
}
