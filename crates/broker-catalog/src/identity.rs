//! Instance identity derivation.
//!
//! `db_instance_identifier` and `db_name` are pure functions of
//! `(db_prefix, service_instance_id)`. Both sides of the substitution are
//! provider constraints: RDS identifiers forbid `_`, SQL identifiers forbid
//! `-`.

/// `<db_prefix>-<service_instance_id>` with every `_` turned into `-`.
pub fn db_instance_identifier(db_prefix: &str, service_instance_id: &str) -> String {
    format!("{db_prefix}-{service_instance_id}").replace('_', "-")
}

/// `<db_prefix>_<service_instance_id>` with every `-` turned into `_`.
pub fn db_name(db_prefix: &str, service_instance_id: &str) -> String {
    format!("{db_prefix}_{service_instance_id}").replace('-', "_")
}

/// Recover `dbName` from a `dbInstanceIdentifier` known to have been
/// produced by [`db_instance_identifier`] for this same `db_prefix`. Used by
/// background scans (e.g. the credential rotation scanner) that only have
/// the RDS-side identifier, not the original `serviceInstanceId`, to work
/// from.
pub fn db_name_from_identifier(db_prefix: &str, db_instance_identifier: &str) -> String {
    let suffix = db_instance_identifier
        .strip_prefix(&format!("{db_prefix}-"))
        .unwrap_or(db_instance_identifier);
    format!("{db_prefix}_{suffix}").replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_provision_identity() {
        assert_eq!(db_instance_identifier("cf", "instance-id"), "cf-instance-id");
        assert_eq!(db_name("cf", "instance-id"), "cf_instance_id");
    }

    #[test]
    fn db_prefix_normalization() {
        assert_eq!(
            db_instance_identifier("with-dash_underscore", "instance-id"),
            "with-dash-underscore-instance-id"
        );
        assert_eq!(
            db_name("with-dash_underscore", "instance-id"),
            "with_dash_underscore_instance_id"
        );
    }

    #[test]
    fn db_name_recoverable_from_identifier() {
        let identifier = db_instance_identifier("cf", "instance-id");
        assert_eq!(db_name_from_identifier("cf", &identifier), db_name("cf", "instance-id"));
    }
}
