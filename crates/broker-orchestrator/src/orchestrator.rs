//! Broker Orchestrator: catalog-driven lifecycle operations, the
//! LastOperation reconciliation state machine, and the credential-rotation
//! scanner. Holds by-value references to the RDS/SQL facades (interfaces)
//! and the immutable Catalog — no shared mutable state between operations.

use std::collections::HashMap;
use std::sync::Arc;

use broker_catalog::{Plan, Service, identity};
use broker_rds::{
    CreateInstanceSpec, GetTagsOptions, InstanceDescription, ModifyInstanceSpec, RdsError,
    RdsFacade, RestoreInstanceSpec, SnapshotDescription, Tag, parameter_group, tags,
};
use broker_sql::{
    MasterPasswordSeed, SqlEngine, SqlError, master_password as derive_master_password,
    master_username as derive_master_username,
};
use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::credentials::{BindingCredentials, build_credentials};
use crate::error::BrokerError;
use crate::params::{
    ProvisionParameters, UpdateParameters, parse_provision_parameters, parse_update_parameters,
};

fn default_port(engine_family: &str) -> i32 {
    match engine_family {
        "postgres" => 5432,
        "mysql" => 3306,
        _ => 0,
    }
}

fn map_instance_not_found(err: RdsError) -> BrokerError {
    match err {
        RdsError::InstanceNotFound(id) => BrokerError::InstanceDoesNotExist(id),
        other => other.into(),
    }
}

enum StatusClass {
    InProgress,
    Failed,
    Succeeded,
}

fn classify_status(status: &str) -> StatusClass {
    const FAILED: &[&str] = &[
        "failed",
        "inaccessible-encryption-credentials",
        "incompatible-credentials",
        "incompatible-network",
        "incompatible-option-group",
        "incompatible-parameters",
        "incompatible-restore",
        "restore-error",
    ];

    if status == "available" {
        StatusClass::Succeeded
    } else if FAILED.contains(&status) {
        StatusClass::Failed
    } else {
        // Explicit in-progress statuses, and any unknown value, per spec.
        StatusClass::InProgress
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub service_instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub organization_id: String,
    pub space_id: String,
    pub parameters: Option<serde_json::Value>,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub service_instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    /// The platform's `previous_values.plan_id`, when supplied.
    pub previous_plan_id: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone)]
pub struct DeprovisionRequest {
    pub service_instance_id: String,
    pub plan_id: String,
    pub skip_final_snapshot_override: Option<bool>,
    pub accepts_incomplete: bool,
}

#[derive(Debug, Clone)]
pub struct BindRequest {
    pub service_instance_id: String,
    pub binding_id: String,
    pub plan_id: String,
}

#[derive(Debug, Clone)]
pub struct UnbindRequest {
    pub service_instance_id: String,
    pub binding_id: String,
    pub plan_id: String,
}

#[derive(Debug, Clone)]
pub struct LastOperationRequest {
    pub service_instance_id: String,
    pub plan_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct LastOperationResponse {
    pub state: OperationState,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncResponse {
    pub is_async: bool,
}

pub struct Orchestrator {
    config: BrokerConfig,
    rds: Arc<dyn RdsFacade>,
    sql_engines: HashMap<String, Arc<dyn SqlEngine>>,
    seed: MasterPasswordSeed,
}

impl Orchestrator {
    pub fn new(
        config: BrokerConfig,
        rds: Arc<dyn RdsFacade>,
        sql_engines: HashMap<String, Arc<dyn SqlEngine>>,
    ) -> Self {
        let seed = MasterPasswordSeed::new(config.master_password_seed.clone());
        Self {
            config,
            rds,
            sql_engines,
            seed,
        }
    }

    fn seed(&self) -> &MasterPasswordSeed {
        &self.seed
    }

    fn sql_engine_for(&self, engine_family: &str) -> Result<&Arc<dyn SqlEngine>, BrokerError> {
        self.sql_engines.get(engine_family).ok_or_else(|| {
            BrokerError::Operational(format!("no SQL engine configured for {engine_family}"))
        })
    }

    fn resolve_plan(&self, service_id: &str, plan_id: &str) -> Result<(&Service, &Plan), BrokerError> {
        let service = self
            .config
            .catalog
            .find_service(service_id)
            .ok_or_else(|| BrokerError::ServiceNotFound(service_id.to_string()))?;
        let plan = service
            .find_plan(plan_id)
            .ok_or_else(|| BrokerError::PlanNotFound(plan_id.to_string()))?;
        Ok((service, plan))
    }

    fn resolve_requested_extensions(
        &self,
        plan: &Plan,
        requested: Option<&[String]>,
    ) -> Result<Vec<String>, BrokerError> {
        let extensions = match requested {
            Some(exts) if !exts.is_empty() => exts.to_vec(),
            _ => plan.rds_properties.default_extensions.clone(),
        };
        for ext in &extensions {
            if !plan.rds_properties.allows_extension(ext) {
                return Err(BrokerError::Validation(format!(
                    "extension {ext} is not in this plan's allowed_extensions"
                )));
            }
        }
        Ok(extensions)
    }

    async fn ensure_parameter_group(
        &self,
        plan: &Plan,
        engine_family: &str,
        extensions: &[String],
    ) -> Result<String, BrokerError> {
        // This broker's catalog treats `engine` as the parameter-group
        // family directly — it doesn't model families that span multiple
        // engine_versions separately from the engine string itself.
        let name = parameter_group::canonical_name(
            &self.config.db_prefix,
            engine_family,
            &plan.rds_properties.engine_version,
            &self.config.broker_name,
            engine_family,
            extensions,
        );
        let supports_force_ssl = engine_family == "postgres";
        let supports_log_retention = engine_family == "postgres";
        parameter_group::ensure_parameter_group(
            self.rds.as_ref(),
            &name,
            engine_family,
            extensions,
            supports_force_ssl,
            supports_log_retention,
        )
        .await
        .map_err(BrokerError::from)
    }

    fn create_spec(
        &self,
        plan: &Plan,
        db_instance_identifier: &str,
        db_name: &str,
        master_username: &str,
        master_password_value: &str,
        parameter_group_name: &str,
        resource_tags: Vec<Tag>,
    ) -> CreateInstanceSpec {
        let props = &plan.rds_properties;
        CreateInstanceSpec {
            db_instance_identifier: db_instance_identifier.to_string(),
            engine: props.engine.clone(),
            engine_version: props.engine_version.clone(),
            db_instance_class: props.db_instance_class.clone(),
            allocated_storage: props.allocated_storage,
            db_name: Some(db_name.to_string()),
            master_username: master_username.to_string(),
            master_password: master_password_value.to_string(),
            port: props.port,
            publicly_accessible: props.publicly_accessible,
            vpc_security_group_ids: props.vpc_security_group_ids.clone(),
            db_subnet_group_name: props.db_subnet_group_name.clone(),
            db_parameter_group_name: Some(parameter_group_name.to_string()),
            storage_encrypted: props.storage_encrypted,
            kms_key_id: props.kms_key_id.clone(),
            multi_az: props.multi_az,
            backup_retention_period: props.backup_retention_period,
            storage_type: props.storage_type.clone(),
            tags: resource_tags,
        }
    }

    fn modify_spec(
        &self,
        plan: &Plan,
        db_instance_identifier: &str,
        parameter_group_name: &str,
    ) -> ModifyInstanceSpec {
        let props = &plan.rds_properties;
        ModifyInstanceSpec {
            db_instance_identifier: db_instance_identifier.to_string(),
            db_instance_class: Some(props.db_instance_class.clone()),
            allocated_storage: Some(props.allocated_storage),
            master_user_password: None,
            vpc_security_group_ids: props.vpc_security_group_ids.clone(),
            db_subnet_group_name: props.db_subnet_group_name.clone(),
            db_parameter_group_name: Some(parameter_group_name.to_string()),
            storage_encrypted: props.storage_encrypted,
            kms_key_id: props.kms_key_id.clone(),
            multi_az: props.multi_az,
            backup_retention_period: props.backup_retention_period,
        }
    }

    /// Returns the catalog transformed into the platform's catalog shape.
    /// Pure function of config — the JSON encoding itself is the (external)
    /// transport layer's concern.
    pub fn services(&self) -> &broker_catalog::Catalog {
        &self.config.catalog
    }

    pub async fn provision(&self, req: &ProvisionRequest) -> Result<AsyncResponse, BrokerError> {
        if !req.accepts_incomplete {
            return Err(BrokerError::AsyncRequired);
        }
        let (_, plan) = self.resolve_plan(&req.service_id, &req.plan_id)?;
        let params = parse_provision_parameters(
            req.parameters.as_ref(),
            self.config.allow_user_provision_parameters,
        )?;

        let db_instance_identifier =
            identity::db_instance_identifier(&self.config.db_prefix, &req.service_instance_id);
        let engine_family = plan.rds_properties.engine.clone();

        match params.restore_from_latest_snapshot_of.as_deref() {
            Some(source_guid) if !source_guid.is_empty() => {
                self.provision_from_snapshot(
                    req,
                    plan,
                    source_guid,
                    &params,
                    &db_instance_identifier,
                    &engine_family,
                )
                .await
            }
            _ => {
                let db_name =
                    identity::db_name(&self.config.db_prefix, &req.service_instance_id);
                self.provision_fresh(
                    req,
                    plan,
                    &params,
                    &db_instance_identifier,
                    &db_name,
                    &engine_family,
                )
                .await
            }
        }
    }

    async fn provision_fresh(
        &self,
        req: &ProvisionRequest,
        plan: &Plan,
        params: &ProvisionParameters,
        db_instance_identifier: &str,
        db_name: &str,
        engine_family: &str,
    ) -> Result<AsyncResponse, BrokerError> {
        let extensions =
            self.resolve_requested_extensions(plan, params.enabled_extensions.as_deref())?;
        let parameter_group_name = self
            .ensure_parameter_group(plan, engine_family, &extensions)
            .await?;

        let master_username = derive_master_username(self.seed(), db_instance_identifier);
        let master_password_value = derive_master_password(self.seed(), db_instance_identifier);

        let mut extras = vec![Tag::new(tags::EXTENSIONS, tags::extensions_to_tag(&extensions))];
        if let Some(skip) = params.skip_final_snapshot {
            extras.push(Tag::new(tags::SKIP_FINAL_SNAPSHOT, skip.to_string()));
        }
        let resource_tags = tags::build_tags(
            tags::Action::Created,
            &self.config.broker_name,
            &req.service_id,
            &req.plan_id,
            &req.organization_id,
            &req.space_id,
            &jiff::Timestamp::now().to_string(),
            extras,
        );

        let spec = self.create_spec(
            plan,
            db_instance_identifier,
            db_name,
            &master_username,
            &master_password_value,
            &parameter_group_name,
            resource_tags,
        );

        self.rds.create(spec).await?;
        info!(
            instance_id = db_instance_identifier,
            action = "provision",
            cause = "fresh",
            "create issued"
        );
        Ok(AsyncResponse { is_async: true })
    }

    async fn provision_from_snapshot(
        &self,
        req: &ProvisionRequest,
        plan: &Plan,
        source_guid: &str,
        params: &ProvisionParameters,
        db_instance_identifier: &str,
        engine_family: &str,
    ) -> Result<AsyncResponse, BrokerError> {
        if engine_family != "postgres" {
            return Err(BrokerError::Validation(
                "restore_from_latest_snapshot_of is only supported for postgres".to_string(),
            ));
        }

        let source_identifier =
            identity::db_instance_identifier(&self.config.db_prefix, source_guid);
        let snapshots = self.rds.describe_snapshots(&source_identifier).await?;
        if snapshots.is_empty() {
            return Err(BrokerError::Validation(format!(
                "no snapshots found for {source_identifier}"
            )));
        }

        // Latest create_time wins; ties keep the first occurrence, i.e. the
        // provider's list order (see spec Open Questions).
        let latest = snapshots
            .iter()
            .fold(None::<&SnapshotDescription>, |best, candidate| match best {
                None => Some(candidate),
                Some(current) if candidate.create_time > current.create_time => Some(candidate),
                Some(current) => Some(current),
            })
            .expect("non-empty checked above");

        let snapshot_tags = tags::index_tags(
            &self
                .rds
                .get_resource_tags(&latest.arn, GetTagsOptions::default())
                .await?,
        );

        let matches = snapshot_tags.get(tags::SPACE_ID).map(String::as_str)
            == Some(req.space_id.as_str())
            && snapshot_tags.get(tags::ORGANIZATION_ID).map(String::as_str)
                == Some(req.organization_id.as_str())
            && snapshot_tags.get(tags::PLAN_ID).map(String::as_str) == Some(req.plan_id.as_str());
        if !matches {
            return Err(BrokerError::Validation(
                "snapshot does not belong to the requesting organization/space/plan".to_string(),
            ));
        }

        let mut extensions: Vec<String> = snapshot_tags
            .get(tags::EXTENSIONS)
            .map(|v| tags::tag_to_extensions(v))
            .unwrap_or_default();
        if let Some(user_exts) = &params.enabled_extensions {
            for ext in user_exts {
                if !extensions.contains(ext) {
                    extensions.push(ext.clone());
                }
            }
        }
        for ext in &extensions {
            if !plan.rds_properties.allows_extension(ext) {
                return Err(BrokerError::Validation(format!(
                    "extension {ext} is not in this plan's allowed_extensions"
                )));
            }
        }

        self.ensure_parameter_group(plan, engine_family, &extensions)
            .await?;

        let mut extras = vec![
            Tag::new(tags::RESTORED_FROM_SNAPSHOT, &latest.snapshot_identifier),
            Tag::new(tags::PENDING_UPDATE_SETTINGS, "true"),
            Tag::new(tags::PENDING_RESET_USER_PASSWORD, "true"),
            Tag::new(tags::EXTENSIONS, tags::extensions_to_tag(&extensions)),
        ];
        if let Some(skip) = params.skip_final_snapshot {
            extras.push(Tag::new(tags::SKIP_FINAL_SNAPSHOT, skip.to_string()));
        }

        let resource_tags = tags::build_tags(
            tags::Action::Restored,
            &self.config.broker_name,
            &req.service_id,
            &req.plan_id,
            &req.organization_id,
            &req.space_id,
            &jiff::Timestamp::now().to_string(),
            extras,
        );

        let spec = RestoreInstanceSpec {
            source_snapshot_identifier: latest.snapshot_identifier.clone(),
            target_db_instance_identifier: db_instance_identifier.to_string(),
            db_instance_class: Some(plan.rds_properties.db_instance_class.clone()),
            publicly_accessible: plan.rds_properties.publicly_accessible,
            tags: resource_tags,
        };

        self.rds.restore(spec).await?;
        info!(
            instance_id = db_instance_identifier,
            action = "provision",
            cause = "restore",
            "restore issued"
        );

        Ok(AsyncResponse { is_async: true })
    }

    pub async fn update(&self, req: &UpdateRequest) -> Result<AsyncResponse, BrokerError> {
        if !req.accepts_incomplete {
            return Err(BrokerError::AsyncRequired);
        }
        let (service, plan) = self.resolve_plan(&req.service_id, &req.plan_id)?;

        if !service.plan_updatable {
            if let Some(previous_plan_id) = &req.previous_plan_id {
                if previous_plan_id != &req.plan_id {
                    return Err(BrokerError::PlanChangeNotSupported);
                }
            }
        }

        let params = parse_update_parameters(
            req.parameters.as_ref(),
            self.config.allow_user_update_parameters,
        )?;
        let db_instance_identifier =
            identity::db_instance_identifier(&self.config.db_prefix, &req.service_instance_id);

        if params.reboot == Some(true) {
            let previous_plan_id = req.previous_plan_id.as_deref().unwrap_or(&req.plan_id);
            if previous_plan_id != req.plan_id {
                return Err(BrokerError::Validation(
                    "invalid to reboot and update plan in the same command".to_string(),
                ));
            }
            self.rds
                .reboot(&db_instance_identifier, params.force_failover)
                .await
                .map_err(map_instance_not_found)?;
            info!(instance_id = %db_instance_identifier, action = "update", cause = "reboot", "reboot issued");
            return Ok(AsyncResponse { is_async: true });
        }

        if let Some(previous_plan_id) = &req.previous_plan_id {
            if let Some((_, previous_plan)) = self.config.catalog.find_plan(previous_plan_id) {
                let old_encrypted = previous_plan.rds_properties.storage_encrypted.unwrap_or(false);
                let new_encrypted = plan.rds_properties.storage_encrypted.unwrap_or(false);
                if old_encrypted != new_encrypted {
                    return Err(BrokerError::EncryptionNotUpdateable);
                }
                if new_encrypted
                    && previous_plan.rds_properties.kms_key_id != plan.rds_properties.kms_key_id
                {
                    return Err(BrokerError::EncryptionNotUpdateable);
                }
            }
        }

        let extensions =
            self.resolve_requested_extensions(plan, params.enabled_extensions.as_deref())?;
        let parameter_group_name = self
            .ensure_parameter_group(plan, &plan.rds_properties.engine, &extensions)
            .await?;

        let spec = self.modify_spec(plan, &db_instance_identifier, &parameter_group_name);
        let apply_immediately = !params.apply_at_maintenance_window.unwrap_or(false);

        let updated = self
            .rds
            .modify(spec, apply_immediately)
            .await
            .map_err(map_instance_not_found)?;

        let mut update_tags = vec![
            Tag::new(tags::UPDATED_BY, &self.config.broker_name),
            Tag::new(tags::UPDATED_AT, jiff::Timestamp::now().to_string()),
            Tag::new(tags::PLAN_ID, &req.plan_id),
        ];
        if let Some(skip) = params.skip_final_snapshot {
            update_tags.push(Tag::new(tags::SKIP_FINAL_SNAPSHOT, skip.to_string()));
        }
        self.rds.add_tags_to_resource(&updated.arn, update_tags).await?;

        info!(instance_id = %db_instance_identifier, action = "update", cause = "modify", "modify issued");
        Ok(AsyncResponse { is_async: true })
    }

    pub async fn deprovision(&self, req: &DeprovisionRequest) -> Result<AsyncResponse, BrokerError> {
        let (_, plan) = self
            .config
            .catalog
            .find_plan(&req.plan_id)
            .ok_or_else(|| BrokerError::PlanNotFound(req.plan_id.clone()))?;

        let db_instance_identifier =
            identity::db_instance_identifier(&self.config.db_prefix, &req.service_instance_id);

        let instance = match self.rds.describe(&db_instance_identifier).await {
            Ok(instance) => instance,
            // No-op per spec: deprovisioning a non-existent instance never
            // errors the broker.
            Err(RdsError::InstanceNotFound(_)) => return Ok(AsyncResponse { is_async: true }),
            Err(e) => return Err(e.into()),
        };

        let existing_tags = tags::index_tags(
            &self
                .rds
                .get_resource_tags(&instance.arn, GetTagsOptions::default())
                .await
                .unwrap_or_default(),
        );
        let existing_skip = existing_tags
            .get(tags::SKIP_FINAL_SNAPSHOT)
            .map(|v| v == "true");

        let effective_skip = req
            .skip_final_snapshot_override
            .or(existing_skip)
            .or(plan.rds_properties.skip_final_snapshot)
            .unwrap_or(false);

        match self.rds.delete(&db_instance_identifier, effective_skip).await {
            Ok(()) | Err(RdsError::InstanceNotFound(_)) => {
                info!(instance_id = %db_instance_identifier, action = "deprovision", "delete issued");
                Ok(AsyncResponse { is_async: true })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn bind(&self, req: &BindRequest) -> Result<BindingCredentials, BrokerError> {
        let (_, plan) = self
            .config
            .catalog
            .find_plan(&req.plan_id)
            .ok_or_else(|| BrokerError::PlanNotFound(req.plan_id.clone()))?;

        let db_instance_identifier =
            identity::db_instance_identifier(&self.config.db_prefix, &req.service_instance_id);
        let db_name = identity::db_name(&self.config.db_prefix, &req.service_instance_id);
        let engine_family = plan.rds_properties.engine.as_str();

        let instance = self
            .rds
            .describe(&db_instance_identifier)
            .await
            .map_err(map_instance_not_found)?;
        let sql_engine = self.sql_engine_for(engine_family)?;

        let host = instance.endpoint_address.clone().unwrap_or_default();
        let port = instance.endpoint_port.unwrap_or_else(|| default_port(engine_family));
        let master_username = derive_master_username(self.seed(), &db_instance_identifier);
        let master_password_value = derive_master_password(self.seed(), &db_instance_identifier);

        let session = sql_engine
            .open(&host, port as u16, &db_name, &master_username, &master_password_value)
            .await
            .map_err(|e| match e {
                // The ordinary Bind path does not self-heal — only the
                // credential scanner does. Surface it verbatim.
                SqlError::LoginFailed { .. } => BrokerError::Operational(e.to_string()),
                other => other.into(),
            })?;

        let result = session.create_user(&req.binding_id, &db_name).await;
        let _ = session.close().await;
        let (username, password) = result?;

        info!(instance_id = %db_instance_identifier, binding_id = %req.binding_id, action = "bind", "binding user created");

        Ok(build_credentials(engine_family, &host, port, &db_name, &username, &password))
    }

    pub async fn unbind(&self, req: &UnbindRequest) -> Result<(), BrokerError> {
        let (_, plan) = self
            .config
            .catalog
            .find_plan(&req.plan_id)
            .ok_or_else(|| BrokerError::PlanNotFound(req.plan_id.clone()))?;

        let db_instance_identifier =
            identity::db_instance_identifier(&self.config.db_prefix, &req.service_instance_id);
        let db_name = identity::db_name(&self.config.db_prefix, &req.service_instance_id);
        let engine_family = plan.rds_properties.engine.as_str();

        let instance = self
            .rds
            .describe(&db_instance_identifier)
            .await
            .map_err(map_instance_not_found)?;
        let sql_engine = self.sql_engine_for(engine_family)?;

        let host = instance.endpoint_address.clone().unwrap_or_default();
        let port = instance.endpoint_port.unwrap_or_else(|| default_port(engine_family));
        let master_username = derive_master_username(self.seed(), &db_instance_identifier);
        let master_password_value = derive_master_password(self.seed(), &db_instance_identifier);

        let session = sql_engine
            .open(&host, port as u16, &db_name, &master_username, &master_password_value)
            .await?;

        let result = session.drop_user(&req.binding_id).await;
        let _ = session.close().await;
        result?;

        info!(instance_id = %db_instance_identifier, binding_id = %req.binding_id, action = "unbind", "binding user dropped");
        Ok(())
    }

    pub async fn last_operation(
        &self,
        req: &LastOperationRequest,
    ) -> Result<LastOperationResponse, BrokerError> {
        let (_, plan) = self
            .config
            .catalog
            .find_plan(&req.plan_id)
            .ok_or_else(|| BrokerError::PlanNotFound(req.plan_id.clone()))?;
        let db_instance_identifier =
            identity::db_instance_identifier(&self.config.db_prefix, &req.service_instance_id);

        let instance = self
            .rds
            .describe(&db_instance_identifier)
            .await
            .map_err(map_instance_not_found)?;

        match classify_status(&instance.status) {
            StatusClass::Failed => {
                return Ok(LastOperationResponse {
                    state: OperationState::Failed,
                    description: format!(
                        "{db_instance_identifier}: provider reported status {}",
                        instance.status
                    ),
                });
            }
            StatusClass::InProgress => {
                // Prime the tag cache so the next tick observes flags set
                // moments ago; tags are never mutated while in-progress.
                let _ = self
                    .rds
                    .get_resource_tags(&instance.arn, GetTagsOptions { refresh_cache: true })
                    .await;
                return Ok(LastOperationResponse {
                    state: OperationState::InProgress,
                    description: format!("{db_instance_identifier}: {}", instance.status),
                });
            }
            StatusClass::Succeeded => {}
        }

        if instance.has_pending_modified_values {
            return Ok(LastOperationResponse {
                state: OperationState::InProgress,
                description: format!("{db_instance_identifier}: has pending modifications"),
            });
        }

        let resource_tags = self
            .rds
            .get_resource_tags(&instance.arn, GetTagsOptions { refresh_cache: true })
            .await?;
        let index = tags::index_tags(&resource_tags);
        let engine_family = plan.rds_properties.engine.as_str();

        if index.get(tags::PENDING_UPDATE_SETTINGS).map(String::as_str) == Some("true") {
            self.reconcile_pending_update_settings(
                plan,
                &db_instance_identifier,
                &instance,
                engine_family,
                &index,
            )
            .await?;
            return Ok(LastOperationResponse {
                state: OperationState::InProgress,
                description: format!("{db_instance_identifier}: applying plan settings after restore"),
            });
        }

        if index.get(tags::PENDING_REBOOT).map(String::as_str) == Some("true") {
            self.rds.reboot(&db_instance_identifier, None).await?;
            self.rds
                .remove_tag(&db_instance_identifier, tags::PENDING_REBOOT)
                .await?;
            return Ok(LastOperationResponse {
                state: OperationState::InProgress,
                description: format!("{db_instance_identifier}: rebooting"),
            });
        }

        if index.get(tags::PENDING_RESET_USER_PASSWORD).map(String::as_str) == Some("true") {
            self.reconcile_pending_reset_user_password(&db_instance_identifier, &instance, engine_family)
                .await?;
            return Ok(LastOperationResponse {
                state: OperationState::InProgress,
                description: format!("{db_instance_identifier}: resetting stale binding users"),
            });
        }

        if engine_family == "postgres" {
            self.ensure_extensions_applied(&db_instance_identifier, &instance, &index)
                .await?;
        }

        Ok(LastOperationResponse {
            state: OperationState::Succeeded,
            description: format!("{db_instance_identifier}: available"),
        })
    }

    async fn reconcile_pending_update_settings(
        &self,
        plan: &Plan,
        db_instance_identifier: &str,
        instance: &InstanceDescription,
        engine_family: &str,
        index: &HashMap<String, String>,
    ) -> Result<(), BrokerError> {
        let extensions = index
            .get(tags::EXTENSIONS)
            .map(|v| tags::tag_to_extensions(v))
            .unwrap_or_default();
        let parameter_group_name = self
            .ensure_parameter_group(plan, engine_family, &extensions)
            .await?;

        let mut spec = self.modify_spec(plan, db_instance_identifier, &parameter_group_name);

        if engine_family == "postgres" {
            let sql_engine = self.sql_engine_for(engine_family)?;
            let db_name = identity::db_name_from_identifier(&self.config.db_prefix, db_instance_identifier);
            let master_username = derive_master_username(self.seed(), db_instance_identifier);
            let derived_password = derive_master_password(self.seed(), db_instance_identifier);
            let host = instance.endpoint_address.clone().unwrap_or_default();
            let port = instance.endpoint_port.unwrap_or_else(|| default_port(engine_family));

            let login_ok = match sql_engine
                .open(&host, port as u16, &db_name, &master_username, &derived_password)
                .await
            {
                Ok(session) => {
                    let _ = session.close().await;
                    true
                }
                Err(SqlError::LoginFailed { .. }) => false,
                Err(e) => return Err(e.into()),
            };
            if !login_ok {
                spec.master_user_password = Some(derived_password);
            }
        }

        self.rds.modify(spec, true).await.map_err(map_instance_not_found)?;

        let restored_tags = vec![
            Tag::new(tags::RESTORED_BY, &self.config.broker_name),
            Tag::new(tags::RESTORED_AT, jiff::Timestamp::now().to_string()),
        ];
        self.rds.add_tags_to_resource(&instance.arn, restored_tags).await?;
        self.rds
            .remove_tag(db_instance_identifier, tags::PENDING_UPDATE_SETTINGS)
            .await?;

        Ok(())
    }

    async fn reconcile_pending_reset_user_password(
        &self,
        db_instance_identifier: &str,
        instance: &InstanceDescription,
        engine_family: &str,
    ) -> Result<(), BrokerError> {
        let sql_engine = self.sql_engine_for(engine_family)?;
        let db_name = identity::db_name_from_identifier(&self.config.db_prefix, db_instance_identifier);
        let master_username = derive_master_username(self.seed(), db_instance_identifier);
        let derived_password = derive_master_password(self.seed(), db_instance_identifier);
        let host = instance.endpoint_address.clone().unwrap_or_default();
        let port = instance.endpoint_port.unwrap_or_else(|| default_port(engine_family));

        let session = sql_engine
            .open(&host, port as u16, &db_name, &master_username, &derived_password)
            .await?;
        let result = session.reset_state().await;
        let _ = session.close().await;
        result?;

        self.rds
            .remove_tag(db_instance_identifier, tags::PENDING_RESET_USER_PASSWORD)
            .await?;
        Ok(())
    }

    async fn ensure_extensions_applied(
        &self,
        db_instance_identifier: &str,
        instance: &InstanceDescription,
        index: &HashMap<String, String>,
    ) -> Result<(), BrokerError> {
        let extensions = index
            .get(tags::EXTENSIONS)
            .map(|v| tags::tag_to_extensions(v))
            .unwrap_or_default();
        if extensions.is_empty() {
            return Ok(());
        }
        let sql_engine = self.sql_engine_for("postgres")?;
        let db_name = identity::db_name_from_identifier(&self.config.db_prefix, db_instance_identifier);
        let master_username = derive_master_username(self.seed(), db_instance_identifier);
        let derived_password = derive_master_password(self.seed(), db_instance_identifier);
        let host = instance.endpoint_address.clone().unwrap_or_default();
        let port = instance.endpoint_port.unwrap_or_else(|| default_port("postgres"));

        let session = sql_engine
            .open(&host, port as u16, &db_name, &master_username, &derived_password)
            .await?;
        let result = session.create_extensions(&extensions).await;
        let _ = session.close().await;
        result?;
        Ok(())
    }

    /// Periodic self-heal, per spec §4.7. Never panics — any per-instance
    /// error is logged and the scan moves on; a `DescribeByTag` failure
    /// aborts the whole scan (nothing to iterate over).
    pub async fn check_and_rotate_credentials(&self) -> Result<(), BrokerError> {
        let instances = self
            .rds
            .describe_by_tag(tags::BROKER_NAME, &self.config.broker_name)
            .await?;

        for instance in instances {
            let engine_family = instance.engine.clone();
            let sql_engine = match self.sql_engine_for(&engine_family) {
                Ok(engine) => engine,
                Err(_) => {
                    warn!(
                        instance_id = %instance.db_instance_identifier,
                        engine = %engine_family,
                        "no SQL engine for this instance's engine family, skipping"
                    );
                    continue;
                }
            };

            let db_instance_identifier = &instance.db_instance_identifier;
            let db_name =
                identity::db_name_from_identifier(&self.config.db_prefix, db_instance_identifier);
            let master_username = derive_master_username(self.seed(), db_instance_identifier);
            let derived_password = derive_master_password(self.seed(), db_instance_identifier);
            let host = instance.endpoint_address.clone().unwrap_or_default();
            let port = instance.endpoint_port.unwrap_or_else(|| default_port(&engine_family));

            match sql_engine
                .open(&host, port as u16, &db_name, &master_username, &derived_password)
                .await
            {
                Ok(session) => {
                    let _ = session.close().await;
                }
                Err(SqlError::LoginFailed { .. }) => {
                    info!(
                        instance_id = %db_instance_identifier,
                        action = "rotate_credentials",
                        cause = "login_failed",
                        "rotating master password"
                    );
                    let spec = ModifyInstanceSpec {
                        db_instance_identifier: db_instance_identifier.clone(),
                        master_user_password: Some(derived_password),
                        ..Default::default()
                    };
                    if let Err(e) = self.rds.modify(spec, true).await {
                        warn!(instance_id = %db_instance_identifier, error = %e, "failed to rotate master password");
                    }
                }
                Err(e) => {
                    warn!(instance_id = %db_instance_identifier, error = %e, "skipping instance: open failed");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    use broker_catalog::{Catalog, Plan, RdsProperties, Service};
    use broker_rds::ParameterSetting;

    #[derive(Default)]
    struct FakeRdsState {
        instances: HashMap<String, (InstanceDescription, Vec<Tag>)>,
        snapshots: HashMap<String, Vec<(SnapshotDescription, Vec<Tag>)>>,
        parameter_groups: HashSet<String>,
        create_calls: Vec<CreateInstanceSpec>,
        restore_calls: Vec<RestoreInstanceSpec>,
        modify_calls: Vec<(ModifyInstanceSpec, bool)>,
        reboot_calls: Vec<String>,
    }

    struct FakeRds(StdMutex<FakeRdsState>);

    impl FakeRds {
        fn new() -> Self {
            Self(StdMutex::new(FakeRdsState::default()))
        }
    }

    #[async_trait::async_trait]
    impl RdsFacade for FakeRds {
        async fn create(&self, spec: CreateInstanceSpec) -> Result<(), RdsError> {
            let mut state = self.0.lock().unwrap();
            if state.instances.contains_key(&spec.db_instance_identifier) {
                return Err(RdsError::InstanceAlreadyExists(spec.db_instance_identifier.clone()));
            }
            let desc = InstanceDescription {
                db_instance_identifier: spec.db_instance_identifier.clone(),
                arn: format!("arn:aws:rds:::db:{}", spec.db_instance_identifier),
                status: "available".to_string(),
                engine: spec.engine.clone(),
                endpoint_address: Some("db.example.com".to_string()),
                endpoint_port: spec.port.or(Some(5432)),
                db_parameter_groups: spec.db_parameter_group_name.clone().into_iter().collect(),
                has_pending_modified_values: false,
            };
            state
                .instances
                .insert(spec.db_instance_identifier.clone(), (desc, spec.tags.clone()));
            state.create_calls.push(spec);
            Ok(())
        }

        async fn restore(&self, spec: RestoreInstanceSpec) -> Result<(), RdsError> {
            let mut state = self.0.lock().unwrap();
            let desc = InstanceDescription {
                db_instance_identifier: spec.target_db_instance_identifier.clone(),
                arn: format!("arn:aws:rds:::db:{}", spec.target_db_instance_identifier),
                status: "available".to_string(),
                engine: "postgres".to_string(),
                endpoint_address: Some("db.example.com".to_string()),
                endpoint_port: Some(5432),
                db_parameter_groups: vec![],
                has_pending_modified_values: false,
            };
            state
                .instances
                .insert(spec.target_db_instance_identifier.clone(), (desc, spec.tags.clone()));
            state.restore_calls.push(spec);
            Ok(())
        }

        async fn modify(
            &self,
            spec: ModifyInstanceSpec,
            apply_immediately: bool,
        ) -> Result<InstanceDescription, RdsError> {
            let mut state = self.0.lock().unwrap();
            let id = spec.db_instance_identifier.clone();
            let Some((mut desc, existing_tags)) = state.instances.get(&id).cloned() else {
                return Err(RdsError::InstanceNotFound(id));
            };
            desc.has_pending_modified_values = false;
            state.instances.insert(id.clone(), (desc.clone(), existing_tags));
            state.modify_calls.push((spec, apply_immediately));
            Ok(desc)
        }

        async fn reboot(&self, id: &str, _force_failover: Option<bool>) -> Result<(), RdsError> {
            let mut state = self.0.lock().unwrap();
            if !state.instances.contains_key(id) {
                return Err(RdsError::InstanceNotFound(id.to_string()));
            }
            state.reboot_calls.push(id.to_string());
            Ok(())
        }

        async fn delete(&self, id: &str, _skip_final_snapshot: bool) -> Result<(), RdsError> {
            let mut state = self.0.lock().unwrap();
            if state.instances.remove(id).is_none() {
                return Err(RdsError::InstanceNotFound(id.to_string()));
            }
            Ok(())
        }

        async fn describe(&self, id: &str) -> Result<InstanceDescription, RdsError> {
            let state = self.0.lock().unwrap();
            state
                .instances
                .get(id)
                .map(|(d, _)| d.clone())
                .ok_or_else(|| RdsError::InstanceNotFound(id.to_string()))
        }

        async fn describe_by_tag(&self, key: &str, value: &str) -> Result<Vec<InstanceDescription>, RdsError> {
            let state = self.0.lock().unwrap();
            Ok(state
                .instances
                .values()
                .filter(|(_, tags)| tags.iter().any(|t| t.key == key && t.value == value))
                .map(|(d, _)| d.clone())
                .collect())
        }

        async fn describe_snapshots(
            &self,
            source_db_instance_identifier: &str,
        ) -> Result<Vec<SnapshotDescription>, RdsError> {
            let state = self.0.lock().unwrap();
            Ok(state
                .snapshots
                .get(source_db_instance_identifier)
                .map(|v| v.iter().map(|(s, _)| s.clone()).collect())
                .unwrap_or_default())
        }

        async fn get_resource_tags(&self, arn: &str, _options: GetTagsOptions) -> Result<Vec<Tag>, RdsError> {
            let state = self.0.lock().unwrap();
            for (desc, tags) in state.instances.values() {
                if desc.arn == arn {
                    return Ok(tags.clone());
                }
            }
            for snapshots in state.snapshots.values() {
                for (snapshot, tags) in snapshots {
                    if snapshot.arn == arn {
                        return Ok(tags.clone());
                    }
                }
            }
            Err(RdsError::InstanceNotFound(arn.to_string()))
        }

        async fn add_tags_to_resource(&self, arn: &str, new_tags: Vec<Tag>) -> Result<(), RdsError> {
            let mut state = self.0.lock().unwrap();
            for (desc, existing) in state.instances.values_mut() {
                if desc.arn == arn {
                    for tag in new_tags {
                        existing.retain(|t| t.key != tag.key);
                        existing.push(tag);
                    }
                    return Ok(());
                }
            }
            Ok(())
        }

        async fn remove_tag(&self, id: &str, key: &str) -> Result<(), RdsError> {
            let mut state = self.0.lock().unwrap();
            if let Some((_, tags)) = state.instances.get_mut(id) {
                tags.retain(|t| t.key != key);
            }
            Ok(())
        }

        async fn get_parameter_group(&self, name: &str) -> Result<(), RdsError> {
            let state = self.0.lock().unwrap();
            if state.parameter_groups.contains(name) {
                Ok(())
            } else {
                Err(RdsError::ParameterGroupNotFound(name.to_string()))
            }
        }

        async fn create_parameter_group(&self, name: &str, _family: &str) -> Result<(), RdsError> {
            self.0.lock().unwrap().parameter_groups.insert(name.to_string());
            Ok(())
        }

        async fn modify_parameter_group(
            &self,
            _name: &str,
            _parameters: Vec<ParameterSetting>,
        ) -> Result<(), RdsError> {
            Ok(())
        }
    }

    struct FakeSqlSession;

    #[async_trait::async_trait]
    impl broker_sql::SqlSession for FakeSqlSession {
        async fn close(self: Box<Self>) -> Result<(), SqlError> {
            Ok(())
        }
        async fn create_user(&self, binding_id: &str, db_name: &str) -> Result<(String, String), SqlError> {
            Ok((format!("user-{binding_id}"), format!("pass-{binding_id}-{db_name}")))
        }
        async fn drop_user(&self, _binding_id: &str) -> Result<(), SqlError> {
            Ok(())
        }
        async fn create_extensions(&self, _names: &[String]) -> Result<(), SqlError> {
            Ok(())
        }
        async fn drop_extensions(&self, _names: &[String]) -> Result<(), SqlError> {
            Ok(())
        }
        async fn reset_state(&self) -> Result<(), SqlError> {
            Ok(())
        }
    }

    struct FakeSqlEngine {
        fail_login: StdMutex<bool>,
    }

    impl FakeSqlEngine {
        fn new() -> Self {
            Self { fail_login: StdMutex::new(false) }
        }

        fn set_fail_login(&self, fail: bool) {
            *self.fail_login.lock().unwrap() = fail;
        }
    }

    #[async_trait::async_trait]
    impl SqlEngine for FakeSqlEngine {
        async fn open(
            &self,
            _address: &str,
            _port: u16,
            db_name: &str,
            _username: &str,
            _password: &str,
        ) -> Result<Box<dyn broker_sql::SqlSession>, SqlError> {
            if *self.fail_login.lock().unwrap() {
                return Err(SqlError::LoginFailed {
                    username: "master".to_string(),
                    database: db_name.to_string(),
                });
            }
            Ok(Box::new(FakeSqlSession))
        }
    }

    fn test_catalog(engine: &str) -> Catalog {
        Catalog {
            services: vec![Service {
                id: "Service-1".into(),
                name: "postgres".into(),
                description: "desc".into(),
                plan_updatable: true,
                plans: vec![Plan {
                    id: "Plan-1".into(),
                    name: "small".into(),
                    description: "desc".into(),
                    rds_properties: RdsProperties {
                        db_instance_class: "db.t3.micro".into(),
                        engine: engine.into(),
                        engine_version: "14".into(),
                        allocated_storage: 20,
                        skip_final_snapshot: None,
                        auto_minor_version_upgrade: None,
                        availability_zone: None,
                        backup_retention_period: None,
                        character_set_name: None,
                        copy_tags_to_snapshot: None,
                        db_parameter_group_name: None,
                        security_groups: None,
                        vpc_security_group_ids: None,
                        db_subnet_group_name: None,
                        iops: None,
                        kms_key_id: None,
                        license_model: None,
                        multi_az: None,
                        option_group_name: None,
                        port: None,
                        preferred_backup_window: None,
                        preferred_maintenance_window: None,
                        publicly_accessible: None,
                        storage_encrypted: None,
                        storage_type: None,
                        default_extensions: vec![],
                        allowed_extensions: vec!["uuid-ossp".into()],
                    },
                    free: None,
                }],
            }],
            exclude_engines: vec![],
        }
    }

    fn test_config(catalog: Catalog, db_prefix: &str, seed: &str) -> BrokerConfig {
        BrokerConfig {
            region: "us-east-1".into(),
            db_prefix: db_prefix.into(),
            broker_name: "mybroker".into(),
            master_password_seed: seed.into(),
            aws_partition: "aws".into(),
            aws_tag_cache_seconds: 604_800,
            allow_user_provision_parameters: true,
            allow_user_update_parameters: true,
            allow_user_bind_parameters: true,
            catalog,
        }
    }

    #[tokio::test]
    async fn fresh_provision_creates_expected_instance() {
        let catalog = test_catalog("test-engine-one");
        let config = test_config(catalog, "cf", "something-secret");
        let rds = Arc::new(FakeRds::new());
        let sql_engines: HashMap<String, Arc<dyn SqlEngine>> = HashMap::new();
        let orchestrator = Orchestrator::new(config, rds.clone(), sql_engines);

        let req = ProvisionRequest {
            service_instance_id: "instance-id".into(),
            service_id: "Service-1".into(),
            plan_id: "Plan-1".into(),
            organization_id: "organization-id".into(),
            space_id: "space-id".into(),
            parameters: Some(serde_json::json!({"skip_final_snapshot": true})),
            accepts_incomplete: true,
        };

        let result = orchestrator.provision(&req).await.unwrap();
        assert!(result.is_async);

        let state = rds.0.lock().unwrap();
        assert_eq!(state.create_calls.len(), 1);
        let create = &state.create_calls[0];
        assert_eq!(create.db_instance_identifier, "cf-instance-id");
        assert_eq!(create.db_name.as_deref(), Some("cf_instance_id"));
        assert_eq!(
            create.master_password,
            derive_master_password(&MasterPasswordSeed::new("something-secret"), "cf-instance-id")
        );

        let index = tags::index_tags(&create.tags);
        assert_eq!(index.get(tags::OWNER).unwrap(), tags::OWNER_VALUE);
        assert_eq!(index.get(tags::SERVICE_ID).unwrap(), "Service-1");
        assert_eq!(index.get(tags::PLAN_ID).unwrap(), "Plan-1");
        assert_eq!(index.get(tags::ORGANIZATION_ID).unwrap(), "organization-id");
        assert_eq!(index.get(tags::SPACE_ID).unwrap(), "space-id");
        assert_eq!(index.get(tags::SKIP_FINAL_SNAPSHOT).unwrap(), "true");
        assert!(!index.contains_key(tags::RESTORED_FROM_SNAPSHOT));
    }

    #[tokio::test]
    async fn restore_with_mismatching_space_is_rejected() {
        let catalog = test_catalog("postgres");
        let config = test_config(catalog, "cf", "something-secret");
        let rds = Arc::new(FakeRds::new());
        {
            let mut state = rds.0.lock().unwrap();
            let snapshot = SnapshotDescription {
                snapshot_identifier: "snap-1".into(),
                arn: "arn:aws:rds:::snapshot:snap-1".into(),
                create_time: "2026-01-01T00:00:00Z".into(),
            };
            let snapshot_tags = vec![
                Tag::new("Space ID", "different-space-id"),
                Tag::new("Organization ID", "organization-id"),
                Tag::new("Plan ID", "Plan-1"),
            ];
            state.snapshots.insert("cf-source-guid".into(), vec![(snapshot, snapshot_tags)]);
        }
        let sql_engines: HashMap<String, Arc<dyn SqlEngine>> = HashMap::new();
        let orchestrator = Orchestrator::new(config, rds.clone(), sql_engines);

        let req = ProvisionRequest {
            service_instance_id: "instance-id".into(),
            service_id: "Service-1".into(),
            plan_id: "Plan-1".into(),
            organization_id: "organization-id".into(),
            space_id: "space-id".into(),
            parameters: Some(serde_json::json!({"restore_from_latest_snapshot_of": "source-guid"})),
            accepts_incomplete: true,
        };

        let result = orchestrator.provision(&req).await;
        assert!(result.is_err());
        assert!(rds.0.lock().unwrap().restore_calls.is_empty());
    }

    fn available_instance(endpoint: &str) -> InstanceDescription {
        InstanceDescription {
            db_instance_identifier: "cf-instance-id".into(),
            arn: "arn:aws:rds:::db:cf-instance-id".into(),
            status: "available".into(),
            engine: "postgres".into(),
            endpoint_address: Some(endpoint.into()),
            endpoint_port: Some(5432),
            db_parameter_groups: vec![],
            has_pending_modified_values: false,
        }
    }

    #[tokio::test]
    async fn last_operation_reconciles_one_flag_per_tick() {
        let catalog = test_catalog("postgres");
        let config = test_config(catalog, "cf", "something-secret");
        let rds = Arc::new(FakeRds::new());
        {
            let mut state = rds.0.lock().unwrap();
            let desc = available_instance("db.example.com");
            let instance_tags = vec![
                Tag::new(tags::PENDING_UPDATE_SETTINGS, "true"),
                Tag::new(tags::PENDING_RESET_USER_PASSWORD, "true"),
            ];
            state.instances.insert("cf-instance-id".into(), (desc, instance_tags));
        }
        let mut sql_engines: HashMap<String, Arc<dyn SqlEngine>> = HashMap::new();
        sql_engines.insert("postgres".into(), Arc::new(FakeSqlEngine::new()));
        let orchestrator = Orchestrator::new(config, rds.clone(), sql_engines);

        let req = LastOperationRequest {
            service_instance_id: "instance-id".into(),
            plan_id: "Plan-1".into(),
        };

        let resp1 = orchestrator.last_operation(&req).await.unwrap();
        assert_eq!(resp1.state, OperationState::InProgress);
        {
            let state = rds.0.lock().unwrap();
            assert_eq!(state.modify_calls.len(), 1);
            let (_, tags) = state.instances.get("cf-instance-id").unwrap();
            assert!(!tags.iter().any(|t| t.key == tags::PENDING_UPDATE_SETTINGS));
            assert!(tags.iter().any(|t| t.key == tags::PENDING_RESET_USER_PASSWORD));
        }

        let resp2 = orchestrator.last_operation(&req).await.unwrap();
        assert_eq!(resp2.state, OperationState::InProgress);
        {
            let state = rds.0.lock().unwrap();
            let (_, tags) = state.instances.get("cf-instance-id").unwrap();
            assert!(!tags.iter().any(|t| t.key == tags::PENDING_RESET_USER_PASSWORD));
        }

        let resp3 = orchestrator.last_operation(&req).await.unwrap();
        assert_eq!(resp3.state, OperationState::Succeeded);
    }

    #[tokio::test]
    async fn check_and_rotate_credentials_modifies_password_on_login_failure() {
        let catalog = test_catalog("postgres");
        let config = test_config(catalog, "cf", "something-secret");
        let rds = Arc::new(FakeRds::new());
        {
            let mut state = rds.0.lock().unwrap();
            let desc = available_instance("db.example.com");
            let instance_tags = vec![Tag::new(tags::BROKER_NAME, "mybroker")];
            state.instances.insert("cf-instance-id".into(), (desc, instance_tags));
        }
        let sql_engine = Arc::new(FakeSqlEngine::new());
        sql_engine.set_fail_login(true);
        let mut sql_engines: HashMap<String, Arc<dyn SqlEngine>> = HashMap::new();
        sql_engines.insert("postgres".into(), sql_engine);
        let orchestrator = Orchestrator::new(config, rds.clone(), sql_engines);

        orchestrator.check_and_rotate_credentials().await.unwrap();

        let state = rds.0.lock().unwrap();
        assert_eq!(state.modify_calls.len(), 1);
        let (spec, _) = &state.modify_calls[0];
        assert_eq!(
            spec.master_user_password.as_deref(),
            Some(
                derive_master_password(&MasterPasswordSeed::new("something-secret"), "cf-instance-id")
                    .as_str()
            )
        );
    }

    #[tokio::test]
    async fn encryption_transition_is_rejected() {
        let mut catalog = test_catalog("postgres");
        catalog.services[0].plans[0].rds_properties.storage_encrypted = Some(false);
        let mut plan2 = catalog.services[0].plans[0].clone();
        plan2.id = "Plan-2".into();
        plan2.rds_properties.storage_encrypted = Some(true);
        catalog.services[0].plans.push(plan2);

        let config = test_config(catalog, "cf", "something-secret");
        let rds = Arc::new(FakeRds::new());
        {
            let mut state = rds.0.lock().unwrap();
            let desc = available_instance("db.example.com");
            state.instances.insert("cf-instance-id".into(), (desc, vec![]));
        }
        let sql_engines: HashMap<String, Arc<dyn SqlEngine>> = HashMap::new();
        let orchestrator = Orchestrator::new(config, rds.clone(), sql_engines);

        let req = UpdateRequest {
            service_instance_id: "instance-id".into(),
            service_id: "Service-1".into(),
            plan_id: "Plan-2".into(),
            previous_plan_id: Some("Plan-1".into()),
            parameters: None,
            accepts_incomplete: true,
        };

        let result = orchestrator.update(&req).await;
        assert!(matches!(result, Err(BrokerError::EncryptionNotUpdateable)));
        assert!(rds.0.lock().unwrap().modify_calls.is_empty());
    }

    #[tokio::test]
    async fn bind_returns_engine_specific_credentials() {
        let catalog = test_catalog("postgres");
        let config = test_config(catalog, "cf", "something-secret");
        let rds = Arc::new(FakeRds::new());
        {
            let mut state = rds.0.lock().unwrap();
            let desc = available_instance("db.example.com");
            state.instances.insert("cf-instance-id".into(), (desc, vec![]));
        }
        let mut sql_engines: HashMap<String, Arc<dyn SqlEngine>> = HashMap::new();
        sql_engines.insert("postgres".into(), Arc::new(FakeSqlEngine::new()));
        let orchestrator = Orchestrator::new(config, rds.clone(), sql_engines);

        let req = BindRequest {
            service_instance_id: "instance-id".into(),
            binding_id: "binding-1".into(),
            plan_id: "Plan-1".into(),
        };

        let creds = orchestrator.bind(&req).await.unwrap();
        assert_eq!(creds.host, "db.example.com");
        assert!(creds.uri.starts_with("postgres://"));
        assert!(creds.uri.contains("sslmode=require"));
    }
}
