//! `aws-sdk-rds`-backed implementation of [`RdsFacade`].

use async_trait::async_trait;
use aws_sdk_rds::Client;
use aws_sdk_rds::types::{ApplyMethod as SdkApplyMethod, Parameter, Tag as SdkTag};

use crate::error::RdsError;
use crate::facade::{
    ApplyMethod, CreateInstanceSpec, GetTagsOptions, InstanceDescription, ModifyInstanceSpec,
    ParameterSetting, RdsFacade, RestoreInstanceSpec, SnapshotDescription,
};
use crate::tags::Tag;

pub struct AwsRdsFacade {
    client: Client,
}

impl AwsRdsFacade {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn to_sdk_tags(tags: &[Tag]) -> Vec<SdkTag> {
    tags.iter()
        .map(|t| SdkTag::builder().key(&t.key).value(&t.value).build())
        .collect()
}

fn from_sdk_tags(tags: Option<&[SdkTag]>) -> Vec<Tag> {
    tags.unwrap_or_default()
        .iter()
        .filter_map(|t| match (t.key(), t.value()) {
            (Some(k), Some(v)) => Some(Tag::new(k, v)),
            _ => None,
        })
        .collect()
}

fn map_instance(db: &aws_sdk_rds::types::DbInstance) -> InstanceDescription {
    let has_pending = db
        .pending_modified_values()
        .is_some_and(|p| p.db_instance_class().is_some() || p.allocated_storage().is_some() || p.master_user_password().is_some());

    InstanceDescription {
        db_instance_identifier: db.db_instance_identifier().unwrap_or_default().to_string(),
        arn: db.db_instance_arn().unwrap_or_default().to_string(),
        status: db.db_instance_status().unwrap_or_default().to_string(),
        engine: db.engine().unwrap_or_default().to_string(),
        endpoint_address: db.endpoint().and_then(|e| e.address()).map(str::to_string),
        endpoint_port: db.endpoint().and_then(|e| e.port()),
        db_parameter_groups: db
            .db_parameter_groups()
            .iter()
            .filter_map(|g| g.db_parameter_group_name().map(str::to_string))
            .collect(),
        has_pending_modified_values: has_pending,
    }
}

fn not_found_err(id: &str, is_not_found: bool, message: String) -> RdsError {
    if is_not_found {
        RdsError::InstanceNotFound(id.to_string())
    } else {
        RdsError::Provider(message)
    }
}

#[async_trait]
impl RdsFacade for AwsRdsFacade {
    async fn create(&self, spec: CreateInstanceSpec) -> Result<(), RdsError> {
        let mut req = self
            .client
            .create_db_instance()
            .db_instance_identifier(&spec.db_instance_identifier)
            .engine(&spec.engine)
            .engine_version(&spec.engine_version)
            .db_instance_class(&spec.db_instance_class)
            .allocated_storage(spec.allocated_storage)
            .master_username(&spec.master_username)
            .master_user_password(&spec.master_password)
            .set_tags(Some(to_sdk_tags(&spec.tags)));

        if let Some(db_name) = &spec.db_name {
            req = req.db_name(db_name);
        }
        if let Some(port) = spec.port {
            req = req.port(port);
        }
        if let Some(public) = spec.publicly_accessible {
            req = req.publicly_accessible(public);
        }
        if let Some(sgs) = &spec.vpc_security_group_ids {
            req = req.set_vpc_security_group_ids(Some(sgs.clone()));
        }
        if let Some(subnet_group) = &spec.db_subnet_group_name {
            req = req.db_subnet_group_name(subnet_group);
        }
        if let Some(pg) = &spec.db_parameter_group_name {
            req = req.db_parameter_group_name(pg);
        }
        if let Some(encrypted) = spec.storage_encrypted {
            req = req.storage_encrypted(encrypted);
        }
        if let Some(kms) = &spec.kms_key_id {
            req = req.kms_key_id(kms);
        }
        if let Some(multi_az) = spec.multi_az {
            req = req.multi_az(multi_az);
        }
        if let Some(backup_retention) = spec.backup_retention_period {
            req = req.backup_retention_period(backup_retention);
        }
        if let Some(storage_type) = &spec.storage_type {
            req = req.storage_type(storage_type);
        }

        req.send().await.map_err(|e| {
            let svc = e.into_service_error();
            if svc.is_db_instance_already_exists_fault() {
                RdsError::InstanceAlreadyExists(spec.db_instance_identifier.clone())
            } else {
                RdsError::Provider(svc.to_string())
            }
        })?;

        Ok(())
    }

    async fn restore(&self, spec: RestoreInstanceSpec) -> Result<(), RdsError> {
        let mut req = self
            .client
            .restore_db_instance_from_db_snapshot()
            .db_instance_identifier(&spec.target_db_instance_identifier)
            .db_snapshot_identifier(&spec.source_snapshot_identifier)
            .set_tags(Some(to_sdk_tags(&spec.tags)));

        if let Some(class) = &spec.db_instance_class {
            req = req.db_instance_class(class);
        }
        if let Some(public) = spec.publicly_accessible {
            req = req.publicly_accessible(public);
        }

        req.send().await.map_err(|e| {
            let svc = e.into_service_error();
            if svc.is_db_snapshot_not_found_fault() {
                RdsError::InstanceNotFound(spec.source_snapshot_identifier.clone())
            } else {
                RdsError::Provider(svc.to_string())
            }
        })?;

        Ok(())
    }

    async fn modify(
        &self,
        spec: ModifyInstanceSpec,
        apply_immediately: bool,
    ) -> Result<InstanceDescription, RdsError> {
        let mut req = self
            .client
            .modify_db_instance()
            .db_instance_identifier(&spec.db_instance_identifier)
            .apply_immediately(apply_immediately);

        if let Some(class) = &spec.db_instance_class {
            req = req.db_instance_class(class);
        }
        if let Some(storage) = spec.allocated_storage {
            req = req.allocated_storage(storage);
        }
        if let Some(password) = &spec.master_user_password {
            req = req.master_user_password(password);
        }
        if let Some(sgs) = &spec.vpc_security_group_ids {
            req = req.set_vpc_security_group_ids(Some(sgs.clone()));
        }
        if let Some(subnet_group) = &spec.db_subnet_group_name {
            req = req.db_subnet_group_name(subnet_group);
        }
        if let Some(pg) = &spec.db_parameter_group_name {
            req = req.db_parameter_group_name(pg);
        }
        if let Some(multi_az) = spec.multi_az {
            req = req.multi_az(multi_az);
        }
        if let Some(backup_retention) = spec.backup_retention_period {
            req = req.backup_retention_period(backup_retention);
        }

        let resp = req.send().await.map_err(|e| {
            let svc = e.into_service_error();
            not_found_err(
                &spec.db_instance_identifier,
                svc.is_db_instance_not_found_fault(),
                svc.to_string(),
            )
        })?;

        Ok(resp
            .db_instance()
            .map(map_instance)
            .unwrap_or_else(|| InstanceDescription {
                db_instance_identifier: spec.db_instance_identifier.clone(),
                ..Default::default()
            }))
    }

    async fn reboot(&self, id: &str, force_failover: Option<bool>) -> Result<(), RdsError> {
        let mut req = self.client.reboot_db_instance().db_instance_identifier(id);
        if let Some(force) = force_failover {
            req = req.force_failover(force);
        }
        req.send().await.map_err(|e| {
            let svc = e.into_service_error();
            not_found_err(id, svc.is_db_instance_not_found_fault(), svc.to_string())
        })?;
        Ok(())
    }

    async fn delete(&self, id: &str, skip_final_snapshot: bool) -> Result<(), RdsError> {
        self.client
            .delete_db_instance()
            .db_instance_identifier(id)
            .skip_final_snapshot(skip_final_snapshot)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                not_found_err(id, svc.is_db_instance_not_found_fault(), svc.to_string())
            })?;
        Ok(())
    }

    async fn describe(&self, id: &str) -> Result<InstanceDescription, RdsError> {
        let resp = self
            .client
            .describe_db_instances()
            .db_instance_identifier(id)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                not_found_err(id, svc.is_db_instance_not_found_fault(), svc.to_string())
            })?;

        resp.db_instances()
            .first()
            .map(map_instance)
            .ok_or_else(|| RdsError::InstanceNotFound(id.to_string()))
    }

    async fn describe_by_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<InstanceDescription>, RdsError> {
        // DescribeDBInstances has no native tag filter in older API
        // generations; filter client-side over the full listing, matching
        // the cross-account scanning pattern used elsewhere in the pack.
        let mut out = Vec::new();
        let mut paginator = self.client.describe_db_instances().into_paginator().send();
        while let Some(page) = paginator.next().await {
            let page = page.map_err(|e| RdsError::Provider(e.into_service_error().to_string()))?;
            for db in page.db_instances() {
                let matches = db
                    .tag_list()
                    .iter()
                    .any(|t| t.key() == Some(key) && t.value() == Some(value));
                if matches {
                    out.push(map_instance(db));
                }
            }
        }
        Ok(out)
    }

    async fn describe_snapshots(
        &self,
        source_db_instance_identifier: &str,
    ) -> Result<Vec<SnapshotDescription>, RdsError> {
        let resp = self
            .client
            .describe_db_snapshots()
            .db_instance_identifier(source_db_instance_identifier)
            .send()
            .await
            .map_err(|e| RdsError::Provider(e.into_service_error().to_string()))?;

        Ok(resp
            .db_snapshots()
            .iter()
            .map(|s| SnapshotDescription {
                snapshot_identifier: s.db_snapshot_identifier().unwrap_or_default().to_string(),
                arn: s.db_snapshot_arn().unwrap_or_default().to_string(),
                create_time: s
                    .snapshot_create_time()
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn get_resource_tags(
        &self,
        arn: &str,
        options: GetTagsOptions,
    ) -> Result<Vec<Tag>, RdsError> {
        // `list_tags_for_resource` always hits the API; `refresh_cache` is a
        // broker-side concern (no local cache here), kept for interface
        // parity with the spec.
        let _ = options;
        let resp = self
            .client
            .list_tags_for_resource()
            .resource_name(arn)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                if svc.is_db_instance_not_found_fault() {
                    RdsError::InstanceNotFound(arn.to_string())
                } else {
                    RdsError::Provider(svc.to_string())
                }
            })?;

        Ok(from_sdk_tags(resp.tag_list.as_deref()))
    }

    async fn add_tags_to_resource(&self, arn: &str, tags: Vec<Tag>) -> Result<(), RdsError> {
        self.client
            .add_tags_to_resource()
            .resource_name(arn)
            .set_tags(Some(to_sdk_tags(&tags)))
            .send()
            .await
            .map_err(|e| RdsError::Provider(e.into_service_error().to_string()))?;
        Ok(())
    }

    async fn remove_tag(&self, id: &str, key: &str) -> Result<(), RdsError> {
        self.client
            .remove_tags_from_resource()
            .resource_name(id)
            .tag_keys(key)
            .send()
            .await
            .map_err(|e| RdsError::Provider(e.into_service_error().to_string()))?;
        Ok(())
    }

    async fn get_parameter_group(&self, name: &str) -> Result<(), RdsError> {
        self.client
            .describe_db_parameter_groups()
            .db_parameter_group_name(name)
            .send()
            .await
            .map_err(|e| {
                let svc = e.into_service_error();
                if svc.is_db_parameter_group_not_found_fault() {
                    RdsError::ParameterGroupNotFound(name.to_string())
                } else {
                    RdsError::Provider(svc.to_string())
                }
            })?;
        Ok(())
    }

    async fn create_parameter_group(&self, name: &str, family: &str) -> Result<(), RdsError> {
        let result = self
            .client
            .create_db_parameter_group()
            .db_parameter_group_name(name)
            .db_parameter_group_family(family)
            .description(format!("service broker managed parameter group for {name}"))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            // already-exists on create is swallowed as success — the ensure
            // flow is idempotent by construction.
            Err(e) if e.as_service_error().is_some_and(|s| s.is_db_parameter_group_already_exists_fault()) => {
                Ok(())
            }
            Err(e) => Err(RdsError::Provider(e.into_service_error().to_string())),
        }
    }

    async fn modify_parameter_group(
        &self,
        name: &str,
        parameters: Vec<ParameterSetting>,
    ) -> Result<(), RdsError> {
        let sdk_parameters: Vec<Parameter> = parameters
            .into_iter()
            .map(|p| {
                let apply_method = match p.apply_method {
                    ApplyMethod::Immediate => SdkApplyMethod::Immediate,
                    ApplyMethod::PendingReboot => SdkApplyMethod::PendingReboot,
                };
                Parameter::builder()
                    .parameter_name(p.name)
                    .parameter_value(p.value)
                    .apply_method(apply_method)
                    .build()
            })
            .collect();

        self.client
            .modify_db_parameter_group()
            .db_parameter_group_name(name)
            .set_parameters(Some(sdk_parameters))
            .send()
            .await
            .map_err(|e| RdsError::Provider(e.into_service_error().to_string()))?;
        Ok(())
    }
}
