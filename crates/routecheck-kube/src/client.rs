//! `ClusterClient` over the Kubernetes API with dynamically typed objects

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, Patch as KubePatch, PatchParams, PostParams};
use kube::Client;
use routecheck_common::{Error, Result, FIELD_MANAGER};
use routecheck_engine::{ClusterClient, ObjectRef, Patch};
use serde_json::Value;
use tracing::debug;

use crate::errors::{classify, Access};
use crate::resource::build_api_resource;

/// Control-plane client backed by kube-rs
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    field_manager: String,
}

impl KubeCluster {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }

    /// Override the field manager recorded on writes
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    /// The underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, target: &ObjectRef) -> Api<DynamicObject> {
        let ar = build_api_resource(&target.api_version, &target.kind);
        match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get_object(&self, target: &ObjectRef) -> Result<Value> {
        let object = self
            .api(target)
            .get(&target.name)
            .await
            .map_err(|e| classify(e, Access::Read, "get_object", target))?;
        serde_json::to_value(&object)
            .map_err(|e| Error::serialization(format!("{}: {}", target, e)))
    }

    async fn create(&self, manifest: &Value) -> Result<ObjectRef> {
        let target = ObjectRef::from_manifest(manifest)?;
        let object: DynamicObject = serde_json::from_value(manifest.clone())
            .map_err(|e| Error::serialization(format!("{}: {}", target, e)))?;

        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.api(&target)
            .create(&params, &object)
            .await
            .map_err(|e| classify(e, Access::Write, "create", &target))?;

        debug!(
            kind = %target.kind,
            name = %target.name,
            namespace = ?target.namespace,
            "Created object"
        );
        Ok(target)
    }

    async fn patch(&self, target: &ObjectRef, patch: &Patch) -> Result<()> {
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        let api = self.api(target);
        let result = match patch {
            Patch::Merge(body) => api.patch(&target.name, &params, &KubePatch::Merge(body)).await,
            Patch::Json(ops) => {
                let ops: json_patch::Patch = serde_json::from_value(ops.clone())
                    .map_err(|e| Error::serialization(format!("invalid JSON patch: {}", e)))?;
                api.patch(&target.name, &params, &KubePatch::<()>::Json(ops))
                    .await
            }
        };
        result.map_err(|e| classify(e, Access::Write, "patch", target))?;

        debug!(kind = %target.kind, name = %target.name, "Patched object");
        Ok(())
    }

    async fn delete(&self, target: &ObjectRef) -> Result<()> {
        self.api(target)
            .delete(&target.name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, Access::Write, "delete", target))?;

        debug!(kind = %target.kind, name = %target.name, "Deleted object");
        Ok(())
    }
}
