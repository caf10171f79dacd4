//! Resource Descriptor lifecycle
//!
//! A descriptor is a value object: kind, name, namespace, template path and
//! substitutions. It drives exactly two transitions on the cluster:
//!
//! - [`create`](ResourceDescriptor::create): absent → pending (rendered and
//!   submitted)
//! - [`delete`](ResourceDescriptor::delete): anything → absent (requested)
//!
//! Readiness is never implied. Scenarios poll for it explicitly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use routecheck_common::{yaml, Error, Result, LABEL_CREATED_BY, LABEL_RUN_ID};

use crate::client::{ClusterClient, ObjectRef};
use crate::context::TestContext;
use crate::poll::Poller;
use crate::template::{Params, TemplateRenderer};

/// Substitution key for the descriptor name
pub const PARAM_NAME: &str = "NAME";
/// Substitution key for the descriptor namespace
pub const PARAM_NAMESPACE: &str = "NAMESPACE";
/// Substitution key for the IP-failover interface
pub const PARAM_HA_INTERFACE: &str = "HA_INTERFACE";

const GATEWAY_API_VERSION: &str = "gateway.networking.k8s.io/v1";

/// Kind of resource a descriptor manages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// `operator.openshift.io/v1` IngressController
    IngressController,
    /// Gateway API Gateway
    Gateway,
    /// Gateway API HTTPRoute
    HttpRoute,
    /// keepalived IP-failover `apps/v1` Deployment bound to a host interface
    IpFailover {
        /// Host network interface keepalived binds to
        interface: String,
    },
    /// Anything else
    Custom {
        /// `group/version`
        api_version: String,
        /// Kind
        kind: String,
    },
}

impl ResourceKind {
    /// `apiVersion` of objects of this kind
    pub fn api_version(&self) -> &str {
        match self {
            ResourceKind::IngressController => "operator.openshift.io/v1",
            ResourceKind::Gateway | ResourceKind::HttpRoute => GATEWAY_API_VERSION,
            ResourceKind::IpFailover { .. } => "apps/v1",
            ResourceKind::Custom { api_version, .. } => api_version,
        }
    }

    /// `kind` of objects of this kind
    pub fn kind(&self) -> &str {
        match self {
            ResourceKind::IngressController => "IngressController",
            ResourceKind::Gateway => "Gateway",
            ResourceKind::HttpRoute => "HTTPRoute",
            ResourceKind::IpFailover { .. } => "Deployment",
            ResourceKind::Custom { kind, .. } => kind,
        }
    }

    fn extra_params(&self) -> Vec<(&'static str, String)> {
        match self {
            ResourceKind::IpFailover { interface } => vec![(PARAM_HA_INTERFACE, interface.clone())],
            _ => Vec::new(),
        }
    }
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// The object existed and removal was requested
    Removed,
    /// The object was already gone
    AlreadyAbsent,
}

/// Template-backed declarative resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    kind: ResourceKind,
    name: String,
    namespace: String,
    template: PathBuf,
    params: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    /// Describe a resource; nothing touches the cluster yet
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        namespace: impl Into<String>,
        template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            template: template.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add one substitution
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add several substitutions
    pub fn params<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Resource kind
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Template path
    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Reference to the object this descriptor creates
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::namespaced(
            self.kind.api_version(),
            self.kind.kind(),
            &self.namespace,
            &self.name,
        )
    }

    /// Caller parameters plus `NAME`, `NAMESPACE` and kind-specific keys.
    ///
    /// The built-in keys win over caller parameters of the same name.
    pub fn substitutions(&self) -> Params {
        let mut subs = self.params.clone();
        subs.insert(PARAM_NAME.to_string(), self.name.clone());
        subs.insert(PARAM_NAMESPACE.to_string(), self.namespace.clone());
        for (key, value) in self.kind.extra_params() {
            subs.insert(key.to_string(), value);
        }
        subs
    }

    /// Render and parse the manifest without submitting it.
    ///
    /// Fails with `Error::Render` if the template cannot be rendered, the
    /// output is not a YAML mapping, or it declares a different kind.
    pub fn render(&self, renderer: &dyn TemplateRenderer) -> Result<Value> {
        let template = self.template.display().to_string();
        let text = renderer.render(&self.template, &self.substitutions())?;

        let manifest = yaml::parse_yaml(&text).map_err(|e| {
            Error::render(&template, format!("rendered manifest is not valid YAML: {e}"))
        })?;
        if !manifest.is_object() {
            return Err(Error::render(&template, "rendered manifest is not a mapping"));
        }

        let kind = manifest.get("kind").and_then(Value::as_str).unwrap_or_default();
        if kind != self.kind.kind() {
            return Err(Error::render(
                &template,
                format!("rendered kind {kind:?}, descriptor expects {:?}", self.kind.kind()),
            ));
        }
        Ok(manifest)
    }

    /// Render, label with the run id and submit.
    ///
    /// Render errors and admission errors surface as distinct variants.
    pub async fn create(
        &self,
        ctx: &TestContext,
        renderer: &dyn TemplateRenderer,
        client: &dyn ClusterClient,
    ) -> Result<ObjectRef> {
        let mut manifest = self.render(renderer)?;
        stamp_labels(&mut manifest, ctx.run_id());

        debug!(
            kind = %self.kind.kind(),
            name = %self.name,
            namespace = %self.namespace,
            "submitting manifest"
        );
        let created = client.create(&manifest).await?;
        info!(
            kind = %created.kind,
            name = %created.name,
            namespace = ?created.namespace,
            "resource created"
        );
        Ok(created)
    }

    /// Request removal; an already-absent object is not an error.
    ///
    /// Does not wait for the object to disappear.
    pub async fn delete(&self, client: &dyn ClusterClient) -> Result<Deletion> {
        match client.delete(&self.object_ref()).await {
            Ok(()) => {
                info!(
                    kind = %self.kind.kind(),
                    name = %self.name,
                    namespace = %self.namespace,
                    "resource deletion requested"
                );
                Ok(Deletion::Removed)
            }
            Err(e) if e.is_not_found() => {
                debug!(kind = %self.kind.kind(), name = %self.name, "resource already absent");
                Ok(Deletion::AlreadyAbsent)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll until the object is gone
    pub async fn wait_deleted(&self, poller: &Poller, client: &dyn ClusterClient) -> Result<()> {
        let target = self.object_ref();
        poller
            .until_absent(&format!("{target} deleted"), || client.get_object(&target))
            .await
    }
}

fn stamp_labels(manifest: &mut Value, run_id: &str) {
    let Some(object) = manifest.as_object_mut() else {
        return;
    };
    let metadata = object
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(metadata) = metadata.as_object_mut() else {
        return;
    };
    let labels = metadata
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(labels) = labels.as_object_mut() {
        labels.insert(LABEL_CREATED_BY.to_string(), Value::from("routecheck"));
        labels.insert(LABEL_RUN_ID.to_string(), Value::from(run_id));
    }
}
