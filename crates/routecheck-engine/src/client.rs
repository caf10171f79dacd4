//! Collaborator interfaces: the cluster control plane and remote execution
//!
//! The engine treats both as black boxes. Implementations map their native
//! failures into the [`Error`] taxonomy: absent objects become
//! `Error::NotFound`, rejected writes become `Error::Admission` with the
//! server message verbatim, infrastructure hiccups become `Error::Transient`.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use routecheck_common::{Error, Result};

/// Identifies one object on the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// `group/version`, or `version` for the core group
    pub api_version: String,
    /// Object kind, e.g. `IngressController`
    pub kind: String,
    /// Object name
    pub name: String,
    /// Namespace; `None` for cluster-scoped kinds
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Reference a namespaced object
    pub fn namespaced(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Reference a cluster-scoped object
    pub fn cluster_scoped(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Reference an `apps/v1` Deployment
    pub fn deployment(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::namespaced("apps/v1", "Deployment", namespace, name)
    }

    /// Read `apiVersion`, `kind`, `metadata.name` and `metadata.namespace`
    /// from a manifest.
    pub fn from_manifest(manifest: &Value) -> Result<Self> {
        let field = |pointer: &str| manifest.pointer(pointer).and_then(Value::as_str);
        let missing = |what: &str| Error::serialization(format!("manifest has no {what}"));

        Ok(Self {
            api_version: field("/apiVersion").ok_or_else(|| missing("apiVersion"))?.to_string(),
            kind: field("/kind").ok_or_else(|| missing("kind"))?.to_string(),
            name: field("/metadata/name")
                .ok_or_else(|| missing("metadata.name"))?
                .to_string(),
            namespace: field("/metadata/namespace").map(str::to_string),
        })
    }

    /// The `NotFound` error for this reference
    pub fn not_found(&self) -> Error {
        Error::not_found(&self.kind, &self.name, self.namespace.as_deref())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Identifies a pod (and optionally a container) for exec and logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    /// Pod namespace
    pub namespace: String,
    /// Pod name
    pub name: String,
    /// Container; `None` selects the pod's default container
    pub container: Option<String>,
}

impl PodRef {
    /// Reference a pod's default container
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            container: None,
        }
    }

    /// Select a specific container
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pod {}/{}", self.namespace, self.name)?;
        if let Some(c) = &self.container {
            write!(f, " ({c})")?;
        }
        Ok(())
    }
}

/// Location of a value inside an object
///
/// Resolution never fails: a missing field reads as the empty string,
/// string values are returned raw and anything else as compact JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    /// RFC 6901 JSON pointer, e.g. `/status/observedGeneration`
    Pointer(String),
    /// `metadata.annotations[key]`
    Annotation(String),
    /// `metadata.labels[key]`
    Label(String),
    /// `status.conditions[type=condition_type].field`
    Condition {
        /// Condition type, e.g. `Available`
        condition_type: String,
        /// Field of the matched condition, e.g. `status` or `message`
        field: String,
    },
}

impl FieldPath {
    /// A JSON pointer path
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self::Pointer(pointer.into())
    }

    /// An annotation value; the key may contain `/`
    pub fn annotation(key: impl Into<String>) -> Self {
        Self::Annotation(key.into())
    }

    /// A label value
    pub fn label(key: impl Into<String>) -> Self {
        Self::Label(key.into())
    }

    /// The `status` of a condition
    pub fn condition_status(condition_type: impl Into<String>) -> Self {
        Self::condition(condition_type, "status")
    }

    /// Any field of a condition
    pub fn condition(condition_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Condition {
            condition_type: condition_type.into(),
            field: field.into(),
        }
    }

    /// `/metadata/generation`
    pub fn generation() -> Self {
        Self::pointer("/metadata/generation")
    }

    /// Resolve against an object
    pub fn resolve(&self, object: &Value) -> String {
        let found = match self {
            FieldPath::Pointer(p) => object.pointer(p),
            FieldPath::Annotation(key) => {
                object.pointer(&format!("/metadata/annotations/{}", escape_pointer_token(key)))
            }
            FieldPath::Label(key) => {
                object.pointer(&format!("/metadata/labels/{}", escape_pointer_token(key)))
            }
            FieldPath::Condition {
                condition_type,
                field,
            } => object
                .pointer("/status/conditions")
                .and_then(Value::as_array)
                .and_then(|conditions| {
                    conditions
                        .iter()
                        .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))
                })
                .and_then(|c| c.get(field)),
        };
        render_value(found)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Pointer(p) => write!(f, "{p}"),
            FieldPath::Annotation(key) => write!(f, "metadata.annotations[{key}]"),
            FieldPath::Label(key) => write!(f, "metadata.labels[{key}]"),
            FieldPath::Condition {
                condition_type,
                field,
            } => write!(f, "status.conditions[type={condition_type}].{field}"),
        }
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// A patch submitted against an existing object
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// JSON merge patch (RFC 7386)
    Merge(Value),
    /// JSON patch (RFC 6902): an array of operations
    Json(Value),
}

/// Control-plane client
///
/// Reads are expected to eventually reflect writes within a polling window;
/// nothing more is assumed about consistency.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch an object as JSON
    async fn get_object(&self, target: &ObjectRef) -> Result<Value>;

    /// Fetch a single field of an object
    async fn get_field(&self, target: &ObjectRef, path: &FieldPath) -> Result<String> {
        let object = self.get_object(target).await?;
        Ok(path.resolve(&object))
    }

    /// Submit a manifest for admission
    async fn create(&self, manifest: &Value) -> Result<ObjectRef>;

    /// Patch an existing object
    async fn patch(&self, target: &ObjectRef, patch: &Patch) -> Result<()>;

    /// Request deletion; `Error::NotFound` when the object is already gone
    async fn delete(&self, target: &ObjectRef) -> Result<()>;
}

/// Remote command execution and log retrieval inside pods
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `argv` in the pod and return its stdout.
    ///
    /// A non-zero exit is reported as `Error::Operation` carrying stderr.
    async fn exec(&self, pod: &PodRef, argv: &[String]) -> Result<String>;

    /// Fetch container logs, optionally only the last `tail` lines
    async fn logs(&self, pod: &PodRef, tail: Option<i64>) -> Result<String>;
}
