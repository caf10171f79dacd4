//! In-memory collaborators
//!
//! `FakeCluster` behaves like an API server for the parts the engine relies
//! on: creates are admitted or rejected, patches bump `metadata.generation`
//! only when `spec` actually changes, deletes of absent objects are 404s.
//!
//! `FakeRouterPod` answers `curl` with a weighted backend choice (or the
//! backend pinned by an affinity cookie) and `cat` with an HAProxy config
//! rendered from its routes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use routecheck_engine::client::{ClusterClient, ObjectRef, Patch, PodRef, RemoteExec};
use routecheck_engine::snapshot::HAPROXY_CONFIG_PATH;
use routecheck_engine::{Error, Result};

type Validator = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// In-memory control plane
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<HashMap<ObjectRef, Value>>,
    validators: Vec<Validator>,
    failing_reads: AtomicU32,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject manifests for which `check` returns a message
    pub fn with_validator(
        mut self,
        check: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.validators.push(Box::new(check));
        self
    }

    /// Make the next `n` reads fail transiently
    pub fn fail_next_reads(&self, n: u32) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Seed an object directly, as if another actor created it
    pub fn insert(&self, mut object: Value) -> ObjectRef {
        let target = ObjectRef::from_manifest(&object).unwrap();
        if object.pointer("/metadata/generation").is_none() {
            object["metadata"]["generation"] = json!(1);
        }
        self.objects.lock().unwrap().insert(target.clone(), object);
        target
    }

    /// Stored copy of an object
    pub fn stored(&self, target: &ObjectRef) -> Option<Value> {
        self.objects.lock().unwrap().get(target).cloned()
    }

    /// Set a status condition, as a controller would
    pub fn set_condition(&self, target: &ObjectRef, condition_type: &str, status: &str) {
        let mut objects = self.objects.lock().unwrap();
        let object = objects.get_mut(target).unwrap();
        let conditions = object
            .pointer_mut("/status/conditions")
            .and_then(Value::as_array_mut)
            .map(std::mem::take)
            .unwrap_or_default();

        let mut conditions: Vec<Value> = conditions
            .into_iter()
            .filter(|c| c["type"] != condition_type)
            .collect();
        conditions.push(json!({ "type": condition_type, "status": status }));
        object["status"] = json!({ "conditions": conditions });
    }

    fn take_failing_read(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn get_object(&self, target: &ObjectRef) -> Result<Value> {
        if self.take_failing_read() {
            return Err(Error::transient("get_object", "connection reset by peer"));
        }
        self.stored(target).ok_or_else(|| target.not_found())
    }

    async fn create(&self, manifest: &Value) -> Result<ObjectRef> {
        let target = ObjectRef::from_manifest(manifest)?;
        for validator in &self.validators {
            if let Some(message) = validator(manifest) {
                return Err(Error::admission(&target.kind, &target.name, message));
            }
        }

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&target) {
            return Err(Error::admission(
                &target.kind,
                &target.name,
                format!("{} \"{}\" already exists", target.kind, target.name),
            ));
        }
        let mut object = manifest.clone();
        object["metadata"]["generation"] = json!(1);
        objects.insert(target.clone(), object);
        Ok(target)
    }

    async fn patch(&self, target: &ObjectRef, patch: &Patch) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects.get_mut(target).ok_or_else(|| target.not_found())?;
        let before = object.get("spec").cloned();

        match patch {
            Patch::Merge(value) => json_patch::merge(object, value),
            Patch::Json(ops) => {
                let ops: json_patch::Patch = serde_json::from_value(ops.clone())
                    .map_err(|e| Error::admission(&target.kind, &target.name, e.to_string()))?;
                json_patch::patch(object, &ops)
                    .map_err(|e| Error::admission(&target.kind, &target.name, e.to_string()))?;
            }
        }

        if object.get("spec").cloned() != before {
            let generation = object["metadata"]["generation"].as_i64().unwrap_or(0);
            object["metadata"]["generation"] = json!(generation + 1);
        }
        Ok(())
    }

    async fn delete(&self, target: &ObjectRef) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(target)
            .map(|_| ())
            .ok_or_else(|| target.not_found())
    }
}

/// One backend server behind a route
#[derive(Clone)]
pub struct Backend {
    pub name: &'static str,
    pub weight: u32,
}

/// A route as the router sees it
#[derive(Clone)]
pub struct Route {
    pub namespace: &'static str,
    pub name: &'static str,
    pub balance: &'static str,
    pub backends: Vec<Backend>,
}

impl Route {
    fn backend_marker(&self) -> String {
        format!("backend be_http:{}:{}", self.namespace, self.name)
    }
}

/// Router pod answering `curl` and `cat` for one route
pub struct FakeRouterPod {
    routes: Mutex<Vec<Route>>,
    current: Mutex<Vec<i64>>,
    requests: AtomicU32,
    cookie_name: &'static str,
}

impl FakeRouterPod {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: Mutex::new(routes),
            current: Mutex::new(Vec::new()),
            requests: AtomicU32::new(0),
            cookie_name: "0a1b2c3d",
        }
    }

    pub fn cookie_name(&self) -> &'static str {
        self.cookie_name
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Replace the routes, as a config reload would
    pub fn reload(&self, routes: Vec<Route>) {
        *self.routes.lock().unwrap() = routes;
        self.current.lock().unwrap().clear();
    }

    pub fn config(&self) -> String {
        let mut text = String::from(
            "global\n  maxconn 50000\n\ndefaults\n  timeout connect 5s\n  timeout server 30s\n\n",
        );
        for route in self.routes.lock().unwrap().iter() {
            text.push_str(&route.backend_marker());
            text.push('\n');
            text.push_str("  mode http\n");
            text.push_str(&format!("  balance {}\n", route.balance));
            text.push_str(&format!(
                "  cookie {} insert indirect nocache httponly\n",
                self.cookie_name
            ));
            // the router separates directive groups with blank lines
            text.push_str("\n  timeout check 5000ms\n");
            for b in &route.backends {
                text.push_str(&format!(
                    "  server pod:{0}:{1} 10.128.0.1:8080 cookie {0} weight {2}\n",
                    b.name, route.name, b.weight
                ));
            }
            text.push('\n');
        }
        text
    }

    /// Smooth weighted round robin over the first route's backends
    fn pick(&self) -> &'static str {
        let routes = self.routes.lock().unwrap();
        let backends = &routes[0].backends;
        let mut current = self.current.lock().unwrap();
        if current.len() != backends.len() {
            *current = vec![0; backends.len()];
        }

        let total: i64 = backends.iter().map(|b| i64::from(b.weight)).sum();
        for (c, b) in current.iter_mut().zip(backends) {
            *c += i64::from(b.weight);
        }
        let best = (0..backends.len())
            .max_by_key(|&i| (current[i], std::cmp::Reverse(i)))
            .unwrap();
        current[best] -= total;
        backends[best].name
    }

    fn respond(&self, argv: &[String]) -> String {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let replayed = argv
            .windows(2)
            .find(|w| w[0] == "--cookie")
            .and_then(|w| w[1].split_once('='))
            .filter(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.to_string());

        let (backend, set_cookie) = match replayed {
            Some(pinned) => (pinned, String::new()),
            None => {
                let chosen = self.pick();
                (
                    chosen.to_string(),
                    format!("set-cookie: {}={chosen}; path=/; HttpOnly\r\n", self.cookie_name),
                )
            }
        };

        format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n{set_cookie}\r\nHello from {backend}\n\nROUTECHECK_HTTP_STATUS=200\n"
        )
    }
}

#[async_trait]
impl RemoteExec for FakeRouterPod {
    async fn exec(&self, _pod: &PodRef, argv: &[String]) -> Result<String> {
        match argv.first().map(String::as_str) {
            Some("curl") => Ok(self.respond(argv)),
            Some("cat") if argv.get(1).map(String::as_str) == Some(HAPROXY_CONFIG_PATH) => {
                Ok(self.config())
            }
            Some("cat") => Err(Error::operation(
                "exec",
                format!("cat: {}: No such file or directory", argv[1..].join(" ")),
            )),
            _ => Err(Error::operation("exec", format!("executable not found: {argv:?}"))),
        }
    }

    async fn logs(&self, _pod: &PodRef, _tail: Option<i64>) -> Result<String> {
        Ok(format!("served {} requests\n", self.requests()))
    }
}
