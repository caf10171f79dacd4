//! `RemoteExec` over the pods/exec and pods/log subresources

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, LogParams};
use kube::Client;
use routecheck_common::{Error, Result};
use routecheck_engine::{ObjectRef, PodRef, RemoteExec};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::errors::{classify, Access};

/// curl exit codes that describe the network path rather than the command:
/// resolve (6), connect (7), timeout (28), TLS handshake (35),
/// empty reply (52) and receive failure (56)
const CURL_TRANSIENT_EXIT_CODES: &[i32] = &[6, 7, 28, 35, 52, 56];

/// Remote command execution backed by kube-rs
#[derive(Clone)]
pub struct KubeExec {
    client: Client,
}

impl KubeExec {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, pod: &PodRef) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &pod.namespace)
    }
}

fn pod_target(pod: &PodRef) -> ObjectRef {
    ObjectRef::namespaced("v1", "Pod", &pod.namespace, &pod.name)
}

async fn read_stream(reader: Option<impl AsyncRead + Unpin>) -> Result<String> {
    let mut out = String::new();
    if let Some(mut reader) = reader {
        reader
            .read_to_string(&mut out)
            .await
            .map_err(|e| Error::transient("exec", format!("stream read failed: {}", e)))?;
    }
    Ok(out)
}

/// Exit code reported in the status causes of a failed exec
fn exit_code(status: &Status) -> Option<i32> {
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))?
        .message
        .as_ref()?
        .parse()
        .ok()
}

/// Translate the exec status into stdout or a classified error
fn exit_outcome(
    argv: &[String],
    status: Option<&Status>,
    stdout: String,
    stderr: &str,
) -> Result<String> {
    let Some(status) = status else {
        return Ok(stdout);
    };
    if status.status.as_deref() == Some("Success") {
        return Ok(stdout);
    }

    let program = argv.first().map(String::as_str).unwrap_or_default();
    let detail = if stderr.trim().is_empty() {
        status.message.clone().unwrap_or_default()
    } else {
        stderr.trim().to_string()
    };

    match exit_code(status) {
        Some(code) if program == "curl" && CURL_TRANSIENT_EXIT_CODES.contains(&code) => {
            Err(Error::transient(
                "exec",
                format!("{} exited {}: {}", program, code, detail),
            ))
        }
        Some(code) => Err(Error::operation(
            "exec",
            format!("{} exited {}: {}", program, code, detail),
        )),
        None => Err(Error::operation(
            "exec",
            format!("{} failed: {}", program, detail),
        )),
    }
}

#[async_trait]
impl RemoteExec for KubeExec {
    async fn exec(&self, pod: &PodRef, argv: &[String]) -> Result<String> {
        let mut params = AttachParams::default().stdout(true).stderr(true);
        if let Some(container) = &pod.container {
            params = params.container(container.clone());
        }

        let mut attached = self
            .pods(pod)
            .exec(&pod.name, argv.to_vec(), &params)
            .await
            .map_err(|e| classify(e, Access::Read, "exec", &pod_target(pod)))?;

        let status_future = attached.take_status();
        let stdout_reader = attached.stdout();
        let stderr_reader = attached.stderr();
        let (stdout, stderr) = tokio::join!(read_stream(stdout_reader), read_stream(stderr_reader));
        let (stdout, stderr) = (stdout?, stderr?);
        let status = match status_future {
            Some(future) => future.await,
            None => None,
        };

        debug!(pod = %pod, program = ?argv.first(), bytes = stdout.len(), "Exec finished");
        exit_outcome(argv, status.as_ref(), stdout, &stderr)
    }

    async fn logs(&self, pod: &PodRef, tail: Option<i64>) -> Result<String> {
        let params = LogParams {
            container: pod.container.clone(),
            tail_lines: tail,
            ..Default::default()
        };
        self.pods(pod)
            .logs(&pod.name, &params)
            .await
            .map_err(|e| classify(e, Access::Read, "logs", &pod_target(pod)))
    }
}
