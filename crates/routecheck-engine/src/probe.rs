//! HTTP probes driven from inside a client pod
//!
//! Traffic tests run `curl` in a pod on the cluster network and parse what
//! comes back. [`CurlProbe`] builds the argv; its output always ends with a
//! status marker line so [`HttpResponse::parse`] can recover the status code
//! even when headers are not requested.

use std::time::Duration;

use routecheck_common::{Error, Result};

use crate::client::{PodRef, RemoteExec};

/// Prefix of the trailing line `curl -w` writes with the status code
pub const STATUS_MARKER: &str = "ROUTECHECK_HTTP_STATUS=";

/// Builder for a `curl` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurlProbe {
    url: String,
    resolve: Option<String>,
    host_header: Option<String>,
    cookie: Option<String>,
    insecure: bool,
    include_headers: bool,
    max_time: Option<Duration>,
    extra_args: Vec<String>,
}

impl CurlProbe {
    /// Probe `url` with headers included and a 10s limit
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resolve: None,
            host_header: None,
            cookie: None,
            insecure: false,
            include_headers: true,
            max_time: Some(Duration::from_secs(10)),
            extra_args: Vec::new(),
        }
    }

    /// Pin `host:port` to `address` (`--resolve`), bypassing DNS
    pub fn resolve(mut self, host: &str, port: u16, address: &str) -> Self {
        self.resolve = Some(format!("{host}:{port}:{address}"));
        self
    }

    /// Send an explicit `Host` header
    pub fn host_header(mut self, host: impl Into<String>) -> Self {
        self.host_header = Some(host.into());
        self
    }

    /// Replay a cookie (`name=value`)
    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Skip TLS verification (`-k`)
    pub fn insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    /// Body only; no response headers in the output
    pub fn body_only(mut self) -> Self {
        self.include_headers = false;
        self
    }

    /// Per-request limit (`--max-time`); `None` lets curl wait indefinitely
    pub fn max_time(mut self, limit: Option<Duration>) -> Self {
        self.max_time = limit;
        self
    }

    /// Append raw curl arguments before the URL
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// The full argv, starting with `curl`
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec!["curl".to_string(), "-sS".to_string()];
        if self.include_headers {
            argv.push("-i".to_string());
        }
        if self.insecure {
            argv.push("-k".to_string());
        }
        if let Some(limit) = self.max_time {
            argv.push("--max-time".to_string());
            argv.push(limit.as_secs().max(1).to_string());
        }
        if let Some(resolve) = &self.resolve {
            argv.push("--resolve".to_string());
            argv.push(resolve.clone());
        }
        if let Some(host) = &self.host_header {
            argv.push("-H".to_string());
            argv.push(format!("Host: {host}"));
        }
        if let Some(cookie) = &self.cookie {
            argv.push("--cookie".to_string());
            argv.push(cookie.clone());
        }
        argv.extend(self.extra_args.iter().cloned());
        argv.push("-w".to_string());
        argv.push(format!("\\n{STATUS_MARKER}%{{http_code}}\\n"));
        argv.push(self.url.clone());
        argv
    }

    /// Run the probe in `pod` and parse the response
    pub async fn run(&self, exec: &dyn RemoteExec, pod: &PodRef) -> Result<HttpResponse> {
        let output = exec.exec(pod, &self.argv()).await?;
        HttpResponse::parse(&output)
    }
}

/// A parsed curl response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code; 0 when curl got no response
    pub status: u16,
    /// Headers of the final response, in order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// Parse the output of a [`CurlProbe`].
    ///
    /// When redirects or `100 Continue` produce several header blocks, the
    /// last one is kept.
    pub fn parse(output: &str) -> Result<Self> {
        let marker_at = output.rfind(STATUS_MARKER).ok_or_else(|| {
            Error::operation("curl", format!("no status marker in output: {output:?}"))
        })?;
        let status_text = output[marker_at + STATUS_MARKER.len()..].trim();
        let status: u16 = status_text
            .parse()
            .map_err(|_| Error::operation("curl", format!("bad status code {status_text:?}")))?;

        let mut rest = output[..marker_at].strip_suffix('\n').unwrap_or(&output[..marker_at]);
        let mut headers = Vec::new();

        while rest.starts_with("HTTP/") {
            let (head, body) = split_head(rest);
            headers = head
                .lines()
                .skip(1)
                .filter_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    Some((name.trim().to_string(), value.trim().to_string()))
                })
                .collect();
            rest = body;
        }

        Ok(Self {
            status,
            headers,
            body: rest.to_string(),
        })
    }

    /// First header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `name=value` of the `Set-Cookie` header that sets `name`
    pub fn cookie(&self, name: &str) -> Option<String> {
        extract_cookie(&self.headers, name)
    }
}

fn split_head(text: &str) -> (&str, &str) {
    for sep in ["\r\n\r\n", "\n\n"] {
        if let Some(at) = text.find(sep) {
            return (&text[..at], &text[at + sep.len()..]);
        }
    }
    (text, "")
}

/// Find the `Set-Cookie` header for `name` and return `name=value`
/// without attributes (`Path`, `HttpOnly`, ...).
pub fn extract_cookie(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case("set-cookie"))
        .filter_map(|(_, v)| v.split(';').next())
        .map(str::trim)
        .find(|pair| pair.split_once('=').is_some_and(|(n, _)| n.trim() == name))
        .map(str::to_string)
}
