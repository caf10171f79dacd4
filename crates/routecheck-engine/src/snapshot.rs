//! Config Snapshot Inspector
//!
//! Proxy configuration lists one block per routed service. Assertions run
//! against a single block so a substring that only exists in a sibling block
//! can never satisfy them.
//!
//! A block starts at an unindented line whose leading tokens equal the marker
//! (`backend be_http:ns:route`; token-exact, so `be_a` does not select
//! `be_ab`) and runs until the first of:
//!
//! - a blank line followed by an unindented line (or the end of the text)
//! - an unindented line starting with the marker's category (its first token)
//! - an unindented line starting with any section keyword of the syntax

use std::fmt;
use std::path::PathBuf;

use regex::Regex;
use tracing::debug;

use routecheck_common::retry::{retry_transient, RetryConfig};
use routecheck_common::{Error, Result};

use crate::client::{PodRef, RemoteExec};
use crate::poll::{Check, Poller};

/// Default location of the router's rendered HAProxy config
pub const HAPROXY_CONFIG_PATH: &str = "/var/lib/haproxy/conf/haproxy.config";

const HAPROXY_SECTIONS: &[&str] = &[
    "global",
    "defaults",
    "frontend",
    "backend",
    "listen",
    "userlist",
    "peers",
    "resolvers",
    "cache",
    "program",
    "http-errors",
    "ring",
    "mailers",
];

/// Top-level section keywords that always end a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSyntax {
    sections: Vec<String>,
}

impl BlockSyntax {
    /// HAProxy section keywords
    pub fn haproxy() -> Self {
        Self::new(HAPROXY_SECTIONS.iter().copied())
    }

    /// Custom section keywords
    pub fn new<S: Into<String>>(sections: impl IntoIterator<Item = S>) -> Self {
        Self {
            sections: sections.into_iter().map(Into::into).collect(),
        }
    }

    fn is_section(&self, token: &str) -> bool {
        self.sections.iter().any(|s| s == token)
    }
}

impl Default for BlockSyntax {
    fn default() -> Self {
        Self::haproxy()
    }
}

/// Raw text of a fetched configuration artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    text: String,
    syntax: BlockSyntax,
}

impl ConfigSnapshot {
    /// Snapshot with HAProxy block syntax
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_syntax(text, BlockSyntax::haproxy())
    }

    /// Snapshot with custom block syntax
    pub fn with_syntax(text: impl Into<String>, syntax: BlockSyntax) -> Self {
        Self {
            text: text.into(),
            syntax,
        }
    }

    /// The raw text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Extract the block introduced by `marker`.
    ///
    /// Fails with `Error::NotFound` (kind `config block`) when no line starts
    /// with the marker.
    pub fn block(&self, marker: &str) -> Result<ConfigBlock> {
        let wanted: Vec<&str> = marker.split_whitespace().collect();
        let Some(&category) = wanted.first() else {
            return Err(Error::operation("config block", "empty block marker"));
        };

        let mut lines = self.text.lines();
        let header = lines
            .by_ref()
            .find(|line| is_unindented(line) && starts_with_tokens(line, &wanted))
            .ok_or_else(|| Error::not_found("config block", marker, None))?;

        let rest: Vec<&str> = lines.collect();
        let mut body = Vec::new();
        for (i, line) in rest.iter().enumerate() {
            if line.trim().is_empty() {
                // blank lines between indented directives stay inside the block
                let resumes_body = rest[i + 1..]
                    .iter()
                    .find(|next| !next.trim().is_empty())
                    .is_some_and(|next| !is_unindented(next));
                if resumes_body {
                    continue;
                }
                break;
            }
            if is_unindented(line) {
                let first = line.split_whitespace().next().unwrap_or_default();
                if first == category || self.syntax.is_section(first) {
                    break;
                }
            }
            body.push(line.to_string());
        }

        Ok(ConfigBlock {
            header: header.trim_end().to_string(),
            lines: body,
        })
    }

    /// Headers of every block in `category` (e.g. all `backend` lines)
    pub fn headers(&self, category: &str) -> Vec<String> {
        self.text
            .lines()
            .filter(|line| is_unindented(line))
            .filter(|line| line.split_whitespace().next() == Some(category))
            .map(|line| line.trim_end().to_string())
            .collect()
    }
}

fn is_unindented(line: &str) -> bool {
    !line.starts_with(char::is_whitespace)
}

fn starts_with_tokens(line: &str, wanted: &[&str]) -> bool {
    let mut tokens = line.split_whitespace();
    wanted.iter().all(|w| tokens.next() == Some(*w))
}

/// One extracted block: its header line and body lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    header: String,
    lines: Vec<String>,
}

impl ConfigBlock {
    /// The header line
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Body lines, without the header
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Header and body, newline-joined
    pub fn text(&self) -> String {
        let mut text = self.header.clone();
        for line in &self.lines {
            text.push('\n');
            text.push_str(line);
        }
        text
    }

    /// Every needle occurs somewhere in the block
    pub fn assert_contains(&self, needles: &[&str]) -> Result<()> {
        let text = self.text();
        let missing: Vec<&str> = needles.iter().copied().filter(|n| !text.contains(n)).collect();
        self.verdict("missing", &missing)
    }

    /// No needle occurs in the block
    pub fn assert_not_contains(&self, needles: &[&str]) -> Result<()> {
        let text = self.text();
        let present: Vec<&str> = needles.iter().copied().filter(|n| text.contains(n)).collect();
        self.verdict("unexpectedly contains", &present)
    }

    /// Every pattern matches somewhere in the block
    pub fn assert_matches(&self, patterns: &[&str]) -> Result<()> {
        let text = self.text();
        let mut unmatched = Vec::new();
        for pattern in patterns {
            let re = Regex::new(pattern).map_err(|e| {
                Error::operation("assert_matches", format!("invalid regex {pattern:?}: {e}"))
            })?;
            if !re.is_match(&text) {
                unmatched.push(*pattern);
            }
        }
        self.verdict("no match for", &unmatched)
    }

    fn verdict(&self, what: &str, offenders: &[&str]) -> Result<()> {
        if offenders.is_empty() {
            return Ok(());
        }
        Err(Error::assertion(format!(
            "block {:?} {what} {offenders:?}:\n{}",
            self.header,
            self.text()
        )))
    }
}

impl fmt::Display for ConfigBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Where the inspector reads the configuration from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    /// `cat` a file in the pod
    File(PathBuf),
    /// Run a command and take its stdout
    Command(Vec<String>),
}

impl SnapshotSource {
    /// The router's HAProxy config file
    pub fn haproxy() -> Self {
        Self::File(PathBuf::from(HAPROXY_CONFIG_PATH))
    }

    fn argv(&self) -> Vec<String> {
        match self {
            SnapshotSource::File(path) => vec!["cat".to_string(), path.display().to_string()],
            SnapshotSource::Command(argv) => argv.clone(),
        }
    }
}

/// Fetches configuration snapshots from a running pod
pub struct SnapshotInspector<'a> {
    exec: &'a dyn RemoteExec,
    pod: PodRef,
    source: SnapshotSource,
    syntax: BlockSyntax,
    retry: RetryConfig,
}

impl<'a> SnapshotInspector<'a> {
    /// Inspector reading `source` from `pod` with HAProxy block syntax
    pub fn new(exec: &'a dyn RemoteExec, pod: PodRef, source: SnapshotSource) -> Self {
        Self {
            exec,
            pod,
            source,
            syntax: BlockSyntax::haproxy(),
            retry: RetryConfig::with_max_attempts(3),
        }
    }

    /// Use a different block syntax
    pub fn with_syntax(mut self, syntax: BlockSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Retry policy for transient exec failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The pod being inspected
    pub fn pod(&self) -> &PodRef {
        &self.pod
    }

    /// Fetch a fresh snapshot
    pub async fn fetch(&self) -> Result<ConfigSnapshot> {
        let argv = self.source.argv();
        let text = retry_transient(&self.retry, "fetch config snapshot", || {
            self.exec.exec(&self.pod, &argv)
        })
        .await?;
        debug!(pod = %self.pod, bytes = text.len(), "fetched config snapshot");
        Ok(ConfigSnapshot::with_syntax(text, self.syntax.clone()))
    }

    /// Fetch and extract one block
    pub async fn fetch_block(&self, marker: &str) -> Result<ConfigBlock> {
        self.fetch().await?.block(marker)
    }

    /// Poll until the block exists and contains every needle.
    ///
    /// The proxy reloads asynchronously after a route change, so a single
    /// fetch right after the mutation may still see the old config.
    pub async fn wait_for_block(
        &self,
        poller: &Poller,
        marker: &str,
        contains: &[&str],
    ) -> Result<ConfigBlock> {
        let description = format!("{} block {marker:?} in {}", self.pod, self.source_label());
        let expected = format!("contains {contains:?}");
        poller
            .until(&description, &expected, || async move {
                let block = self.fetch_block(marker).await?;
                Ok(match block.assert_contains(contains) {
                    Ok(()) => Check::Done(block),
                    Err(e) => Check::Pending(e.to_string()),
                })
            })
            .await
    }

    /// Poll until no block starts with `marker`
    pub async fn wait_for_block_absent(&self, poller: &Poller, marker: &str) -> Result<()> {
        let description = format!("{} block {marker:?} removed", self.pod);
        poller
            .until_absent(&description, || self.fetch_block(marker))
            .await
    }

    fn source_label(&self) -> String {
        match &self.source {
            SnapshotSource::File(path) => path.display().to_string(),
            SnapshotSource::Command(argv) => argv.join(" "),
        }
    }
}
