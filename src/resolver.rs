//! Resolution gateway seam and the subprocess-backed resolver.
//!
//! Resolution is a blocking call that can take from hundreds of milliseconds
//! to several seconds (camera capture plus model inference). The router only
//! sees the `ResolutionGateway` trait; `CommandResolver` is the stock
//! implementation that shells out to the capture/inference pipeline.

use crate::core::event::{RawEvent, ResolutionVerdict};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// External disambiguation capability.
///
/// May block for seconds; must never be called while holding the window
/// buffer lock.
pub trait ResolutionGateway: Send + Sync {
    fn resolve(&self, events: &[RawEvent]) -> Result<ResolutionVerdict, ResolverError>;
}

/// Errors from a resolution attempt.
#[derive(Debug)]
pub enum ResolverError {
    /// The resolver process could not be started or driven.
    Launch(String),
    /// The resolver process exited with a failure status.
    Failed { code: Option<i32>, output: String },
    /// The resolver produced no output at all.
    EmptyOutput,
    /// The resolver output could not be parsed into a verdict.
    Malformed(String),
    /// The remote gateway could not be reached or answered with an error.
    Unavailable(String),
}

impl std::fmt::Display for ResolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolverError::Launch(msg) => write!(f, "could not launch resolver: {msg}"),
            ResolverError::Failed { code, output } => match code {
                Some(code) => write!(f, "resolver exited with code {code}: {output}"),
                None => write!(f, "resolver terminated by signal: {output}"),
            },
            ResolverError::EmptyOutput => write!(f, "resolver produced no output"),
            ResolverError::Malformed(msg) => write!(f, "malformed resolver output: {msg}"),
            ResolverError::Unavailable(msg) => write!(f, "resolver unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ResolverError {}

/// Default confidence threshold when the backend reports only a raw score.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.80;

/// Placeholder gateway for deployments without a resolution backend.
///
/// Every attempt fails as unavailable, so ambiguous windows follow the
/// configured failure policy.
pub struct NoResolver;

impl ResolutionGateway for NoResolver {
    fn resolve(&self, _events: &[RawEvent]) -> Result<ResolutionVerdict, ResolverError> {
        Err(ResolverError::Unavailable(
            "no resolution backend configured".to_string(),
        ))
    }
}

/// Resolver that runs an external capture/inference program.
///
/// The candidate events are written to the child's stdin as
/// `{"events": [...]}`; the child prints a single JSON verdict on stdout.
/// If the verdict omits the `resolved_ambiguity` flag, it is derived by
/// comparing `confidence` against the configured threshold.
pub struct CommandResolver {
    program: PathBuf,
    args: Vec<String>,
    confidence_threshold: f64,
}

impl CommandResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Check that the configured program exists before the first window
    /// needs it.
    pub fn validate(&self) -> Result<(), ResolverError> {
        if self.program.as_os_str().is_empty() || !Path::new(&self.program).exists() {
            return Err(ResolverError::Launch(format!(
                "resolver program does not exist: {}",
                self.program.display()
            )));
        }
        Ok(())
    }

    fn run(&self, input: &str) -> Result<String, ResolverError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ResolverError::Launch(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| ResolverError::Launch(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ResolverError::Launch(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ResolverError::Failed {
                code: output.status.code(),
                output: stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(ResolverError::EmptyOutput);
        }
        Ok(stdout)
    }

    /// Parse the backend's JSON into a verdict, deriving the resolved flag
    /// from the confidence threshold when the backend leaves it out.
    fn parse_verdict(&self, output: &str) -> Result<ResolutionVerdict, ResolverError> {
        let value: serde_json::Value =
            serde_json::from_str(output).map_err(|e| ResolverError::Malformed(e.to_string()))?;

        let confidence = value.get("confidence").and_then(|v| v.as_f64());
        let activity = value
            .get("activity")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let resolved = match value.get("resolved_ambiguity").and_then(|v| v.as_bool()) {
            Some(flag) => flag,
            None => {
                if confidence.is_none() {
                    warn!("resolver output carries neither resolved flag nor confidence");
                }
                confidence.is_some_and(|c| c >= self.confidence_threshold)
            }
        };

        Ok(ResolutionVerdict {
            resolved,
            activity,
            confidence,
        })
    }
}

impl ResolutionGateway for CommandResolver {
    fn resolve(&self, events: &[RawEvent]) -> Result<ResolutionVerdict, ResolverError> {
        let input = serde_json::to_string(&json!({ "events": events }))
            .map_err(|e| ResolverError::Malformed(e.to_string()))?;
        let output = self.run(&input)?;
        debug!(output = %output, "resolver output");
        self.parse_verdict(&output)
    }
}
