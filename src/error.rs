use serde::{Serialize, Deserialize};
use std::fmt;

/// Broad failure class, used by the sync engine to decide between
/// rollback and offline queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity was lost or the request never reached the server
    Network,
    /// The server answered and refused the mutation (auth, validation, fault)
    Rejected,
    /// Local durable storage failed
    Storage,
    /// Settings could not be loaded
    Config,
}

/// Message fragments that mark a failure as caused by lost connectivity.
const OFFLINE_PATTERNS: &[&str] = &[
    "network",
    "offline",
    "failed to fetch",
    "load failed",
    "connection",
    "timed out",
    "timeout",
    "dns error",
    "unreachable",
];

/// Unified error type for the progress core.
/// Every fallible operation returns Result<T, ProgressError>.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressError {
    pub message: String,
    pub stage: String,
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub context: Option<String>,
    pub origin: Option<String>,
}

impl ProgressError {
    /// Create a new error with stage and message
    pub fn new<S: Into<String>>(message: S, stage: &'static str, kind: ErrorKind) -> Self {
        ProgressError {
            message: message.into(),
            stage: stage.to_string(),
            kind,
            status: None,
            context: None,
            origin: None,
        }
    }

    pub fn network<S: Into<String>>(message: S, stage: &'static str) -> Self {
        Self::new(message, stage, ErrorKind::Network)
    }

    pub fn rejected<S: Into<String>>(message: S, stage: &'static str) -> Self {
        Self::new(message, stage, ErrorKind::Rejected)
    }

    pub fn storage<S: Into<String>>(message: S, stage: &'static str) -> Self {
        Self::new(message, stage, ErrorKind::Storage)
    }

    /// Attach the HTTP status the server answered with
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Add additional context information
    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Record which library or layer produced the error
    pub fn with_origin<S: Into<String>>(mut self, origin: S) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// True when the failure should be queued for replay instead of rolled back.
    ///
    /// A server that answered with a status code is never offline-like, even
    /// if its message happens to mention a connection.
    pub fn is_offline_like(&self) -> bool {
        if self.kind == ErrorKind::Network {
            return true;
        }
        if self.status.is_some() || self.kind != ErrorKind::Rejected {
            return false;
        }
        let lowered = self.message.to_lowercase();
        OFFLINE_PATTERNS.iter().any(|p| lowered.contains(p))
    }
}

impl fmt::Display for ProgressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status: {})", status)?;
        }
        if let Some(ref context) = self.context {
            write!(f, " (context: {})", context)?;
        }
        if let Some(ref origin) = self.origin {
            write!(f, " (origin: {})", origin)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProgressError {}

impl From<anyhow::Error> for ProgressError {
    fn from(err: anyhow::Error) -> Self {
        // Transport failures keep their reqwest cause somewhere in the chain
        let kind = match err.chain().find_map(|c| c.downcast_ref::<reqwest::Error>()) {
            Some(e) => classify_reqwest(e),
            None => ErrorKind::Rejected,
        };
        ProgressError::new(format!("{:#}", err), "remote", kind).with_origin("anyhow")
    }
}

impl From<reqwest::Error> for ProgressError {
    fn from(err: reqwest::Error) -> Self {
        let kind = classify_reqwest(&err);
        let mut error = ProgressError::new(format!("Request failed: {}", err), "remote", kind)
            .with_origin("reqwest");
        if let Some(status) = err.status() {
            error = error.with_status(status.as_u16());
        }
        error
    }
}

impl From<std::io::Error> for ProgressError {
    fn from(err: std::io::Error) -> Self {
        ProgressError::storage(format!("I/O error: {}", err), "io").with_origin("std::io")
    }
}

impl From<serde_json::Error> for ProgressError {
    fn from(err: serde_json::Error) -> Self {
        ProgressError::storage(format!("JSON error: {}", err), "json_parse")
            .with_origin("serde_json")
    }
}

impl From<tokio::time::error::Elapsed> for ProgressError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProgressError::network("Operation timed out", "timeout").with_origin("tokio::time")
    }
}

fn classify_reqwest(err: &reqwest::Error) -> ErrorKind {
    if err.is_connect() || err.is_timeout() || (err.is_request() && err.status().is_none()) {
        ErrorKind::Network
    } else {
        ErrorKind::Rejected
    }
}
