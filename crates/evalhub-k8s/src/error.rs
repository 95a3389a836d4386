//! Kubernetes runtime error types.

use thiserror::Error;

/// Result type alias for job building and dispatch.
pub type K8sResult<T> = Result<T, K8sError>;

/// Result type alias for cluster primitives.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors raised while resolving, building, or submitting a benchmark run.
#[derive(Debug, Error)]
pub enum K8sError {
    /// Missing or invalid input; raised before any cluster mutation.
    #[error("{0}")]
    Validation(String),

    #[error("provider {0:?} not found")]
    UnknownProvider(String),

    #[error("invalid {field} quantity {value:?}")]
    InvalidQuantity { field: &'static str, value: String },

    #[error("quantity pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("marshal job spec: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A cluster primitive failed at `action`.
    #[error("{action}: {source}")]
    Cluster {
        action: &'static str,
        #[source]
        source: ClusterError,
    },

    #[error("kubernetes client: {0}")]
    Connect(#[from] kube::Error),
}

impl K8sError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Failure from a cluster primitive. Not-found is distinguishable from
/// every other failure via [`ClusterError::is_not_found`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} {name:?}: api error {code}: {message}")]
    Api {
        kind: &'static str,
        name: String,
        code: u16,
        message: String,
    },

    #[error("{kind} {name:?}: {message}")]
    Transport {
        kind: &'static str,
        name: String,
        message: String,
    },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Translate a `kube` client error for the object `kind`/`name`.
    pub fn from_kube(err: kube::Error, kind: &'static str, name: &str) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound {
                kind,
                name: name.to_string(),
            },
            kube::Error::Api(response) if response.code == 409 => Self::AlreadyExists {
                kind,
                name: name.to_string(),
            },
            kube::Error::Api(response) => Self::Api {
                kind,
                name: name.to_string(),
                code: response.code,
                message: response.message,
            },
            other => Self::Transport {
                kind,
                name: name.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Every non-not-found failure collected while tearing down an evaluation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", join_errors(.errors))]
pub struct TeardownError {
    errors: Vec<ClusterError>,
}

impl TeardownError {
    pub fn new(errors: Vec<ClusterError>) -> Self {
        Self { errors }
    }

    /// The underlying causes, in the order they were encountered.
    pub fn errors(&self) -> &[ClusterError] {
        &self.errors
    }
}

fn join_errors(errors: &[ClusterError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
