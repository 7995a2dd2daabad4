//! Error taxonomy for the blueprint orchestration engine.

use thiserror::Error;

/// A stable reason code identifying the kind of failure, independent of the
/// human-readable message. Hosts match on this rather than on `to_string()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    MissingChildBlueprintPath,
    EmptyChildBlueprintPath,
    ResourceTemplateLinkLengthMismatch,
    ReferenceCycle,
    CircularLinks,
    BlueprintCycleDetected,
    MaxBlueprintDepthExceeded,
    RemovedResourceHasDependents,
    RemovedChildHasDependents,
    ResourceNotFoundInState,
    LinkNotFoundInState,
    ChildNotFoundInState,
    InstanceNotFound,
    DeployMissingInstanceID,
    InstanceIDAndNameProvided,
    MissingNameForNewInstance,
    DeployMissingResourceChanges,
    DeployMissingPartiallyResolvedResource,
    InstanceStatusUpdateFailed,
    DriftDetected,
    ChildBlueprintError,
    Cancelled,
    Retryable,
    ResourceDeployError,
    ResourceDestroyError,
    Internal,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Error type for the engine. Every variant carries a [`ReasonCode`] so hosts
/// can branch on `err.reason()` without string matching.
#[derive(Debug, Error)]
pub enum Error {
    #[error("include is missing a child blueprint path")]
    MissingChildBlueprintPath,

    #[error("include's child blueprint path resolved to an empty string")]
    EmptyChildBlueprintPath,

    #[error(
        "linked templates have mismatched `each` lengths: {template_a} has {len_a}, {template_b} has {len_b}"
    )]
    ResourceTemplateLinkLengthMismatch {
        template_a: String,
        len_a: usize,
        template_b: String,
        len_b: usize,
    },

    #[error("reference cycle detected among: {0:?}")]
    ReferenceCycle(Vec<String>),

    #[error("circular link dependency detected among: {0:?}")]
    CircularLinks(Vec<String>),

    #[error("child blueprint at path '{0}' would become its own ancestor")]
    BlueprintCycleDetected(String),

    #[error("child blueprint nesting exceeds the maximum depth of {max_depth}")]
    MaxBlueprintDepthExceeded { max_depth: u32 },

    #[error("cannot remove resource '{name}': still depended on by {dependents:?}")]
    RemovedResourceHasDependents {
        name: String,
        dependents: Vec<String>,
    },

    #[error("cannot remove child '{name}': still depended on by {dependents:?}")]
    RemovedChildHasDependents {
        name: String,
        dependents: Vec<String>,
    },

    #[error("resource '{0}' referenced but not found in persisted state")]
    ResourceNotFoundInState(String),

    #[error("link '{0}' referenced but not found in persisted state")]
    LinkNotFoundInState(String),

    #[error("child '{0}' referenced but not found in persisted state")]
    ChildNotFoundInState(String),

    #[error("instance '{0}' not found")]
    InstanceNotFound(String),

    #[error("deploy input carries resource or child changes but no instance ID")]
    DeployMissingInstanceID,

    #[error("deploy input must not provide both an instance ID and an instance name")]
    InstanceIDAndNameProvided,

    #[error("a new instance requires an instance name")]
    MissingNameForNewInstance,

    #[error("internal invariant violated: deploy input is missing resource changes")]
    DeployMissingResourceChanges,

    #[error(
        "internal invariant violated: resource '{0}' has unresolved fields but no resolve-on-deploy entry"
    )]
    DeployMissingPartiallyResolvedResource(String),

    #[error("instance '{instance_id}' update failed: {message}")]
    InstanceStatusUpdateFailed {
        instance_id: String,
        message: String,
    },

    #[error("drift detected on {0} resource(s)")]
    DriftDetected(usize),

    #[error("error in child blueprint at '{path}': {source}")]
    ChildBlueprintError {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("operation cancelled")]
    Cancelled,

    /// Raised by a provider to signal a transient failure; the resource or
    /// link deployer absorbs this into its retry loop rather than
    /// terminating the element (spec §6).
    #[error("retryable provider error: {0}")]
    Retryable(String),

    /// Raised by a provider's `Deploy` to signal a non-retryable, terminal
    /// failure with provider-supplied failure reasons (spec §6).
    #[error("resource deploy failed: {}", .reasons.join("; "))]
    ResourceDeployError { reasons: Vec<String> },

    /// Raised by a provider's `Destroy` to signal a non-retryable, terminal
    /// failure with provider-supplied failure reasons (spec §6).
    #[error("resource destroy failed: {}", .reasons.join("; "))]
    ResourceDestroyError { reasons: Vec<String> },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn reason(&self) -> ReasonCode {
        match self {
            Error::MissingChildBlueprintPath => ReasonCode::MissingChildBlueprintPath,
            Error::EmptyChildBlueprintPath => ReasonCode::EmptyChildBlueprintPath,
            Error::ResourceTemplateLinkLengthMismatch { .. } => {
                ReasonCode::ResourceTemplateLinkLengthMismatch
            }
            Error::ReferenceCycle(_) => ReasonCode::ReferenceCycle,
            Error::CircularLinks(_) => ReasonCode::CircularLinks,
            Error::BlueprintCycleDetected(_) => ReasonCode::BlueprintCycleDetected,
            Error::MaxBlueprintDepthExceeded { .. } => ReasonCode::MaxBlueprintDepthExceeded,
            Error::RemovedResourceHasDependents { .. } => {
                ReasonCode::RemovedResourceHasDependents
            }
            Error::RemovedChildHasDependents { .. } => ReasonCode::RemovedChildHasDependents,
            Error::ResourceNotFoundInState(_) => ReasonCode::ResourceNotFoundInState,
            Error::LinkNotFoundInState(_) => ReasonCode::LinkNotFoundInState,
            Error::ChildNotFoundInState(_) => ReasonCode::ChildNotFoundInState,
            Error::InstanceNotFound(_) => ReasonCode::InstanceNotFound,
            Error::DeployMissingInstanceID => ReasonCode::DeployMissingInstanceID,
            Error::InstanceIDAndNameProvided => ReasonCode::InstanceIDAndNameProvided,
            Error::MissingNameForNewInstance => ReasonCode::MissingNameForNewInstance,
            Error::DeployMissingResourceChanges => ReasonCode::DeployMissingResourceChanges,
            Error::DeployMissingPartiallyResolvedResource(_) => {
                ReasonCode::DeployMissingPartiallyResolvedResource
            }
            Error::InstanceStatusUpdateFailed { .. } => ReasonCode::InstanceStatusUpdateFailed,
            Error::DriftDetected(_) => ReasonCode::DriftDetected,
            Error::ChildBlueprintError { .. } => ReasonCode::ChildBlueprintError,
            Error::Cancelled => ReasonCode::Cancelled,
            Error::Retryable(_) => ReasonCode::Retryable,
            Error::ResourceDeployError { .. } => ReasonCode::ResourceDeployError,
            Error::ResourceDestroyError { .. } => ReasonCode::ResourceDestroyError,
            Error::Internal(_) => ReasonCode::Internal,
        }
    }

    /// Failure reasons a provider attached, if this is a terminal
    /// deploy/destroy error; `None` for every other error kind.
    pub fn provider_failure_reasons(&self) -> Option<&[String]> {
        match self {
            Error::ResourceDeployError { reasons } | Error::ResourceDestroyError { reasons } => {
                Some(reasons)
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable(_))
    }

    /// Wrap `self` as having crossed a child-blueprint boundary at `path`,
    /// unless it already carries an innermost path (the wrap is idempotent
    /// on re-crossing so the path always names the deepest child).
    pub fn wrap_child_path(self, path: impl Into<String>) -> Error {
        match self {
            Error::ChildBlueprintError { .. } => self,
            other => Error::ChildBlueprintError {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
