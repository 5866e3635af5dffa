use std::fmt;

/// Which step of tenant initialization failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Provisioning,
    ConfigDerivation,
    RuntimeStart,
    Metadata,
    TimedOut,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Provisioning => "provisioning",
            FailureKind::ConfigDerivation => "config derivation",
            FailureKind::RuntimeStart => "runtime start",
            FailureKind::Metadata => "metadata lookup",
            FailureKind::TimedOut => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Errors produced while selecting, initializing or evicting tenants.
///
/// Cloneable so that one leader's outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenantError {
    #[error("storage provisioning failed: {0}")]
    Provisioning(String),
    #[error("config derivation failed: {0}")]
    ConfigDerivation(String),
    #[error("tenant runtime failed to start: {0}")]
    RuntimeStart(String),
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
    #[error("metadata store error: {0}")]
    Metadata(String),
    #[error("tenant '{id}' failed to initialize ({kind}): {reason}")]
    Initialization {
        id: String,
        kind: FailureKind,
        reason: String,
    },
}

impl TenantError {
    pub fn metadata(err: impl fmt::Display) -> Self {
        TenantError::Metadata(err.to_string())
    }

    /// Collapse a leaf error into the form carried by a failed registry slot.
    /// `UnknownTenant` passes through: nothing was attempted.
    pub fn into_initialization(self, id: &str) -> Self {
        let (kind, reason) = match self {
            TenantError::Provisioning(r) => (FailureKind::Provisioning, r),
            TenantError::ConfigDerivation(r) => (FailureKind::ConfigDerivation, r),
            TenantError::RuntimeStart(r) => (FailureKind::RuntimeStart, r),
            TenantError::Metadata(r) => (FailureKind::Metadata, r),
            other => return other,
        };
        TenantError::Initialization {
            id: id.to_string(),
            kind,
            reason,
        }
    }

    pub fn timed_out(id: &str, secs: u64) -> Self {
        TenantError::Initialization {
            id: id.to_string(),
            kind: FailureKind::TimedOut,
            reason: format!("initialization exceeded {}s", secs),
        }
    }

    pub fn cancelled(id: &str) -> Self {
        TenantError::Initialization {
            id: id.to_string(),
            kind: FailureKind::Cancelled,
            reason: "initializing task was dropped before publishing".into(),
        }
    }

    /// Failure kind for collapsed initialization errors.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            TenantError::Initialization { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_unknown_tenant(&self) -> bool {
        matches!(self, TenantError::UnknownTenant(_))
    }
}
