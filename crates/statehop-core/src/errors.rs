use statehop_core_types::{SnapshotId, UserId};
use thiserror::Error;

/// Result type alias using SnapshotError
pub type Result<T> = std::result::Result<T, SnapshotError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable code so callers (the engine, the CLI, and
/// anything inspecting a locked session) can branch on the class of failure
/// without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    // Validation
    InvalidInput,
    NotFound,
    AlreadyExists,

    // Registry (fatal at startup)
    DuplicateIdentifier,
    ReservedNamespace,
    UnmetDependency,
    DependencyCycle,
    MissingSerializer,

    // Compatibility gate
    InvalidFormatVersion,
    InvalidHostVersion,
    InvalidPlatformType,
    NoLegacyConverter,

    // Encoding
    Serialization,
    Compression,

    // Integration/IO
    Io,
    Persistence,
    Handoff,
    Timeout,

    // Session
    SessionLocked,
    DataOwner,

    Config,
    Internal,
}

impl SyncErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            SyncErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            SyncErrorKind::NotFound => "ERR_NOT_FOUND",
            SyncErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            SyncErrorKind::DuplicateIdentifier => "ERR_DUPLICATE_IDENTIFIER",
            SyncErrorKind::ReservedNamespace => "ERR_RESERVED_NAMESPACE",
            SyncErrorKind::UnmetDependency => "ERR_UNMET_DEPENDENCY",
            SyncErrorKind::DependencyCycle => "ERR_DEPENDENCY_CYCLE",
            SyncErrorKind::MissingSerializer => "ERR_MISSING_SERIALIZER",
            SyncErrorKind::InvalidFormatVersion => "ERR_INVALID_FORMAT_VERSION",
            SyncErrorKind::InvalidHostVersion => "ERR_INVALID_HOST_VERSION",
            SyncErrorKind::InvalidPlatformType => "ERR_INVALID_PLATFORM_TYPE",
            SyncErrorKind::NoLegacyConverter => "ERR_NO_LEGACY_CONVERTER",
            SyncErrorKind::Serialization => "ERR_SERIALIZATION",
            SyncErrorKind::Compression => "ERR_COMPRESSION",
            SyncErrorKind::Io => "ERR_IO",
            SyncErrorKind::Persistence => "ERR_PERSISTENCE",
            SyncErrorKind::Handoff => "ERR_HANDOFF",
            SyncErrorKind::Timeout => "ERR_TIMEOUT",
            SyncErrorKind::SessionLocked => "ERR_SESSION_LOCKED",
            SyncErrorKind::DataOwner => "ERR_DATA_OWNER",
            SyncErrorKind::Config => "ERR_CONFIG",
            SyncErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether this kind comes from the load-time compatibility gate
    ///
    /// A session that hits one of these is locked rather than left empty.
    pub fn is_compatibility(&self) -> bool {
        matches!(
            self,
            SyncErrorKind::InvalidFormatVersion
                | SyncErrorKind::InvalidHostVersion
                | SyncErrorKind::InvalidPlatformType
                | SyncErrorKind::NoLegacyConverter
        )
    }
}

/// Canonical structured error type
///
/// Carries the classification plus whatever context was known where the
/// error was raised: the operation, the user, the snapshot and the feature
/// identifier.
#[derive(Debug, Clone)]
pub struct SyncError {
    kind: SyncErrorKind,
    op: Option<String>,
    user_id: Option<UserId>,
    snapshot_id: Option<SnapshotId>,
    identifier: Option<String>,
    message: String,
    source: Option<Box<SyncError>>,
}

impl SyncError {
    /// Create a new error with the specified kind
    pub fn new(kind: SyncErrorKind) -> Self {
        Self {
            kind,
            op: None,
            user_id: None,
            snapshot_id: None,
            identifier: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_snapshot_id(mut self, snapshot_id: SnapshotId) -> Self {
        self.snapshot_id = Some(snapshot_id);
        self
    }

    /// Add the feature identifier key (`namespace:key`)
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: SyncError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> SyncErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn snapshot_id(&self) -> Option<SnapshotId> {
        self.snapshot_id
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&SyncError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(user_id) = &self.user_id {
            write!(f, " (user_id: {})", user_id)?;
        }
        if let Some(snapshot_id) = &self.snapshot_id {
            write!(f, " (snapshot_id: {})", snapshot_id)?;
        }
        if let Some(identifier) = &self.identifier {
            write!(f, " (identifier: {})", identifier)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain errors raised by the snapshot model and the registries
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    // ===== Registry =====
    /// The identifier was already registered
    #[error("Identifier already registered: {key}")]
    DuplicateIdentifier { key: String },

    /// A custom identifier tried to use the built-in namespace
    #[error("Namespace of {key} is reserved for built-in identifiers")]
    ReservedNamespace { key: String },

    /// An enabled identifier requires a dependency that is missing or disabled
    #[error("{identifier} requires {dependency}, which is not registered and enabled")]
    UnmetDependency {
        identifier: String,
        dependency: String,
    },

    /// Registered identifiers depend on each other in a loop
    #[error("Dependency cycle between identifiers: {members:?}")]
    DependencyCycle { members: Vec<String> },

    /// No serializer is registered for the identifier
    #[error("No serializer registered for {key}")]
    MissingSerializer { key: String },

    // ===== Compatibility gate =====
    /// Snapshot was written by a newer format than this build understands
    #[error("Snapshot format version {found} is newer than supported version {supported}")]
    InvalidFormatVersion { found: u32, supported: u32 },

    /// Snapshot was written by a newer host than the one running
    #[error("Snapshot host version {found} is newer than running host version {running}")]
    InvalidHostVersion { found: String, running: String },

    /// Snapshot belongs to a different platform category
    #[error("Snapshot platform type {found} does not match {expected}")]
    InvalidPlatformType { found: String, expected: String },

    /// Snapshot format is older than natively readable and no converter exists
    #[error("No legacy converter registered for format version {format_version}")]
    NoLegacyConverter { format_version: u32 },

    // ===== Encoding =====
    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("Compression failed: {message}")]
    Compression { message: String },

    // ===== Validation =====
    /// Snapshot metadata or content failed validation
    #[error("Invalid snapshot: {reason}")]
    InvalidSnapshot { reason: String },

    /// Save cause name could not be used
    #[error("Invalid save cause: {reason}")]
    InvalidSaveCause { reason: String },

    // ===== Live state =====
    /// The data owner could not produce or apply a feature
    #[error("Data owner failed on {identifier}: {reason}")]
    Owner { identifier: String, reason: String },

    // ===== Config =====
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl From<SnapshotError> for SyncError {
    fn from(err: SnapshotError) -> Self {
        let message = err.to_string();
        match err {
            SnapshotError::DuplicateIdentifier { key } => {
                SyncError::new(SyncErrorKind::DuplicateIdentifier)
                    .with_op("register")
                    .with_identifier(key)
                    .with_message(message)
            }

            SnapshotError::ReservedNamespace { key } => {
                SyncError::new(SyncErrorKind::ReservedNamespace)
                    .with_op("register")
                    .with_identifier(key)
                    .with_message(message)
            }

            SnapshotError::UnmetDependency { identifier, .. } => {
                SyncError::new(SyncErrorKind::UnmetDependency)
                    .with_op("validate_dependencies")
                    .with_identifier(identifier)
                    .with_message(message)
            }

            SnapshotError::DependencyCycle { .. } => SyncError::new(SyncErrorKind::DependencyCycle)
                .with_op("validate_dependencies")
                .with_message(message),

            SnapshotError::MissingSerializer { key } => {
                SyncError::new(SyncErrorKind::MissingSerializer)
                    .with_identifier(key)
                    .with_message(message)
            }

            SnapshotError::InvalidFormatVersion { .. } => {
                SyncError::new(SyncErrorKind::InvalidFormatVersion)
                    .with_op("deserialize")
                    .with_message(message)
            }

            SnapshotError::InvalidHostVersion { .. } => {
                SyncError::new(SyncErrorKind::InvalidHostVersion)
                    .with_op("deserialize")
                    .with_message(message)
            }

            SnapshotError::InvalidPlatformType { .. } => {
                SyncError::new(SyncErrorKind::InvalidPlatformType)
                    .with_op("deserialize")
                    .with_message(message)
            }

            SnapshotError::NoLegacyConverter { .. } => {
                SyncError::new(SyncErrorKind::NoLegacyConverter)
                    .with_op("deserialize")
                    .with_message(message)
            }

            SnapshotError::Serialization { .. } => {
                SyncError::new(SyncErrorKind::Serialization).with_message(message)
            }

            SnapshotError::Compression { .. } => {
                SyncError::new(SyncErrorKind::Compression).with_message(message)
            }

            SnapshotError::InvalidSnapshot { .. } | SnapshotError::InvalidSaveCause { .. } => {
                SyncError::new(SyncErrorKind::InvalidInput).with_message(message)
            }

            SnapshotError::Owner { identifier, .. } => SyncError::new(SyncErrorKind::DataOwner)
                .with_identifier(identifier)
                .with_message(message),

            SnapshotError::Config { .. } => {
                SyncError::new(SyncErrorKind::Config).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Serialization {
            message: err.to_string(),
        }
    }
}
