//! Fatal compilation errors.

use std::panic::Location;

use thiserror::Error;

/// Where a stencil author declared an equation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl From<&'static Location<'static>> for SourceLocation {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl core::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("malformed index in equation at {location}: {message}")]
    MalformedIndex {
        location: SourceLocation,
        message: String,
    },

    #[error("malformed condition in equation at {location}: {message}")]
    MalformedCondition {
        location: SourceLocation,
        message: String,
    },

    #[error("invalid grid declaration: {0}")]
    InvalidGrid(String),

    #[error("bundling conflict: {0}")]
    BundlingConflict(String),

    #[error("invalid fold: {0}")]
    InvalidFold(String),

    #[error("invalid tile: {0}")]
    InvalidTile(String),

    #[error("unknown stencil `{name}` (known stencils: {known})")]
    UnknownStencil { name: String, known: String },

    #[error("stencil `{0}` is already registered")]
    DuplicateStencil(String),

    #[error("invalid setting `{setting}`: {message}")]
    InvalidSetting { setting: String, message: String },

    #[error("invalid loop specification: {0}")]
    LoopSpec(String),

    #[error("failed to write `{path}`: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn invalid_setting(setting: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            setting: setting.into(),
            message: message.into(),
        }
    }
}

/// `io::Error` is not `Clone`, so a copied output error keeps only the kind
/// and message of its source
impl Clone for CompileError {
    fn clone(&self) -> Self {
        match self {
            Self::MalformedIndex { location, message } => Self::MalformedIndex {
                location: *location,
                message: message.clone(),
            },
            Self::MalformedCondition { location, message } => Self::MalformedCondition {
                location: *location,
                message: message.clone(),
            },
            Self::InvalidGrid(message) => Self::InvalidGrid(message.clone()),
            Self::BundlingConflict(message) => Self::BundlingConflict(message.clone()),
            Self::InvalidFold(message) => Self::InvalidFold(message.clone()),
            Self::InvalidTile(message) => Self::InvalidTile(message.clone()),
            Self::UnknownStencil { name, known } => Self::UnknownStencil {
                name: name.clone(),
                known: known.clone(),
            },
            Self::DuplicateStencil(name) => Self::DuplicateStencil(name.clone()),
            Self::InvalidSetting { setting, message } => Self::InvalidSetting {
                setting: setting.clone(),
                message: message.clone(),
            },
            Self::LoopSpec(message) => Self::LoopSpec(message.clone()),
            Self::Output { path, source } => Self::Output {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
        }
    }
}
