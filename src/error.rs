use std::io;
use thiserror::Error;

/// Core error type for patchsmith.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("parse error: {message}{}", lineno_suffix(.lineno))]
    Parse {
        message: String,
        lineno: Option<usize>,
    },

    #[error("unexpected end of patch text")]
    UnexpectedEndOfPatch,

    #[error("malformed diffstat summary{}", lineno_suffix(.lineno))]
    MalformedSummary { lineno: Option<usize> },

    #[error("binary patch data error: {message}{}", lineno_suffix(.lineno))]
    Data {
        message: String,
        lineno: Option<usize>,
    },

    #[error("cannot strip {level} components from '{path}'")]
    TooManyStripLevels { path: String, level: usize },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("apply error: {message}")]
    Apply { message: String },

    #[error("config error: {message}")]
    Config { message: String },
}

fn lineno_suffix(lineno: &Option<usize>) -> String {
    match lineno {
        Some(n) => format!(" at line {n}"),
        None => String::new(),
    }
}

impl PatchError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            lineno: None,
        }
    }

    pub fn parse_at(message: impl Into<String>, lineno: usize) -> Self {
        Self::Parse {
            message: message.into(),
            lineno: Some(lineno),
        }
    }

    pub fn data_at(message: impl Into<String>, lineno: usize) -> Self {
        Self::Data {
            message: message.into(),
            lineno: Some(lineno),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The input line the error was detected on, when known (0-based).
    pub fn lineno(&self) -> Option<usize> {
        match self {
            Self::Parse { lineno, .. }
            | Self::MalformedSummary { lineno }
            | Self::Data { lineno, .. } => *lineno,
            _ => None,
        }
    }

    /// Returns true if this error describes malformed patch input (vs
    /// filesystem or configuration trouble).
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::UnexpectedEndOfPatch
                | Self::MalformedSummary { .. }
                | Self::Data { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;
