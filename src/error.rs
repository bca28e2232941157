//! Error kinds shared by every layer of the crate.

use std::path::PathBuf;

use crate::shader::ShaderStage;

/// Errors surfaced by shader, program, state and array-data operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A parameter is out of its legal domain (component count, stride,
    /// pixel format/type, alignment, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The object is not in a state that permits the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A shader source, binary or `#include` target could not be found.
    #[error("resource not found: {name}{}", origin.as_ref().map(|o| format!(" ({o})")).unwrap_or_default())]
    ResourceNotFound {
        /// Logical or resolved name that was looked up.
        name: String,
        /// Where the lookup originated, e.g. `main.vp:2: #include "lib.inc"`.
        origin: Option<String>,
    },

    /// A shader stage failed to compile.
    #[error("shader {id} ({stage}) failed to compile: {log}")]
    Compile {
        /// Shader code id.
        id: u32,
        /// Stage of the failing shader code.
        stage: ShaderStage,
        /// Driver info log.
        log: String,
    },

    /// A shader program failed to link.
    #[error("program {id} failed to link: {log}")]
    Link {
        /// Shader program id.
        id: u32,
        /// Driver info log.
        log: String,
    },

    /// The driver reported a failure.
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Reading a shader file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Crate result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            name: name.into(),
            origin: None,
        }
    }
}
