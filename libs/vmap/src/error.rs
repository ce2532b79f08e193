use std::{io, path::PathBuf, sync::Arc};

use miette::Diagnostic;
use thiserror::Error;

use crate::math::Vector3;

/// Problems with the bytes of a tile file. These are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum FormatError {
    #[error("bad magic {found:?}, expected \"VMAP\"")]
    #[diagnostic(
        code(vmap::bad_magic),
        help("the file is not a vmap tile or was written by an incompatible tool")
    )]
    BadMagic { found: [u8; 4] },

    #[error("truncated {section}: needed {needed} bytes, {remaining} remaining")]
    #[diagnostic(
        code(vmap::truncated),
        help("the tile ended before its declared counts were satisfied")
    )]
    Truncated {
        section: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("index {index} out of range for {vertex_count} vertices")]
    #[diagnostic(code(vmap::index_out_of_range))]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("index count {index_count} is not a multiple of 3")]
    #[diagnostic(code(vmap::partial_triangle))]
    PartialTriangle { index_count: usize },
}

#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    #[error("format {0}")]
    #[diagnostic(transparent)]
    Format(#[from] FormatError),

    #[error("io {}: {source}", .path.display())]
    #[diagnostic(code(vmap::io), help("check the tile store path and permissions"))]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("config {0}")]
    #[diagnostic(code(vmap::config))]
    Config(Arc<toml::de::Error>),

    #[error("config not found {}", .0.display())]
    #[diagnostic(code(vmap::config_not_found))]
    ConfigNotFound(PathBuf),

    #[error("decode worker exited before replying")]
    #[diagnostic(code(vmap::decode_worker_lost))]
    DecodeWorkerLost,

    #[error("tile load abandoned before completion")]
    #[diagnostic(code(vmap::load_abandoned))]
    LoadAbandoned,

    #[error("coordinate ({}, {}, {}) is outside the map", .0.x, .0.y, .0.z)]
    #[diagnostic(
        code(vmap::invalid_coordinate),
        help("x and z must be finite and within 1e7 of the origin, y must be finite")
    )]
    InvalidCoordinate(Vector3),

    #[error("prefetch radius {radius} exceeds the maximum of {max}")]
    #[diagnostic(code(vmap::radius_too_large))]
    RadiusTooLarge { radius: u32, max: u32 },
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Error::Config(Arc::new(value))
    }
}

/// Coarse classification so callers can tell corrupt data from storage outages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Io,
    /// The query itself was rejected before any tile was touched.
    InvalidInput,
    Internal,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(_) => ErrorKind::Format,
            Error::Io { .. } => ErrorKind::Io,
            Error::Config(_)
            | Error::ConfigNotFound(_)
            | Error::DecodeWorkerLost
            | Error::LoadAbandoned => ErrorKind::Internal,
            Error::InvalidCoordinate(_) | Error::RadiusTooLarge { .. } => ErrorKind::InvalidInput,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io | ErrorKind::Internal)
    }
}
