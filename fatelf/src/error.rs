use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Result type alias for FatELF operations.
pub type Result<T> = std::result::Result<T, FatElfError>;

/// All errors produced while building or launching a FatELF container.
///
/// Variants are split into two categories:
/// - **Infrastructure errors** (exit code 2): malformed inputs, bad usage, I/O failures
/// - **Operational errors** (exit code 1): the container or host cannot be paired up
#[derive(thiserror::Error, Debug)]
pub enum FatElfError {
    // ── Infrastructure errors (exit code 2) ──────────────────────────

    #[error("{path}: not a FatELF container: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("{path}: not an ELF image: {reason}")]
    NotAnElfImage { path: PathBuf, reason: String },

    #[error("{path}: truncated ELF header ({len} bytes)")]
    TruncatedImage { path: PathBuf, len: usize },

    #[error("Unknown OS ABI '{name}'")]
    UnknownAbiName { name: String },

    #[error("{message}")]
    Usage { message: String },

    #[error("Nothing to do: no input binaries")]
    NoInputs,

    #[error("Too many binaries (max is {limit})")]
    TooManyInputs { limit: usize },

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // ── Operational errors (exit code 1) ─────────────────────────────

    #[error("Running on unknown OS ABI: {sysname}")]
    UnresolvableHostAbi { sysname: String },

    #[error("Unable to find {target} in FatELF records")]
    NoMatchingArchitecture { target: String },

    #[error("'{first}' and '{second}' are for the same target ({osabi})")]
    DuplicateTarget {
        first: PathBuf,
        second: PathBuf,
        osabi: String,
    },
}

impl FatElfError {
    /// Wrap an I/O failure with the operation and the path it touched.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Wrap a failed system call (`nix` errno) the same way as [`FatElfError::io`].
    pub fn sys(op: &'static str, path: impl Into<PathBuf>, errno: nix::errno::Errno) -> Self {
        Self::io(op, path, io::Error::from(errno))
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Map each error variant to its process exit code.
    ///
    /// - `2`: infrastructure error (bad input, bad usage, I/O)
    /// - `1`: operational failure (no image for this host, conflicting targets)
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    /// Raw numeric form of [`FatElfError::exit_code`].
    pub fn exit_status(&self) -> u8 {
        match self {
            Self::Format { .. }
            | Self::NotAnElfImage { .. }
            | Self::TruncatedImage { .. }
            | Self::UnknownAbiName { .. }
            | Self::Usage { .. }
            | Self::NoInputs
            | Self::TooManyInputs { .. }
            | Self::Io { .. } => 2,

            Self::UnresolvableHostAbi { .. }
            | Self::NoMatchingArchitecture { .. }
            | Self::DuplicateTarget { .. } => 1,
        }
    }
}
