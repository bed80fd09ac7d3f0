use std::fmt::Display;

/// Srcstore errors.
#[derive(Debug)]
pub enum Error {
    /// A requested entity (repo, version, unit, def) or file does not exist.
    NotExist(String),
    /// A unit directory exists but its data files were never written.
    /// Treated as not-exist by callers; kept distinct for diagnostics.
    NotInitialized,
    /// Invalid on-disk data: decode failures, checksum mismatches, truncated
    /// records, or index blobs with an unexpected shape.
    Corrupt(String),
    /// An underlying filesystem error.
    Io(std::io::Error),
}

impl Error {
    /// Reports whether the error means "the thing you asked for is not
    /// there". `NotInitialized` satisfies this: a unit directory without data
    /// files holds no entities.
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Error::NotExist(_) | Error::NotInitialized)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::NotExist(what) => write!(f, "does not exist: {what}"),
            Error::NotInitialized => write!(f, "store not initialized"),
            Error::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

/// Constructs an Error::Corrupt from the given format string.
#[macro_export]
macro_rules! corrupt {
    ($($args:tt)*) => { $crate::error::Error::Corrupt(format!($($args)*)) };
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::NotExist(err.to_string())
        } else {
            Error::Io(err)
        }
    }
}

impl From<Box<bincode::ErrorKind>> for Error {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        Error::Corrupt(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}

/// A srcstore Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;
