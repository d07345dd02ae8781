//! # Errors
//! Errors emitted by fk2ck_core

use chrono::ParseError;
use std::{error, fmt, io};

/// fk2ck specific result.
pub type ConvResult<T> = Result<T, Error>;

/// Possible Errors which may be raised by this crate.
///
/// Every one of these is fatal to a conversion run, nothing in this crate retries.
#[derive(Debug, Clone)]
pub enum Error {
    /// Required run configuration is missing, empty, or inconsistent.
    Configuration(String),

    /// Refusing to overwrite a file which already exists.
    AlreadyExists(String),

    /// A kernel pool variable was missing, or did not hold the requested value.
    PoolLookup(String),

    /// A kernel file could not be read or understood.
    KernelLoad(String),

    /// Attempting to use a frame of reference which is not known.
    UnknownFrame(String),

    /// Querying a DAF file failed due to it missing the requisite data.
    DAFLimits(String),

    /// Input or variable exceeded expected or allowed bounds.
    ValueError(String),

    /// Error related to IO.
    IOError(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(s) => {
                write!(f, "Configuration error: {}", s)
            }
            Error::AlreadyExists(s) => {
                write!(f, "File already exists, will not overwrite: {}", s)
            }
            Error::PoolLookup(s) => {
                write!(f, "Kernel pool lookup failed: {}", s)
            }
            Error::KernelLoad(s) => {
                write!(f, "Failed to load kernel: {}", s)
            }
            Error::UnknownFrame(s) => {
                write!(f, "Reference frame {:?} is not known.", s)
            }
            Error::DAFLimits(s) => {
                write!(f, "{}", s)
            }
            Error::ValueError(s) => {
                write!(f, "{}", s)
            }
            Error::IOError(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::IOError(error.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(value: std::num::ParseIntError) -> Self {
        Error::IOError(value.to_string())
    }
}
impl From<std::num::ParseFloatError> for Error {
    fn from(value: std::num::ParseFloatError) -> Self {
        Error::IOError(value.to_string())
    }
}

impl From<ParseError> for Error {
    fn from(value: ParseError) -> Self {
        Error::IOError(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = Error::AlreadyExists("out.bc".into());
        assert!(err.to_string().contains("out.bc"));

        let err = Error::UnknownFrame("FOO".into());
        assert!(err.to_string() == "Reference frame \"FOO\" is not known.");

        let err: Error = "x1.5".parse::<f64>().unwrap_err().into();
        assert!(matches!(err, Error::IOError(_)));
    }
}
