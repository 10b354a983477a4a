use std::fmt;
use std::io;

/// Ways a packing run can go wrong
#[derive(Debug)]
pub enum CliError {
    Io(io::Error),

    /// Malformed line in one of the input files
    Parse {
        file: String,
        line: usize,
        message: String,
    },
    Pack(dexpack::Error),
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> CliError {
        CliError::Io(err)
    }
}

impl From<dexpack::Error> for CliError {
    fn from(err: dexpack::Error) -> CliError {
        CliError::Pack(err)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(err) => write!(f, "IO - {}", err),
            CliError::Parse {
                file,
                line,
                message,
            } => write!(f, "{}:{}: {}", file, line, message),
            CliError::Pack(err) => write!(f, "Packing - {}", err),
        }
    }
}

impl std::error::Error for CliError {}
