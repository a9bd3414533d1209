use std::fmt;

#[derive(Debug)]
pub enum PlatenError {
    InvalidConfiguration(String),
    BadPattern(String),
    Font(String),
    Io(std::io::Error),
}

impl fmt::Display for PlatenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatenError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            PlatenError::BadPattern(message) => {
                write!(f, "malformed cross-reference pattern: {}", message)
            }
            PlatenError::Font(message) => write!(f, "font error: {}", message),
            PlatenError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for PlatenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlatenError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PlatenError {
    fn from(value: std::io::Error) -> Self {
        PlatenError::Io(value)
    }
}
