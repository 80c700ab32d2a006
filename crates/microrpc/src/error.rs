//! # Error Definitions

/// Framing and header decoding failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Declared lengths disagree with the bytes present, or text is not UTF-8.
    MalformedFrame(String),
    /// The frame length exceeds the configured maximum.
    FrameTooLarge { size: usize, max: usize },
    /// The underlying stream failed.
    Io(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedFrame(msg) => write!(f, "Malformed frame: {}", msg),
            Self::FrameTooLarge { size, max } => {
                write!(f, "Frame of {} bytes exceeds maximum of {}", size, max)
            }
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
