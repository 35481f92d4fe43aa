use crate::parser::ParseState;
use crate::ssl;
use std::convert;
use std::error;
use std::fmt;
use std::io;
use std::num;
use std::str;

#[derive(Debug)]
pub enum Error {
    /// A byte the grammar does not allow in `state`, at `position` within the fed buffer.
    ParseError {
        state: ParseState,
        byte: u8,
        position: usize,
    },
    /// Contradictory or malformed body framing headers.
    Framing(String),
    /// A response that cannot be matched to an outstanding request.
    Pairing(String),
    /// A start-line token, header or trailer block grew past the given limit.
    TokenTooLong(usize),
    InvalidHeader(String),
    InvalidTarget(String),
    UnexpectedEof(String),
    /// The parser already failed and refuses further input.
    ParserFailed,
    ParseIntError(num::ParseIntError),
    Utf8Error(str::Utf8Error),
    IoError(io::Error),
    Tls(ssl::Error),
}

pub type Result<R> = std::result::Result<R, Error>;

impl Error {
    pub fn is_eof(&self) -> bool {
        match self {
            Error::UnexpectedEof(_) => true,
            Error::IoError(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError {
                state,
                byte,
                position,
            } => write!(
                f,
                "unexpected byte {:#04x} at offset {} in state {:?}",
                byte, position, state
            ),
            Error::Framing(m) => write!(f, "invalid body framing: {}", m),
            Error::Pairing(m) => write!(f, "{}", m),
            Error::TokenTooLong(limit) => write!(f, "token longer than {} bytes", limit),
            Error::InvalidHeader(m) => write!(f, "invalid header: {}", m),
            Error::InvalidTarget(m) => write!(f, "invalid CONNECT target: {}", m),
            Error::UnexpectedEof(m) => write!(f, "unexpected end of stream: {}", m),
            Error::ParserFailed => write!(f, "parser already failed"),
            Error::ParseIntError(e) => write!(f, "{}", e),
            Error::Utf8Error(e) => write!(f, "{}", e),
            Error::IoError(e) => write!(f, "{}", e),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::Utf8Error(e) => Some(e),
            Error::ParseIntError(e) => Some(e),
            Error::Tls(e) => Some(e),
            _ => None,
        }
    }
}

impl convert::From<str::Utf8Error> for Error {
    fn from(e: str::Utf8Error) -> Self {
        Error::Utf8Error(e)
    }
}

impl convert::From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e)
    }
}

impl convert::From<num::ParseIntError> for Error {
    fn from(e: num::ParseIntError) -> Self {
        Error::ParseIntError(e)
    }
}

impl convert::From<ssl::Error> for Error {
    fn from(e: ssl::Error) -> Self {
        Error::Tls(e)
    }
}
