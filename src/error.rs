use std::{fmt, result};

/// Crate-wide result type.
pub type Result<T> = result::Result<T, Error>;

/// Broad classification of everything that can go wrong in this crate.
///
/// Every variant here corresponds to a row in the error-handling table:
/// parse errors and unsupported messages are recoverable (log and drop),
/// `ConfigError`/`FatalError` abort the process at startup.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed bytes on the wire, or a field outside its valid range.
    MalformedPacket,
    /// A message type or TLV this server does not implement.
    UnsupportedMessage,
    /// Socket send/recv failed.
    IOError,
    /// TX or RX timestamp could not be read within the retry budget.
    TimestampUnavailable,
    /// A RequestUnicastTransmission violated `min_sub_interval`/`max_sub_duration`.
    PolicyRejected,
    /// No DelayResp subscription exists for an incoming DelayReq.
    UnknownSubscription,
    /// TOML parse or validation failure in `ServerConfig`.
    ConfigError,
    /// Bind/permission/interface/clock-identity failure at startup.
    FatalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: String) -> Error {
        Error { kind, msg }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::new(ErrorKind::IOError, err.to_string())
    }
}

/// Build and return an `Err(Error)` of the given kind, formatting the
/// remaining arguments as the message. `try:` wraps a fallible expression,
/// mapping its error into the given kind while prefixing it with the
/// formatted message.
#[macro_export]
macro_rules! err {
    ($kind:ident, desc: $($arg:tt)+) => {{
        Err($crate::error::Error::new($crate::error::ErrorKind::$kind, format!($($arg)+)))
    }};
    ($kind:ident, try: $e:expr, $($arg:tt)+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::error::Error::new(
                $crate::error::ErrorKind::$kind,
                format!("{} {}", format!($($arg)+), err),
            )),
        }
    }};
}
