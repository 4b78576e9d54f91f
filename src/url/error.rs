use thiserror::Error;

/// Errors produced while parsing a notification URL
///
/// Messages never echo credentials or query values back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("invalid scheme '{0}'")]
    InvalidScheme(String),

    #[error("invalid percent-escape at byte {position}")]
    InvalidEscape { position: usize },

    #[error("percent-decoded value is not valid UTF-8")]
    InvalidEncoding,

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("query parameter with an empty name")]
    EmptyQueryKey,

    #[error("ambiguous authority: more than one '@' (escape it as %40)")]
    AmbiguousAuthority,
}
