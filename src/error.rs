//! Error taxonomy for content-source failures.
//!
//! Every failure surfaced by a [`crate::source::ContentSource`] is an
//! [`AppError`]. Sources that cannot tell what went wrong return
//! [`AppError::Other`]; the engines then reclassify the message with
//! [`AppError::attribute`] so that every failure reaching a notification or a
//! search slot is either a network, parse or plugin error.

use std::fmt;

use thiserror::Error;

/// Message fragments that identify connectivity and timeout failures.
const NETWORK_MARKERS: [&str; 7] = [
    "network",
    "fetch",
    "timeout",
    "econnrefused",
    "enotfound",
    "unable to resolve host",
    "network request failed",
];

/// Message fragments that identify malformed source payloads.
const PARSE_MARKERS: [&str; 4] = ["parse", "json", "unexpected token", "invalid html"];

/// Coarse category of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Parse,
    Plugin,
    Other,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parse => "parse",
            Self::Plugin => "plugin",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised while talking to a content source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Connectivity problem or deadline expiry.
    #[error("{message}")]
    Network { message: String },

    /// The source answered with something it could not parse.
    #[error("{message}")]
    Parse { message: String },

    /// Failure attributable to a specific plugin.
    #[error("{message}")]
    Plugin { plugin_id: String, message: String },

    /// Unclassified failure.
    #[error("{message}")]
    Other { message: String },
}

impl AppError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn plugin(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin_id: plugin_id.into(),
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Classifies a raw error message.
    ///
    /// Network markers win over parse markers; anything else becomes a plugin
    /// error when the plugin is known and a generic error otherwise.
    #[must_use]
    pub fn classify(message: &str, plugin_id: Option<&str>) -> Self {
        let lower = message.to_lowercase();

        if NETWORK_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Self::network(message);
        }

        if PARSE_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Self::parse(message);
        }

        match plugin_id {
            Some(plugin_id) => Self::plugin(plugin_id, message),
            None => Self::other(message),
        }
    }

    /// Reclassifies an unclassified error against the plugin that produced it.
    ///
    /// Errors that already carry a kind are returned unchanged.
    #[must_use]
    pub fn attribute(self, plugin_id: &str) -> Self {
        match self {
            Self::Other { message } => Self::classify(&message, Some(plugin_id)),
            classified => classified,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Plugin { .. } => ErrorKind::Plugin,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Returns the plugin this error is attributed to, if any.
    #[must_use]
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            Self::Plugin { plugin_id, .. } => Some(plugin_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Network { message }
            | Self::Parse { message }
            | Self::Plugin { message, .. }
            | Self::Other { message } => message,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::classify(&error.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network_request_failed() {
        let error = AppError::classify("Network request failed", None);
        assert_eq!(error.kind(), ErrorKind::Network);
        assert_eq!(error.message(), "Network request failed");
    }

    #[test]
    fn test_classify_timeout_is_network() {
        assert_eq!(
            AppError::classify("Request timeout", None).kind(),
            ErrorKind::Network
        );
    }

    #[test]
    fn test_classify_fetch_failed_is_network() {
        assert_eq!(
            AppError::classify("fetch failed", None).kind(),
            ErrorKind::Network
        );
    }

    #[test]
    fn test_classify_json_is_parse() {
        assert_eq!(
            AppError::classify("Unexpected token < in JSON", None).kind(),
            ErrorKind::Parse
        );
    }

    #[test]
    fn test_classify_with_plugin_id_is_plugin_error() {
        let error = AppError::classify("something went wrong", Some("esjzone"));
        assert_eq!(error.kind(), ErrorKind::Plugin);
        assert_eq!(error.plugin_id(), Some("esjzone"));
    }

    #[test]
    fn test_classify_generic_is_other() {
        let error = AppError::classify("unknown issue", None);
        assert_eq!(error.kind(), ErrorKind::Other);
        assert_eq!(error.plugin_id(), None);
    }

    #[test]
    fn test_attribute_keeps_existing_kind() {
        let error = AppError::network("timeout").attribute("esjzone");
        assert_eq!(error, AppError::network("timeout"));
    }

    #[test]
    fn test_attribute_reclassifies_other() {
        let error = AppError::other("chapter list missing").attribute("esjzone");
        assert_eq!(error, AppError::plugin("esjzone", "chapter list missing"));

        let error = AppError::other("invalid HTML in body").attribute("esjzone");
        assert_eq!(error.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_display_is_bare_message() {
        let error = AppError::plugin("esjzone", "boom");
        assert_eq!(error.to_string(), "boom");
    }

    #[test]
    fn test_from_anyhow_classifies_message() {
        let error: AppError = anyhow::anyhow!("ECONNREFUSED 127.0.0.1").into();
        assert_eq!(error.kind(), ErrorKind::Network);
    }
}
