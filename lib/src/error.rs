/*
   mqe clients (OSS)

   Copyright 2024 Carnegie Mellon University.

   NO WARRANTY. THIS CARNEGIE MELLON UNIVERSITY AND SOFTWARE ENGINEERING INSTITUTE MATERIAL IS
   FURNISHED ON AN "AS-IS" BASIS. CARNEGIE MELLON UNIVERSITY MAKES NO WARRANTIES OF ANY KIND,
   EITHER EXPRESSED OR IMPLIED, AS TO ANY MATTER INCLUDING, BUT NOT LIMITED TO, WARRANTY OF FITNESS
   FOR PURPOSE OR MERCHANTABILITY, EXCLUSIVITY, OR RESULTS OBTAINED FROM USE OF THE MATERIAL.
   CARNEGIE MELLON UNIVERSITY DOES NOT MAKE ANY WARRANTY OF ANY KIND WITH RESPECT TO FREEDOM FROM
   PATENT, TRADEMARK, OR COPYRIGHT INFRINGEMENT.

   Licensed under a MIT-style license, please see license.txt or contact permission@sei.cmu.edu for
   full terms.

   [DISTRIBUTION STATEMENT A] This material has been approved for public release and unlimited
   distribution.  Please see Copyright notice for non-US Government use and distribution.

   This Software includes and/or makes use of Third-Party Software each subject to its own license.

   DM24-0470
*/

//! Error taxonomy shared by every client role.

use std::fmt;
use thiserror::Error;

/// Failure reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The peer released the message without accepting it.
    DeliveryReleased,
    /// A consumer was created with a selector the provider cannot parse.
    InvalidSelector,
    /// The remote side closed the connection.
    ConnectionClosedByPeer,
    Other,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        TransportError {
            kind,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn is_closed_by_peer(&self) -> bool {
        self.kind == TransportErrorKind::ConnectionClosedByPeer
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportErrorKind::DeliveryReleased => write!(f, "delivery released: {}", self.message),
            TransportErrorKind::InvalidSelector => write!(f, "invalid selector: {}", self.message),
            TransportErrorKind::ConnectionClosedByPeer => {
                write!(f, "connection closed by peer: {}", self.message)
            }
            TransportErrorKind::Other => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

/// Main error type for client runs.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad command line input, broker url or connection option.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value could not be coerced into the requested type.
    #[error("Content type error: {0}")]
    ContentType(String),

    #[error("Messaging error: {0}")]
    Transport(TransportError),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Message was released: {0}")]
    DeliveryReleased(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Number of exceptions collected while the connector opened its objects.
    #[error("Connector finished with {0} exceptions")]
    ConnectorExceptions(i32),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err.kind {
            TransportErrorKind::InvalidSelector => Error::InvalidSelector(err.message),
            TransportErrorKind::DeliveryReleased => Error::DeliveryReleased(err.message),
            _ => Error::Transport(err),
        }
    }
}

/// Largest status a process can report.
pub const MAX_EXIT_CODE: i32 = 255;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Configuration(_) | Error::ContentType(_) | Error::InvalidSelector(_) => 2,
            Error::Transport(_) | Error::DeliveryReleased(_) | Error::Io(_) => 1,
            Error::ConnectorExceptions(n) => (*n).clamp(1, MAX_EXIT_CODE),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_taxonomy() {
        assert_eq!(Error::config("bad url").exit_code(), 2);
        assert_eq!(Error::ContentType("x".into()).exit_code(), 2);
        assert_eq!(Error::InvalidSelector("a =".into()).exit_code(), 2);
        assert_eq!(Error::Transport(TransportError::other("down")).exit_code(), 1);
        assert_eq!(Error::ConnectorExceptions(3).exit_code(), 3);
        assert_eq!(Error::ConnectorExceptions(256).exit_code(), 255);
    }

    #[test]
    fn transport_errors_map_onto_specific_variants() {
        let err: Error =
            TransportError::new(TransportErrorKind::InvalidSelector, "color ==").into();
        assert!(matches!(err, Error::InvalidSelector(ref s) if s == "color =="));

        let err: Error =
            TransportError::new(TransportErrorKind::DeliveryReleased, "q").into();
        assert_eq!(err.exit_code(), 1);
        assert!(matches!(err, Error::DeliveryReleased(_)));
    }
}
