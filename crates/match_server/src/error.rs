//! Error types for the match server transport.
//!
//! Lifecycle rejections are not errors at this level; they are answered to
//! the client by the coordinator. These variants cover the transport itself.

/// Enumeration of possible server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding, accepting or handshaking failed, or a socket broke
    #[error("Network error: {0}")]
    Network(String),

    /// Something inside the server went wrong
    #[error("Internal error: {0}")]
    Internal(String),

    /// A client frame could not be understood
    #[error("Protocol error: {0}")]
    Protocol(String),
}
