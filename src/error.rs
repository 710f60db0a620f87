// Error types surfaced by the WuBook client

use crate::transport::TransportError;
use thiserror::Error;

// Top level error returned by the session manager, facets and the client factory
#[derive(Error, Debug)]
pub enum WuBookError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Authentication failed: {message}")]
    AuthenticationError {
        // None when the login never reached the remote service
        code: Option<i32>,
        message: String,
    },

    #[error("Remote call {method} failed: {code} - {message}")]
    RemoteCallError {
        method: String,
        code: i32,
        message: String,
    },

    #[error("Transport error on {method}: {source}")]
    TransportError {
        method: String,
        #[source]
        source: TransportError,
    },

    #[error("Unknown operation {operation} on {facet} facet")]
    UnknownOperation { facet: String, operation: String },

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },
}

impl WuBookError {
    // Build the error for a failed login from whatever the transport reported
    pub(crate) fn authentication(error: TransportError) -> Self {
        match error {
            TransportError::Fault { code, message } => WuBookError::AuthenticationError {
                code: Some(code),
                message,
            },
            other => WuBookError::AuthenticationError {
                code: None,
                message: other.to_string(),
            },
        }
    }

    // Build the error for a failed business call, keeping the remote fault details
    pub(crate) fn remote(method: &str, error: TransportError) -> Self {
        match error {
            TransportError::Fault { code, message } => WuBookError::RemoteCallError {
                method: method.to_string(),
                code,
                message,
            },
            source => WuBookError::TransportError {
                method: method.to_string(),
                source,
            },
        }
    }

    // Remote fault code carried by this error, if any.
    pub fn fault_code(&self) -> Option<i32> {
        match self {
            WuBookError::AuthenticationError { code, .. } => *code,
            WuBookError::RemoteCallError { code, .. } => Some(*code),
            _ => None,
        }
    }
}
