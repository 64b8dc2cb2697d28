use thiserror::Error;

use cortege_protocol::ServerError;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Covers both a wrong password and an expired timestamp.
    #[error("invalid credential")]
    InvalidCredential,

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unknown message type {0}")]
    UnknownMessage(String),
}

impl RpcError {
    pub fn code(&self) -> &'static str {
        match self {
            RpcError::InvalidInput(_) => "invalidInput",
            RpcError::InvalidCredential => "invalidCredential",
            RpcError::RouteNotFound(_) => "routeNotFound",
            RpcError::Internal(_) => "internalError",
            RpcError::UnknownMessage(_) => "unknownMessage",
        }
    }

    pub fn to_wire(&self) -> ServerError {
        ServerError {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}
