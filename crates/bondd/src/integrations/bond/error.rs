//! Bond integration error types.

use crate::engine::EntityCommand;

/// Errors raised while talking to a Bond hub or driving its entities.
#[derive(Debug, thiserror::Error)]
pub enum BondError {
    /// The HTTP request could not be sent or its body could not be decoded.
    #[error("Bond request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The hub answered with a non-success status code.
    #[error("Bond hub returned status {status} for {path}")]
    Status { path: String, status: u16 },

    /// The hub answered with a body we could not interpret.
    #[error("Invalid response from Bond hub: {0}")]
    InvalidResponse(String),

    /// No entity with this id is managed by the integration.
    #[error("Unknown Bond entity: {0}")]
    UnknownEntity(String),

    /// The entity's platform cannot execute this command.
    #[error("Entity {entity_id} does not support {command:?}")]
    UnsupportedCommand {
        entity_id: String,
        command: EntityCommand,
    },
}
