use crate::domain::attributes::Attribute;
use crate::domain::models::LinkState;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the TOWER connection core
#[derive(Debug, Clone, Error)]
pub enum TowerError {
    #[error("no device matched within {0:?}")]
    ScanTimeout(Duration),

    #[error("connection attempt timed out after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("link dropped unexpectedly")]
    UnexpectedDrop,

    #[error("attribute group not found")]
    AttributeGroupNotFound,

    #[error("attribute '{0}' not found")]
    AttributeNotFound(Attribute),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not connected")]
    Disconnected,

    #[error("gave up after {attempts} attempts: {cause}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        cause: Box<TowerError>,
    },

    #[error("unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("busy: connection attempt already in progress ({0})")]
    Busy(LinkState),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_exhausted_names_the_cause() {
        let err = TowerError::RetriesExhausted {
            attempts: 3,
            cause: Box::new(TowerError::AttributeGroupNotFound),
        };
        assert_eq!(
            err.to_string(),
            "gave up after 3 attempts: attribute group not found"
        );
    }
}
