use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Failure scoring a single client. Both variants are caught at the batch
/// boundary: the client is logged and omitted from the pass.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("client {0} no longer exists in the store")]
    ClientNotFound(Uuid),

    #[error("failed to fetch {signal} records for client {client_id}")]
    SignalFetch {
        signal: &'static str,
        client_id: Uuid,
        #[source]
        source: StoreError,
    },
}

/// Failure of a whole batch pass. Nothing can be scored without the client
/// list, so this propagates to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to list clients for the scoring pass")]
    ClientList(#[source] StoreError),
}
