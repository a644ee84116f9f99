use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a [`crate::repository::PipelineRepository`] backend.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no active funnel")]
    NoActiveFunnel,
    #[error("funnel {0} is not loaded")]
    FunnelNotFound(Uuid),
    #[error("the active funnel has no stages")]
    NoStages,
    #[error("deal {0} not found")]
    DealNotFound(Uuid),
    #[error("stage {0} is not part of the active funnel")]
    StageNotFound(Uuid),
    #[error("moving into stage {0} requires a loss reason")]
    LossReasonRequired(Uuid),
    #[error("stage {0} is not a loss stage")]
    UnexpectedLossReason(Uuid),
    #[error("stage order must list every stage of the active funnel exactly once")]
    InvalidStageOrder,
    #[error("deal {0} is already waiting for a loss reason")]
    GateBusy(Uuid),
    #[error("no move is waiting for a loss reason")]
    NothingPending,
    #[error("no stage of the active funnel maps to status {0}")]
    StatusUnmapped(&'static str),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("background write aborted: {0}")]
    Aborted(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
