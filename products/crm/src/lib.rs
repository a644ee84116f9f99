//! Sales pipeline kanban.
//!
//! Funnels own ordered stages; deals sit in exactly one stage of their
//! funnel. [`FunnelStore`] and [`DealStore`] hold the observable state and
//! apply changes optimistically, [`Board`] ties them to drag-and-drop and the
//! loss-reason prompt.

pub mod board;
pub mod deal_store;
pub mod drag;
pub mod error;
pub mod format;
pub mod funnel_store;
pub mod loss;
pub mod model;
pub mod pending;
pub mod phase;
pub mod repository;
pub mod view;

pub use board::{Board, BoardEvent, MoveOutcome};
pub use deal_store::{DealStore, DealsState};
pub use error::{PipelineError, PipelineResult, RepositoryError};
pub use funnel_store::{FunnelState, FunnelStore};
pub use loss::{LossReason, LossReasonGate, PendingMove};
pub use model::{
    ContactRef, Deal, DealPatch, Funnel, NewDeal, Stage, StageChange, StageKind, StageMove,
    StageOrder, Temperature,
};
pub use pending::Confirmation;
pub use phase::{FunnelPhase, LegacyStatus};
pub use repository::{InMemoryRepository, PipelineRepository, SeaOrmRepository};
pub use view::{BoardScreen, BoardView, DealFilter};
