//! Remote persistence behind the pipeline stores.

mod memory;
mod sea;

pub use memory::InMemoryRepository;
pub use sea::SeaOrmRepository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::model::{Deal, DealPatch, Funnel, NewDeal, Stage, StageChange, StageMove, StageOrder};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Funnels ordered default-first, then by name.
    async fn list_funnels(&self, active_only: bool) -> RepositoryResult<Vec<Funnel>>;

    /// Stages of one funnel in ascending `order_index`.
    async fn list_stages(&self, funnel_id: Uuid) -> RepositoryResult<Vec<Stage>>;

    async fn find_stage(&self, stage_id: Uuid) -> RepositoryResult<Option<Stage>>;

    /// Deals of one funnel, most recently updated first, with their contact.
    async fn list_deals(&self, funnel_id: Uuid) -> RepositoryResult<Vec<Deal>>;

    async fn find_deal(&self, deal_id: Uuid) -> RepositoryResult<Option<Deal>>;

    async fn create_deal(&self, input: NewDeal) -> RepositoryResult<Deal>;

    async fn update_deal(&self, deal_id: Uuid, patch: DealPatch) -> RepositoryResult<Deal>;

    /// Writes the new stage and appends a history row in one unit.
    async fn move_deal_stage(&self, deal_id: Uuid, mv: StageMove) -> RepositoryResult<Deal>;

    async fn update_stage_order(&self, order: Vec<StageOrder>) -> RepositoryResult<()>;

    /// Transitions of one deal, newest first.
    async fn stage_history(&self, deal_id: Uuid) -> RepositoryResult<Vec<StageChange>>;
}
