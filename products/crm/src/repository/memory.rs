use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{PipelineRepository, RepositoryResult};
use crate::error::RepositoryError;
use crate::model::{Deal, DealPatch, Funnel, NewDeal, Stage, StageChange, StageMove, StageOrder};

#[derive(Debug, Default)]
struct Tables {
    funnels: Vec<Funnel>,
    stages: Vec<Stage>,
    deals: Vec<Deal>,
    history: Vec<StageChange>,
}

/// Process-local repository used by tests and the offline board.
///
/// Reads and writes can be told to fail so callers can exercise their
/// rollback paths.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failing_writes: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_funnel(&self, funnel: Funnel, stages: Vec<Stage>) {
        let mut tables = self.tables();
        tables.funnels.push(funnel);
        tables.stages.extend(stages);
    }

    pub fn insert_deal(&self, deal: Deal) {
        self.tables().deals.push(deal);
    }

    /// Server-side copy of a deal, bypassing failure injection.
    pub fn stored_deal(&self, deal_id: Uuid) -> Option<Deal> {
        self.tables().deals.iter().find(|d| d.id == deal_id).cloned()
    }

    pub fn stored_stages(&self, funnel_id: Uuid) -> Vec<Stage> {
        let mut stages: Vec<Stage> = self
            .tables()
            .stages
            .iter()
            .filter(|s| s.funnel_id == funnel_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.order_index);
        stages
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fails only the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_read(&self) -> RepositoryResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("reads disabled".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> RepositoryResult<()> {
        let one_off = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if one_off || self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineRepository for InMemoryRepository {
    async fn list_funnels(&self, active_only: bool) -> RepositoryResult<Vec<Funnel>> {
        self.check_read()?;
        let mut funnels: Vec<Funnel> = self
            .tables()
            .funnels
            .iter()
            .filter(|f| !active_only || f.is_active)
            .cloned()
            .collect();
        funnels.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
        Ok(funnels)
    }

    async fn list_stages(&self, funnel_id: Uuid) -> RepositoryResult<Vec<Stage>> {
        self.check_read()?;
        Ok(self.stored_stages(funnel_id))
    }

    async fn find_stage(&self, stage_id: Uuid) -> RepositoryResult<Option<Stage>> {
        self.check_read()?;
        Ok(self.tables().stages.iter().find(|s| s.id == stage_id).cloned())
    }

    async fn list_deals(&self, funnel_id: Uuid) -> RepositoryResult<Vec<Deal>> {
        self.check_read()?;
        let mut deals: Vec<Deal> = self
            .tables()
            .deals
            .iter()
            .filter(|d| d.funnel_id == Some(funnel_id))
            .cloned()
            .collect();
        deals.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(deals)
    }

    async fn find_deal(&self, deal_id: Uuid) -> RepositoryResult<Option<Deal>> {
        self.check_read()?;
        Ok(self.stored_deal(deal_id))
    }

    async fn create_deal(&self, input: NewDeal) -> RepositoryResult<Deal> {
        self.check_write()?;
        let now = Utc::now();
        let deal = Deal {
            id: Uuid::new_v4(),
            funnel_id: input.funnel_id,
            stage_id: input.stage_id,
            contact_id: input.contact_id,
            name: input.name,
            email: input.email,
            phone: input.phone,
            value_cents: input.value_cents,
            source: input.source,
            temperature: input.temperature,
            owner_id: input.owner_id,
            expected_close_date: input.expected_close_date,
            lost_reason: None,
            created_at: now,
            updated_at: now,
            contact: None,
        };
        let mut tables = self.tables();
        if let Some(stage_id) = deal.stage_id {
            tables.history.push(StageChange {
                id: Uuid::new_v4(),
                deal_id: deal.id,
                from_stage_id: None,
                to_stage_id: stage_id,
                lost_reason: None,
                changed_at: now,
            });
        }
        tables.deals.push(deal.clone());
        Ok(deal)
    }

    async fn update_deal(&self, deal_id: Uuid, patch: DealPatch) -> RepositoryResult<Deal> {
        self.check_write()?;
        let mut tables = self.tables();
        let deal = tables
            .deals
            .iter_mut()
            .find(|d| d.id == deal_id)
            .ok_or(RepositoryError::NotFound)?;
        deal.apply_patch(&patch, Utc::now());
        Ok(deal.clone())
    }

    async fn move_deal_stage(&self, deal_id: Uuid, mv: StageMove) -> RepositoryResult<Deal> {
        self.check_write()?;
        let now = Utc::now();
        let mut tables = self.tables();
        let deal = tables
            .deals
            .iter_mut()
            .find(|d| d.id == deal_id)
            .ok_or(RepositoryError::NotFound)?;
        if deal.stage_id == Some(mv.stage_id) {
            return Ok(deal.clone());
        }
        let from_stage_id = deal.stage_id;
        deal.apply_move(&mv, now);
        let moved = deal.clone();
        tables.history.push(StageChange {
            id: Uuid::new_v4(),
            deal_id,
            from_stage_id,
            to_stage_id: mv.stage_id,
            lost_reason: mv.lost_reason,
            changed_at: now,
        });
        Ok(moved)
    }

    async fn update_stage_order(&self, order: Vec<StageOrder>) -> RepositoryResult<()> {
        self.check_write()?;
        let mut tables = self.tables();
        if order
            .iter()
            .any(|entry| !tables.stages.iter().any(|s| s.id == entry.id))
        {
            return Err(RepositoryError::NotFound);
        }
        for entry in order {
            if let Some(stage) = tables.stages.iter_mut().find(|s| s.id == entry.id) {
                stage.order_index = entry.order_index;
            }
        }
        Ok(())
    }

    async fn stage_history(&self, deal_id: Uuid) -> RepositoryResult<Vec<StageChange>> {
        self.check_read()?;
        let mut history: Vec<StageChange> = self
            .tables()
            .history
            .iter()
            .filter(|h| h.deal_id == deal_id)
            .cloned()
            .collect();
        history.reverse();
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::LossReason;
    use crate::model::fixtures::{deal, funnel, loss_stage, stage};

    #[tokio::test]
    async fn move_appends_history_and_is_idempotent() {
        let repo = InMemoryRepository::new();
        let f = funnel("Vendas");
        let open = stage(&f, "Novo", 0);
        let lost = loss_stage(&f, "Perdido", 1);
        let d = deal(&open, "Casa", Some(1_000));
        repo.insert_funnel(f.clone(), vec![open.clone(), lost.clone()]);
        repo.insert_deal(d.clone());

        let mv = StageMove {
            funnel_id: f.id,
            stage_id: lost.id,
            lost_reason: Some(LossReason::GaveUp),
        };
        let moved = repo.move_deal_stage(d.id, mv).await.unwrap();
        assert_eq!(moved.stage_id, Some(lost.id));
        assert_eq!(moved.lost_reason, Some(LossReason::GaveUp));
        repo.move_deal_stage(d.id, mv).await.unwrap();

        let history = repo.stage_history(d.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_stage_id, Some(open.id));
        assert_eq!(history[0].lost_reason, Some(LossReason::GaveUp));
    }

    #[tokio::test]
    async fn injected_write_failure_leaves_data_untouched() {
        let repo = InMemoryRepository::new();
        let f = funnel("Vendas");
        let a = stage(&f, "Novo", 0);
        let b = stage(&f, "Qualificado", 1);
        let d = deal(&a, "Casa", None);
        repo.insert_funnel(f.clone(), vec![a.clone(), b.clone()]);
        repo.insert_deal(d.clone());

        repo.set_fail_writes(true);
        let err = repo
            .move_deal_stage(
                d.id,
                StageMove {
                    funnel_id: f.id,
                    stage_id: b.id,
                    lost_reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)));
        assert_eq!(repo.stored_deal(d.id).unwrap().stage_id, Some(a.id));
    }
}
