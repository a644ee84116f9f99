//! Deal state for the active funnel with optimistic writes.
//!
//! Every mutation updates the local state first and persists afterwards on a
//! spawned task. When the write fails the deal is restored to the last copy
//! the server acknowledged, provided nothing else has replaced the optimistic
//! version in the meantime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::funnel_store::{FunnelState, FunnelStore};
use crate::loss::LossReason;
use crate::model::{Deal, DealPatch, NewDeal, Stage};
use crate::pending::Confirmation;
use crate::repository::PipelineRepository;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DealsState {
    /// Funnel the deals were fetched for.
    pub funnel_id: Option<Uuid>,
    pub deals: Vec<Deal>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl DealsState {
    pub fn deal(&self, deal_id: Uuid) -> Option<&Deal> {
        self.deals.iter().find(|d| d.id == deal_id)
    }

    fn deal_mut(&mut self, deal_id: Uuid) -> Option<&mut Deal> {
        self.deals.iter_mut().find(|d| d.id == deal_id)
    }

    pub fn in_stage(&self, stage_id: Uuid) -> impl Iterator<Item = &Deal> {
        self.deals.iter().filter(move |d| d.is_in(stage_id))
    }
}

/// Last server-acknowledged copy of each deal, refreshed by fetches and
/// successful writes only.
#[derive(Debug, Default)]
struct Acknowledged {
    deals: Mutex<HashMap<Uuid, Deal>>,
}

impl Acknowledged {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Deal>> {
        self.deals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self, deals: &[Deal]) {
        *self.lock() = deals.iter().map(|d| (d.id, d.clone())).collect();
    }

    fn get(&self, deal_id: Uuid) -> Option<Deal> {
        self.lock().get(&deal_id).cloned()
    }

    fn record(&self, deal: Deal) -> Option<Deal> {
        self.lock().insert(deal.id, deal)
    }
}

#[derive(Clone)]
pub struct DealStore {
    repo: Arc<dyn PipelineRepository>,
    funnels: watch::Receiver<FunnelState>,
    state: Arc<watch::Sender<DealsState>>,
    acknowledged: Arc<Acknowledged>,
}

impl DealStore {
    /// Stage lookups go through `funnels`, so moves are validated against the
    /// stages currently on screen.
    pub fn new(repo: Arc<dyn PipelineRepository>, funnels: &FunnelStore) -> Self {
        let (state, _) = watch::channel(DealsState::default());
        Self {
            repo,
            funnels: funnels.subscribe(),
            state: Arc::new(state),
            acknowledged: Arc::default(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DealsState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DealsState {
        self.state.borrow().clone()
    }

    pub fn deals(&self) -> Vec<Deal> {
        self.state.borrow().deals.clone()
    }

    pub fn deal(&self, deal_id: Uuid) -> Option<Deal> {
        self.state.borrow().deal(deal_id).cloned()
    }

    fn record_failure(&self, err: &PipelineError) {
        warn!(error = %err, "deal store request failed");
        let message = err.to_string();
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error = Some(message);
        });
    }

    #[instrument(skip(self))]
    pub async fn fetch_deals(&self, funnel_id: Uuid) -> PipelineResult<()> {
        self.state.send_modify(|s| s.is_loading = true);
        match self.repo.list_deals(funnel_id).await {
            Ok(mut deals) => {
                deals.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                debug!(count = deals.len(), "deals loaded");
                self.acknowledged.reset(&deals);
                self.state.send_modify(|s| {
                    s.funnel_id = Some(funnel_id);
                    s.deals = deals;
                    s.is_loading = false;
                    s.error = None;
                });
                Ok(())
            }
            Err(err) => {
                let err = PipelineError::from(err);
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    fn creation_target(&self, requested: Option<Uuid>) -> PipelineResult<(Uuid, Stage)> {
        let funnels = self.funnels.borrow();
        let funnel_id = funnels
            .active_funnel_id()
            .ok_or(PipelineError::NoActiveFunnel)?;
        let stage = match requested {
            Some(stage_id) => funnels
                .stage(stage_id)
                .ok_or(PipelineError::StageNotFound(stage_id))?,
            None => funnels.first_stage().ok_or(PipelineError::NoStages)?,
        };
        Ok((funnel_id, stage.clone()))
    }

    /// Creates a deal in the active funnel and prepends it locally once the
    /// server has assigned its id. Without an explicit stage the deal lands
    /// in the first column.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn add_deal(&self, mut input: NewDeal) -> PipelineResult<Deal> {
        let (funnel_id, stage) = match self.creation_target(input.stage_id) {
            Ok(target) => target,
            Err(err) => {
                self.record_failure(&err);
                return Err(err);
            }
        };
        if stage.is_gated() {
            let err = PipelineError::LossReasonRequired(stage.id);
            self.record_failure(&err);
            return Err(err);
        }
        input.funnel_id = Some(funnel_id);
        input.stage_id = Some(stage.id);

        self.state.send_modify(|s| s.is_loading = true);
        match self.repo.create_deal(input).await {
            Ok(deal) => {
                debug!(deal_id = %deal.id, "deal created");
                self.acknowledged.record(deal.clone());
                let created = deal.clone();
                self.state.send_modify(|s| {
                    s.deals.insert(0, created);
                    s.is_loading = false;
                    s.error = None;
                });
                Ok(deal)
            }
            Err(err) => {
                let err = PipelineError::from(err);
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Applies field edits immediately and persists them in the background.
    #[instrument(skip(self, patch))]
    pub fn update_deal(&self, deal_id: Uuid, patch: DealPatch) -> PipelineResult<Confirmation> {
        let previous = self
            .deal(deal_id)
            .ok_or(PipelineError::DealNotFound(deal_id))?;
        if patch.is_empty() {
            return Ok(Confirmation::settled());
        }
        let mut optimistic = previous.clone();
        optimistic.apply_patch(&patch, Utc::now());
        self.replace(deal_id, optimistic.clone());

        let repo = self.repo.clone();
        let state = self.state.clone();
        let acknowledged = self.acknowledged.clone();
        Ok(Confirmation::spawn(async move {
            match repo.update_deal(deal_id, patch).await {
                Ok(saved) => {
                    settle(&state, &acknowledged, &optimistic, saved);
                    Ok(())
                }
                Err(err) => {
                    warn!(deal_id = %deal_id, error = %err, "deal update not persisted, rolling back");
                    roll_back(&state, &acknowledged, &optimistic, err.to_string());
                    Err(err.into())
                }
            }
        }))
    }

    /// Moves a deal into `stage_id`. Loss stages are refused here; use
    /// [`DealStore::move_deal_with_reason`] once a reason is known.
    pub fn move_deal(&self, deal_id: Uuid, stage_id: Uuid) -> PipelineResult<Confirmation> {
        self.commit_move(deal_id, stage_id, None)
    }

    pub fn move_deal_with_reason(
        &self,
        deal_id: Uuid,
        stage_id: Uuid,
        reason: LossReason,
    ) -> PipelineResult<Confirmation> {
        self.commit_move(deal_id, stage_id, Some(reason))
    }

    #[instrument(skip(self))]
    fn commit_move(
        &self,
        deal_id: Uuid,
        stage_id: Uuid,
        reason: Option<LossReason>,
    ) -> PipelineResult<Confirmation> {
        let previous = self
            .deal(deal_id)
            .ok_or(PipelineError::DealNotFound(deal_id))?;
        let stage = self
            .funnels
            .borrow()
            .stage(stage_id)
            .cloned()
            .ok_or(PipelineError::StageNotFound(stage_id))?;
        let Some(mv) = previous.plan_move(&stage, reason)? else {
            debug!("deal already in stage");
            return Ok(Confirmation::settled());
        };

        let mut optimistic = previous.clone();
        optimistic.apply_move(&mv, Utc::now());
        self.replace(deal_id, optimistic.clone());
        debug!(from = ?previous.stage_id, "deal moved locally");

        let repo = self.repo.clone();
        let state = self.state.clone();
        let acknowledged = self.acknowledged.clone();
        Ok(Confirmation::spawn(async move {
            match repo.move_deal_stage(deal_id, mv).await {
                Ok(saved) => {
                    settle(&state, &acknowledged, &optimistic, saved);
                    Ok(())
                }
                Err(err) => {
                    warn!(deal_id = %deal_id, error = %err, "stage move not persisted, rolling back");
                    roll_back(&state, &acknowledged, &optimistic, err.to_string());
                    Err(err.into())
                }
            }
        }))
    }

    fn replace(&self, deal_id: Uuid, deal: Deal) {
        self.state.send_modify(|s| {
            if let Some(slot) = s.deal_mut(deal_id) {
                *slot = deal;
            }
        });
    }
}

/// Records the server copy and shows it unless a newer local change is on
/// screen.
fn settle(
    state: &watch::Sender<DealsState>,
    acknowledged: &Acknowledged,
    optimistic: &Deal,
    saved: Deal,
) {
    let prior = acknowledged.record(saved.clone());
    state.send_modify(|s| {
        if let Some(slot) = s.deal_mut(saved.id) {
            if slot == optimistic || prior.as_ref() == Some(&*slot) {
                *slot = saved;
            }
        }
    });
}

fn roll_back(
    state: &watch::Sender<DealsState>,
    acknowledged: &Acknowledged,
    optimistic: &Deal,
    message: String,
) {
    let known = acknowledged.get(optimistic.id);
    state.send_modify(|s| {
        if let (Some(slot), Some(known)) = (s.deal_mut(optimistic.id), known) {
            if slot == optimistic {
                *slot = known;
            }
        }
        s.error = Some(message);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{deal, funnel, loss_stage, stage, win_stage};
    use crate::model::Funnel;
    use crate::repository::InMemoryRepository;

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        funnels: FunnelStore,
        deals: DealStore,
        funnel: Funnel,
        stages: Vec<Stage>,
        deal_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryRepository::new());
        let f = funnel("Funil de Vendas");
        let stages = vec![
            stage(&f, "Novo", 0),
            stage(&f, "Qualificado", 1),
            win_stage(&f, "Vendido", 2),
            loss_stage(&f, "Perdido", 3),
        ];
        repo.insert_funnel(f.clone(), stages.clone());
        let d = deal(&stages[0], "Apartamento Centro", Some(35_000_000));
        repo.insert_deal(d.clone());

        let funnels = FunnelStore::new(repo.clone());
        funnels.fetch_funnels().await.unwrap();
        let deals = DealStore::new(repo.clone(), &funnels);
        deals.fetch_deals(f.id).await.unwrap();
        Fixture {
            repo,
            funnels,
            deals,
            funnel: f,
            stages,
            deal_id: d.id,
        }
    }

    #[tokio::test]
    async fn move_is_visible_before_persistence_completes() {
        let fx = fixture().await;
        let target = fx.stages[1].id;
        let confirmation = fx.deals.move_deal(fx.deal_id, target).unwrap();

        assert_eq!(fx.deals.deal(fx.deal_id).unwrap().stage_id, Some(target));
        assert_eq!(
            fx.repo.stored_deal(fx.deal_id).unwrap().stage_id,
            Some(fx.stages[0].id)
        );

        confirmation.wait().await.unwrap();
        assert_eq!(fx.repo.stored_deal(fx.deal_id).unwrap().stage_id, Some(target));
    }

    #[tokio::test]
    async fn failed_move_rolls_back_and_records_error() {
        let fx = fixture().await;
        fx.repo.set_fail_writes(true);
        let confirmation = fx.deals.move_deal(fx.deal_id, fx.stages[1].id).unwrap();
        assert!(confirmation.wait().await.is_err());

        let state = fx.deals.snapshot();
        assert_eq!(state.deal(fx.deal_id).unwrap().stage_id, Some(fx.stages[0].id));
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn rollback_does_not_clobber_a_newer_move() {
        let fx = fixture().await;
        fx.repo.fail_next_writes(1);
        let first = fx.deals.move_deal(fx.deal_id, fx.stages[1].id).unwrap();
        let second = fx.deals.move_deal(fx.deal_id, fx.stages[2].id).unwrap();

        assert!(first.wait().await.is_err());
        second.wait().await.unwrap();
        assert_eq!(
            fx.deals.deal(fx.deal_id).unwrap().stage_id,
            Some(fx.stages[2].id)
        );
        assert_eq!(
            fx.repo.stored_deal(fx.deal_id).unwrap().stage_id,
            Some(fx.stages[2].id)
        );
    }

    #[tokio::test]
    async fn consecutive_failed_moves_restore_the_acknowledged_stage() {
        let fx = fixture().await;
        fx.repo.set_fail_writes(true);
        let first = fx.deals.move_deal(fx.deal_id, fx.stages[1].id).unwrap();
        let second = fx.deals.move_deal(fx.deal_id, fx.stages[2].id).unwrap();

        assert!(first.wait().await.is_err());
        assert!(second.wait().await.is_err());
        let stored = fx.repo.stored_deal(fx.deal_id).unwrap();
        let local = fx.deals.deal(fx.deal_id).unwrap();
        assert_eq!(stored.stage_id, Some(fx.stages[0].id));
        assert_eq!(local.stage_id, stored.stage_id);
    }

    #[tokio::test]
    async fn failure_after_a_confirmed_move_restores_that_move() {
        let fx = fixture().await;
        fx.deals
            .move_deal(fx.deal_id, fx.stages[1].id)
            .unwrap()
            .wait()
            .await
            .unwrap();
        fx.repo.set_fail_writes(true);
        let failed = fx.deals.move_deal(fx.deal_id, fx.stages[2].id).unwrap();
        assert!(failed.wait().await.is_err());
        assert_eq!(
            fx.deals.deal(fx.deal_id).unwrap().stage_id,
            Some(fx.stages[1].id)
        );
    }

    #[tokio::test]
    async fn same_stage_move_is_a_noop() {
        let fx = fixture().await;
        let before = fx.deals.snapshot();
        let confirmation = fx.deals.move_deal(fx.deal_id, fx.stages[0].id).unwrap();
        assert!(confirmation.is_noop());
        assert_eq!(fx.deals.snapshot(), before);
        assert!(fx.repo.stage_history(fx.deal_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn loss_stage_requires_reason() {
        let fx = fixture().await;
        let lost = fx.stages[3].id;
        assert!(matches!(
            fx.deals.move_deal(fx.deal_id, lost),
            Err(PipelineError::LossReasonRequired(id)) if id == lost
        ));
        assert_eq!(
            fx.deals.deal(fx.deal_id).unwrap().stage_id,
            Some(fx.stages[0].id)
        );

        fx.deals
            .move_deal_with_reason(fx.deal_id, lost, LossReason::FinancingDenied)
            .unwrap()
            .wait()
            .await
            .unwrap();
        let stored = fx.repo.stored_deal(fx.deal_id).unwrap();
        assert_eq!(stored.stage_id, Some(lost));
        assert_eq!(stored.lost_reason, Some(LossReason::FinancingDenied));
    }

    #[tokio::test]
    async fn unknown_stage_and_deal_are_rejected() {
        let fx = fixture().await;
        let before = fx.deals.snapshot();
        let ghost = Uuid::new_v4();
        assert!(matches!(
            fx.deals.move_deal(fx.deal_id, ghost),
            Err(PipelineError::StageNotFound(id)) if id == ghost
        ));
        assert!(matches!(
            fx.deals.move_deal(ghost, fx.stages[1].id),
            Err(PipelineError::DealNotFound(_))
        ));
        assert_eq!(fx.deals.snapshot(), before);
    }

    #[tokio::test]
    async fn add_deal_lands_in_first_stage() {
        let fx = fixture().await;
        let created = fx
            .deals
            .add_deal(NewDeal::named("Casa Alphaville").with_value(120_000_000))
            .await
            .unwrap();
        assert_eq!(created.stage_id, Some(fx.stages[0].id));
        assert_eq!(created.funnel_id, Some(fx.funnel.id));
        assert_eq!(fx.deals.deals()[0].id, created.id);
    }

    #[tokio::test]
    async fn add_deal_refuses_loss_stage() {
        let fx = fixture().await;
        let lost = fx.stages[3].id;
        assert!(matches!(
            fx.deals.add_deal(NewDeal::named("Terreno").in_stage(lost)).await,
            Err(PipelineError::LossReasonRequired(_))
        ));
    }

    #[tokio::test]
    async fn update_deal_rolls_back_on_failure() {
        let fx = fixture().await;
        fx.repo.set_fail_writes(true);
        let patch = DealPatch {
            value_cents: Some(1),
            ..DealPatch::default()
        };
        let confirmation = fx.deals.update_deal(fx.deal_id, patch).unwrap();
        assert_eq!(fx.deals.deal(fx.deal_id).unwrap().value_cents, Some(1));
        assert!(confirmation.wait().await.is_err());
        assert_eq!(
            fx.deals.deal(fx.deal_id).unwrap().value_cents,
            Some(35_000_000)
        );
    }

    #[tokio::test]
    async fn stage_lookup_tracks_funnel_switches() {
        let fx = fixture().await;
        let other = funnel("Locação");
        let rent_stage = stage(&other, "Contato", 0);
        fx.repo.insert_funnel(other.clone(), vec![rent_stage.clone()]);
        fx.funnels.fetch_funnels().await.unwrap();
        fx.funnels.set_active_funnel(other.id).await.unwrap();

        // The deal belongs to the previous funnel's stages.
        assert!(matches!(
            fx.deals.move_deal(fx.deal_id, fx.stages[1].id),
            Err(PipelineError::StageNotFound(_))
        ));
    }
}
