//! Funnel and stage state shared by the board.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{Funnel, Stage, StageOrder};
use crate::pending::Confirmation;
use crate::repository::PipelineRepository;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FunnelState {
    pub funnels: Vec<Funnel>,
    pub active_funnel: Option<Funnel>,
    /// Stages of the active funnel, ascending `order_index`.
    pub stages: Vec<Stage>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl FunnelState {
    pub fn stage(&self, stage_id: Uuid) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn first_stage(&self) -> Option<&Stage> {
        self.stages.first()
    }

    pub fn active_funnel_id(&self) -> Option<Uuid> {
        self.active_funnel.as_ref().map(|f| f.id)
    }
}

/// Stage order of the active funnel as the server last acknowledged it.
#[derive(Debug, Default)]
struct AcknowledgedOrder {
    funnel_id: Option<Uuid>,
    stages: Vec<Stage>,
}

#[derive(Clone)]
pub struct FunnelStore {
    repo: Arc<dyn PipelineRepository>,
    state: Arc<watch::Sender<FunnelState>>,
    acknowledged: Arc<Mutex<AcknowledgedOrder>>,
}

impl FunnelStore {
    pub fn new(repo: Arc<dyn PipelineRepository>) -> Self {
        let (state, _) = watch::channel(FunnelState::default());
        Self {
            repo,
            state: Arc::new(state),
            acknowledged: Arc::default(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FunnelState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> FunnelState {
        self.state.borrow().clone()
    }

    pub fn active_funnel(&self) -> Option<Funnel> {
        self.state.borrow().active_funnel.clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.state.borrow().stages.clone()
    }

    pub fn stage(&self, stage_id: Uuid) -> Option<Stage> {
        self.state.borrow().stage(stage_id).cloned()
    }

    pub fn first_stage(&self) -> Option<Stage> {
        self.state.borrow().first_stage().cloned()
    }

    fn acknowledged(&self) -> MutexGuard<'_, AcknowledgedOrder> {
        lock_order(&self.acknowledged)
    }

    fn record_failure(&self, err: &PipelineError) {
        warn!(error = %err, "funnel store request failed");
        let message = err.to_string();
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error = Some(message);
        });
    }

    /// Loads active funnels and, when none is selected yet, activates the
    /// first one and loads its stages.
    #[instrument(skip(self))]
    pub async fn fetch_funnels(&self) -> PipelineResult<()> {
        self.state.send_modify(|s| s.is_loading = true);
        let funnels = match self.repo.list_funnels(true).await {
            Ok(funnels) => funnels,
            Err(err) => {
                let err = PipelineError::from(err);
                self.record_failure(&err);
                return Err(err);
            }
        };
        debug!(count = funnels.len(), "funnels loaded");

        let first = funnels.first().map(|f| f.id);
        let needs_active = self.state.borrow().active_funnel.is_none();
        self.state.send_modify(|s| {
            s.funnels = funnels;
            s.is_loading = false;
            s.error = None;
        });

        match (needs_active, first) {
            (true, Some(funnel_id)) => self.set_active_funnel(funnel_id).await,
            _ => Ok(()),
        }
    }

    /// Makes `funnel_id` active and loads its stages in display order.
    #[instrument(skip(self))]
    pub async fn set_active_funnel(&self, funnel_id: Uuid) -> PipelineResult<()> {
        let funnel = self
            .state
            .borrow()
            .funnels
            .iter()
            .find(|f| f.id == funnel_id)
            .cloned();
        let Some(funnel) = funnel else {
            let err = PipelineError::FunnelNotFound(funnel_id);
            self.record_failure(&err);
            return Err(err);
        };

        self.state.send_modify(|s| s.is_loading = true);
        match self.repo.list_stages(funnel_id).await {
            Ok(mut stages) => {
                stages.sort_by_key(|s| s.order_index);
                debug!(count = stages.len(), "stages loaded");
                *self.acknowledged() = AcknowledgedOrder {
                    funnel_id: Some(funnel_id),
                    stages: stages.clone(),
                };
                self.state.send_modify(|s| {
                    s.active_funnel = Some(funnel);
                    s.stages = stages;
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

    /// Applies a new column order locally, then persists it in the background.
    ///
    /// `stages` must hold every stage of the active funnel exactly once; their
    /// `order_index` becomes their position. A failed write restores the
    /// last acknowledged order unless another change has replaced it meanwhile.
    #[instrument(skip(self, stages), fields(count = stages.len()))]
    pub fn update_stage_order(&self, stages: Vec<Stage>) -> PipelineResult<Confirmation> {
        let (funnel_id, previous) = {
            let state = self.state.borrow();
            let funnel_id = state
                .active_funnel_id()
                .ok_or(PipelineError::NoActiveFunnel)?;
            (funnel_id, state.stages.clone())
        };

        let mut expected: Vec<Uuid> = previous.iter().map(|s| s.id).collect();
        let mut given: Vec<Uuid> = stages.iter().map(|s| s.id).collect();
        expected.sort();
        given.sort();
        if expected != given {
            return Err(PipelineError::InvalidStageOrder);
        }

        let reordered: Vec<Stage> = stages
            .into_iter()
            .enumerate()
            .map(|(position, mut stage)| {
                stage.order_index = position as i32;
                stage
            })
            .collect();
        if reordered == previous {
            return Ok(Confirmation::settled());
        }
        let order: Vec<StageOrder> = reordered
            .iter()
            .map(|s| StageOrder {
                id: s.id,
                order_index: s.order_index,
            })
            .collect();

        let optimistic = reordered.clone();
        self.state.send_modify(|s| s.stages = reordered);

        let repo = self.repo.clone();
        let state = self.state.clone();
        let acknowledged = self.acknowledged.clone();
        Ok(Confirmation::spawn(async move {
            match repo.update_stage_order(order).await {
                Ok(()) => {
                    let mut known = lock_order(&acknowledged);
                    if known.funnel_id != Some(funnel_id) {
                        return Ok(());
                    }
                    let prior = std::mem::replace(&mut known.stages, optimistic.clone());
                    drop(known);
                    state.send_modify(|s| {
                        if s.active_funnel_id() == Some(funnel_id) && s.stages == prior {
                            s.stages = optimistic;
                        }
                    });
                    Ok(())
                }
                Err(err) => {
                    warn!(error = %err, "stage order not persisted, restoring acknowledged order");
                    let message = err.to_string();
                    let known = lock_order(&acknowledged);
                    let restore = (known.funnel_id == Some(funnel_id)).then(|| known.stages.clone());
                    drop(known);
                    state.send_modify(|s| {
                        if let Some(restore) = restore {
                            if s.stages == optimistic {
                                s.stages = restore;
                            }
                        }
                        s.error = Some(message);
                    });
                    Err(err.into())
                }
            }
        }))
    }
}

fn lock_order(order: &Mutex<AcknowledgedOrder>) -> MutexGuard<'_, AcknowledgedOrder> {
    order.lock().unwrap_or_else(PoisonError::into_inner)
}
