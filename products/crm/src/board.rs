//! The kanban board: stores, drag controller and loss gate wired together.

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::deal_store::DealStore;
use crate::drag::{DragController, DragSignal, DropLayout, Gesture, Point, resolve_target_stage};
use crate::error::{PipelineError, PipelineResult};
use crate::funnel_store::FunnelStore;
use crate::loss::{GateDecision, LossReason, LossReasonGate, PendingMove};
use crate::pending::Confirmation;
use crate::phase::{LegacyStatus, stage_for_status};
use crate::view::{BoardScreen, DealFilter, LayoutMetrics, RenderInput, render};

#[derive(Debug)]
pub enum MoveOutcome {
    /// The deal already sits in the requested stage.
    Unchanged,
    Moved(Confirmation),
    /// Held by the loss gate until a reason is confirmed or the move is
    /// cancelled.
    AwaitingReason(PendingMove),
}

#[derive(Debug)]
pub enum BoardEvent {
    Idle,
    DragStarted(Uuid),
    /// Stage currently under the dragged card, if any.
    DragOver(Option<Uuid>),
    /// Dropped over nothing; the deal stays put.
    DropIgnored,
    Cancelled,
    Move(MoveOutcome),
    Rejected(PipelineError),
}

pub struct Board {
    funnels: FunnelStore,
    deals: DealStore,
    drag: DragController,
    gate: LossReasonGate,
    filter: DealFilter,
    metrics: LayoutMetrics,
    layout: DropLayout,
    /// Set while `layout` holds caller-measured geometry.
    measured: bool,
    highlighted: Option<Uuid>,
}

impl Board {
    pub fn new(funnels: FunnelStore, deals: DealStore) -> Self {
        Self {
            funnels,
            deals,
            drag: DragController::new(),
            gate: LossReasonGate::new(),
            filter: DealFilter::default(),
            metrics: LayoutMetrics::default(),
            layout: DropLayout::new(),
            measured: false,
            highlighted: None,
        }
    }

    pub fn funnels(&self) -> &FunnelStore {
        &self.funnels
    }

    pub fn deals(&self) -> &DealStore {
        &self.deals
    }

    pub fn gate(&self) -> &LossReasonGate {
        &self.gate
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub fn layout(&self) -> &DropLayout {
        &self.layout
    }

    pub fn filter(&self) -> &DealFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: DealFilter) {
        self.filter = filter;
        self.refresh_layout();
    }

    /// Switches back to computed geometry built from `metrics`.
    pub fn set_metrics(&mut self, metrics: LayoutMetrics) {
        self.metrics = metrics;
        self.measured = false;
        self.refresh_layout();
    }

    /// Replaces the computed layout with measured geometry. It is kept until
    /// the next `set_layout` or `set_metrics` call, so callers re-measure
    /// after cards move.
    pub fn set_layout(&mut self, layout: DropLayout) {
        self.layout = layout;
        self.measured = true;
    }

    /// Loads funnels, activates the first one and fetches its deals.
    #[instrument(skip(self))]
    pub async fn load(&mut self) -> PipelineResult<()> {
        self.funnels.fetch_funnels().await?;
        if let Some(funnel) = self.funnels.active_funnel() {
            self.deals.fetch_deals(funnel.id).await?;
            info!(funnel = %funnel.name, "board loaded");
        }
        self.refresh_layout();
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn switch_funnel(&mut self, funnel_id: Uuid) -> PipelineResult<()> {
        self.gate.cancel();
        self.drag.handle(Gesture::Cancel, &[], &self.layout);
        self.funnels.set_active_funnel(funnel_id).await?;
        self.deals.fetch_deals(funnel_id).await?;
        self.refresh_layout();
        Ok(())
    }

    pub fn render(&self) -> BoardScreen {
        let funnels = self.funnels.snapshot();
        let deals = self.deals.snapshot();
        render(RenderInput {
            funnels: &funnels,
            deals: &deals,
            filter: &self.filter,
            drag: self.drag.active(),
            highlighted: self.highlighted,
            pending_loss: self.gate.pending(),
        })
    }

    fn refresh_layout(&mut self) {
        if self.measured {
            return;
        }
        if let BoardScreen::Ready(view) = self.render() {
            self.layout = view.layout(&self.metrics);
        }
    }

    pub fn on_drag_start(&mut self, deal_id: Uuid, at: Point) -> BoardEvent {
        self.handle(Gesture::PointerDown { deal_id, at })
    }

    pub fn on_drag_over(&mut self, at: Point) -> BoardEvent {
        self.handle(Gesture::PointerMove { at })
    }

    pub fn on_drag_end(&mut self, at: Point) -> BoardEvent {
        self.handle(Gesture::PointerUp { at })
    }

    /// Feeds one pointer or keyboard gesture through the drag controller.
    pub fn handle(&mut self, gesture: Gesture) -> BoardEvent {
        let deals = self.deals.deals();
        let stages = self.funnels.stages();
        match self.drag.handle(gesture, &deals, &self.layout) {
            DragSignal::None => BoardEvent::Idle,
            DragSignal::Started(deal_id) => {
                debug!(deal_id = %deal_id, "drag started");
                self.highlighted = None;
                BoardEvent::DragStarted(deal_id)
            }
            DragSignal::Over(target) => {
                self.highlighted = target.and_then(|t| resolve_target_stage(t, &deals, &stages));
                BoardEvent::DragOver(self.highlighted)
            }
            DragSignal::Cancelled => {
                self.highlighted = None;
                BoardEvent::Cancelled
            }
            DragSignal::Dropped { deal, target } => {
                self.highlighted = None;
                let Some(stage_id) = target.and_then(|t| resolve_target_stage(t, &deals, &stages))
                else {
                    debug!(deal_id = %deal.id, "dropped outside any column");
                    return BoardEvent::DropIgnored;
                };
                match self.request_move(deal.id, stage_id) {
                    Ok(outcome) => BoardEvent::Move(outcome),
                    Err(err) => BoardEvent::Rejected(err),
                }
            }
        }
    }

    /// Routes a move through the loss gate. Moves into open stages commit
    /// immediately; moves into loss stages wait for [`Board::confirm_loss`].
    #[instrument(skip(self))]
    pub fn request_move(&mut self, deal_id: Uuid, stage_id: Uuid) -> PipelineResult<MoveOutcome> {
        let deal = self
            .deals
            .deal(deal_id)
            .ok_or(PipelineError::DealNotFound(deal_id))?;
        if deal.is_in(stage_id) {
            return Ok(MoveOutcome::Unchanged);
        }
        let stage = self
            .funnels
            .stage(stage_id)
            .ok_or(PipelineError::StageNotFound(stage_id))?;

        match self.gate.inspect(PendingMove { deal_id, to_stage: stage_id }, &stage)? {
            GateDecision::Forward(mv) => {
                let confirmation = self.deals.move_deal(mv.deal_id, mv.to_stage)?;
                self.refresh_layout();
                Ok(MoveOutcome::Moved(confirmation))
            }
            GateDecision::Held(mv) => {
                info!(stage = %stage.name, "waiting for loss reason");
                Ok(MoveOutcome::AwaitingReason(mv))
            }
        }
    }

    /// Commits the held move with `reason`.
    #[instrument(skip(self))]
    pub fn confirm_loss(&mut self, reason: LossReason) -> PipelineResult<Confirmation> {
        let (mv, reason) = self.gate.confirm(reason)?;
        let confirmation = self
            .deals
            .move_deal_with_reason(mv.deal_id, mv.to_stage, reason)?;
        self.refresh_layout();
        Ok(confirmation)
    }

    /// Drops the held move. The deal keeps its stage and nothing is written.
    pub fn cancel_loss(&mut self) -> Option<PendingMove> {
        self.gate.cancel()
    }

    /// Starts working a deal by moving it into the first column.
    pub fn start_service(&mut self, deal_id: Uuid) -> PipelineResult<MoveOutcome> {
        let first = self.funnels.first_stage().ok_or(PipelineError::NoStages)?;
        self.request_move(deal_id, first.id)
    }

    /// Applies a legacy status by moving the deal to the matching stage.
    pub fn move_to_status(
        &mut self,
        deal_id: Uuid,
        status: LegacyStatus,
    ) -> PipelineResult<MoveOutcome> {
        let stages = self.funnels.stages();
        let stage = stage_for_status(status, &stages)
            .ok_or(PipelineError::StatusUnmapped(status.label()))?;
        self.request_move(deal_id, stage.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::drag::{Direction, DropTarget, Rect};
    use crate::loss::GateState;
    use crate::model::fixtures::{deal, funnel, loss_stage, stage, win_stage};
    use crate::model::{Deal, Stage};
    use crate::repository::{InMemoryRepository, PipelineRepository};
    use crate::view::BoardView;

    struct Fixture {
        repo: Arc<InMemoryRepository>,
        board: Board,
        stages: Vec<Stage>,
        deals: Vec<Deal>,
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
        repo.insert_funnel(f, stages.clone());
        let deals = vec![
            deal(&stages[0], "Apartamento Jardins", Some(45_000_000)),
            deal(&stages[1], "Casa Morumbi", Some(90_000_000)),
        ];
        for d in &deals {
            repo.insert_deal(d.clone());
        }

        let funnels = FunnelStore::new(repo.clone());
        let deal_store = DealStore::new(repo.clone(), &funnels);
        let mut board = Board::new(funnels, deal_store);
        board.load().await.unwrap();
        Fixture {
            repo,
            board,
            stages,
            deals,
        }
    }

    fn view(board: &Board) -> BoardView {
        match board.render() {
            BoardScreen::Ready(view) => view,
            other => panic!("board not ready: {other:?}"),
        }
    }

    fn center_of(board: &Board, target: DropTarget) -> Point {
        board.layout().rect_of(target).unwrap().center()
    }

    #[tokio::test]
    async fn drag_onto_another_column_moves_the_deal() {
        let mut fx = fixture().await;
        let deal_id = fx.deals[0].id;
        let from = center_of(&fx.board, DropTarget::Deal(deal_id));
        let to = center_of(&fx.board, DropTarget::Deal(fx.deals[1].id));

        fx.board.on_drag_start(deal_id, from);
        assert!(matches!(
            fx.board.on_drag_over(Point::new(from.x + 20.0, from.y)),
            BoardEvent::DragStarted(id) if id == deal_id
        ));
        let event = fx.board.on_drag_end(to);
        let BoardEvent::Move(MoveOutcome::Moved(confirmation)) = event else {
            panic!("unexpected event {event:?}");
        };

        let board = view(&fx.board);
        assert_eq!(board.columns[0].count, 0);
        assert_eq!(board.columns[1].count, 2);
        confirmation.wait().await.unwrap();
        assert_eq!(
            fx.repo.stored_deal(deal_id).unwrap().stage_id,
            Some(fx.stages[1].id)
        );
    }

    #[tokio::test]
    async fn drop_on_own_column_changes_nothing() {
        let mut fx = fixture().await;
        let deal_id = fx.deals[0].id;
        let from = center_of(&fx.board, DropTarget::Deal(deal_id));
        let before = fx.board.deals().snapshot();

        fx.board.on_drag_start(deal_id, from);
        fx.board.on_drag_over(Point::new(from.x, from.y + 10.0));
        let event = fx.board.on_drag_end(Point::new(from.x, from.y + 12.0));
        assert!(matches!(event, BoardEvent::Move(MoveOutcome::Unchanged)));
        assert_eq!(fx.board.deals().snapshot(), before);
        assert!(fx.repo.stage_history(deal_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn drop_over_empty_space_is_ignored() {
        let mut fx = fixture().await;
        let deal_id = fx.deals[0].id;
        let from = center_of(&fx.board, DropTarget::Deal(deal_id));

        fx.board.on_drag_start(deal_id, from);
        fx.board.on_drag_over(Point::new(from.x + 50.0, from.y));
        let event = fx.board.on_drag_end(Point::new(5_000.0, 5_000.0));
        assert!(matches!(event, BoardEvent::DropIgnored));
        assert_eq!(
            fx.board.deals().deal(deal_id).unwrap().stage_id,
            Some(fx.stages[0].id)
        );
    }

    #[tokio::test]
    async fn loss_drop_waits_for_reason_then_commits() {
        let mut fx = fixture().await;
        let deal_id = fx.deals[1].id;
        let lost = fx.stages[3].id;

        let outcome = fx.board.request_move(deal_id, lost).unwrap();
        assert!(matches!(outcome, MoveOutcome::AwaitingReason(mv) if mv.to_stage == lost));
        assert_eq!(
            fx.board.deals().deal(deal_id).unwrap().stage_id,
            Some(fx.stages[1].id)
        );
        let prompt = view(&fx.board).loss_prompt.unwrap();
        assert_eq!(prompt.title, "Motivo da Perda");
        assert_eq!(prompt.options.len(), 7);

        fx.board
            .confirm_loss(LossReason::Location)
            .unwrap()
            .wait()
            .await
            .unwrap();
        let stored = fx.repo.stored_deal(deal_id).unwrap();
        assert_eq!(stored.stage_id, Some(lost));
        assert_eq!(stored.lost_reason, Some(LossReason::Location));
        assert_eq!(fx.board.gate().state(), GateState::Armed);
        assert!(view(&fx.board).loss_prompt.is_none());
    }

    #[tokio::test]
    async fn cancelled_loss_leaves_deal_untouched() {
        let mut fx = fixture().await;
        let deal_id = fx.deals[1].id;
        fx.board.request_move(deal_id, fx.stages[3].id).unwrap();

        assert!(fx.board.cancel_loss().is_some());
        assert_eq!(
            fx.board.deals().deal(deal_id).unwrap().stage_id,
            Some(fx.stages[1].id)
        );
        assert!(fx.repo.stage_history(deal_id).await.unwrap().is_empty());
        assert!(matches!(
            fx.board.confirm_loss(LossReason::Other),
            Err(PipelineError::NothingPending)
        ));
    }

    #[tokio::test]
    async fn failed_persistence_rolls_the_card_back() {
        let mut fx = fixture().await;
        fx.repo.set_fail_writes(true);
        let deal_id = fx.deals[0].id;
        let MoveOutcome::Moved(confirmation) =
            fx.board.request_move(deal_id, fx.stages[1].id).unwrap()
        else {
            panic!("move was not committed");
        };
        assert_eq!(view(&fx.board).columns[1].count, 2);

        assert!(confirmation.wait().await.is_err());
        let board = view(&fx.board);
        assert_eq!(board.columns[0].count, 1);
        assert_eq!(board.columns[1].count, 1);
        assert!(fx.board.deals().snapshot().error.is_some());
    }

    #[tokio::test]
    async fn keyboard_drag_reaches_the_next_column() {
        let mut fx = fixture().await;
        let deal_id = fx.deals[0].id;
        assert!(matches!(
            fx.board.handle(Gesture::KeyPickUp { deal_id }),
            BoardEvent::DragStarted(_)
        ));
        fx.board.handle(Gesture::KeyMove(Direction::Right));
        let event = fx.board.handle(Gesture::KeyDrop);
        assert!(matches!(event, BoardEvent::Move(MoveOutcome::Moved(_))));
        assert_eq!(
            fx.board.deals().deal(deal_id).unwrap().stage_id,
            Some(fx.stages[1].id)
        );
    }

    #[tokio::test]
    async fn legacy_status_maps_onto_stages() {
        let mut fx = fixture().await;
        let deal_id = fx.deals[0].id;
        let outcome = fx
            .board
            .move_to_status(deal_id, LegacyStatus::Closed)
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Moved(_)));
        assert_eq!(
            fx.board.deals().deal(deal_id).unwrap().stage_id,
            Some(fx.stages[2].id)
        );

        let gated = fx
            .board
            .move_to_status(fx.deals[1].id, LegacyStatus::Lost)
            .unwrap();
        assert!(matches!(gated, MoveOutcome::AwaitingReason(_)));
    }

    #[tokio::test]
    async fn start_service_moves_unassigned_deal_to_first_stage() {
        let mut fx = fixture().await;
        let mut loose = deal(&fx.stages[0], "Lead do site", None);
        loose.stage_id = None;
        fx.repo.insert_deal(loose.clone());
        fx.board.load().await.unwrap();
        assert_eq!(view(&fx.board).unassigned.len(), 1);

        fx.board.start_service(loose.id).unwrap();
        assert!(view(&fx.board).unassigned.is_empty());
        assert_eq!(view(&fx.board).columns[0].count, 2);
    }

    #[tokio::test]
    async fn measured_layout_survives_moves_until_metrics_change() {
        let mut fx = fixture().await;
        let mut measured = DropLayout::new();
        for (column, stage) in fx.stages.iter().enumerate() {
            let x = column as f64 * 400.0;
            measured.register(DropTarget::Stage(stage.id), Rect::new(x, 0.0, 380.0, 900.0));
        }
        fx.board.set_layout(measured.clone());

        fx.board.request_move(fx.deals[0].id, fx.stages[1].id).unwrap();
        fx.board.set_filter(DealFilter::default());
        assert_eq!(fx.board.layout(), &measured);

        fx.board.set_metrics(LayoutMetrics::default());
        assert_ne!(fx.board.layout(), &measured);
    }
}
