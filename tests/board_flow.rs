use anyhow::{Result, anyhow};
use pipeline_tests::{SeededBoard, seeded_board};
use products_crm::{
    Board, BoardEvent, BoardScreen, BoardView, LegacyStatus, LossReason, MoveOutcome,
    drag::{DropTarget, Point},
};

fn ready(board: &Board) -> Result<BoardView> {
    match board.render() {
        BoardScreen::Ready(view) => Ok(view),
        other => Err(anyhow!("board not ready: {other:?}")),
    }
}

fn center_of(board: &Board, target: DropTarget) -> Result<Point> {
    board
        .layout()
        .rect_of(target)
        .map(|rect| rect.center())
        .ok_or_else(|| anyhow!("{target:?} is not on the board"))
}

#[tokio::test]
async fn seeded_board_lists_stages_in_order() -> Result<()> {
    let SeededBoard { board, .. } = seeded_board().await?;
    let view = ready(&board)?;

    let names: Vec<&str> = view.columns.iter().map(|c| c.stage.name.as_str()).collect();
    assert_eq!(
        names,
        ["Novo", "Qualificado", "Proposta", "Negociação", "Vendido", "Perdido"]
    );
    assert_eq!(view.summary.deal_count, 5);
    // Vendido is terminal, so its deal is not part of the open pipeline.
    assert_eq!(view.summary.open_value_cents, 435_000_000);
    assert_eq!(view.columns[5].empty_hint, Some("Arraste um card aqui"));
    Ok(())
}

#[tokio::test]
async fn drag_between_columns_is_persisted_with_history() -> Result<()> {
    let SeededBoard {
        mut board,
        repo,
        seeded,
    } = seeded_board().await?;
    let deal_id = seeded.deal_ids[0];
    let from = center_of(&board, DropTarget::Deal(deal_id))?;
    let to = center_of(&board, DropTarget::Deal(seeded.deal_ids[1]))?;

    board.on_drag_start(deal_id, from);
    board.on_drag_over(Point::new(from.x + 20.0, from.y));
    let event = board.on_drag_end(to);
    let BoardEvent::Move(MoveOutcome::Moved(confirmation)) = event else {
        return Err(anyhow!("unexpected event {event:?}"));
    };
    confirmation.wait().await?;

    let stored = repo.find_deal(deal_id).await?.ok_or_else(|| anyhow!("deal gone"))?;
    assert_eq!(stored.stage_id, Some(seeded.stage_ids[1]));
    let history = repo.stage_history(deal_id).await?;
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|h| {
        h.from_stage_id == Some(seeded.stage_ids[0]) && h.to_stage_id == seeded.stage_ids[1]
    }));
    Ok(())
}

#[tokio::test]
async fn loss_stage_waits_for_a_reason() -> Result<()> {
    let SeededBoard {
        mut board,
        repo,
        seeded,
    } = seeded_board().await?;
    let deal_id = seeded.deal_ids[1];
    let lost = seeded.stage_ids[5];

    let outcome = board.request_move(deal_id, lost)?;
    assert!(matches!(outcome, MoveOutcome::AwaitingReason(p) if p.to_stage == lost));
    let prompt = ready(&board)?
        .loss_prompt
        .ok_or_else(|| anyhow!("no loss prompt"))?;
    assert_eq!(prompt.title, "Motivo da Perda");
    assert_eq!(prompt.deal_name.as_deref(), Some("Casa Morumbi"));
    let untouched = repo.find_deal(deal_id).await?.ok_or_else(|| anyhow!("deal gone"))?;
    assert_eq!(untouched.stage_id, Some(seeded.stage_ids[1]));

    board.confirm_loss(LossReason::FinancingDenied)?.wait().await?;
    let stored = repo.find_deal(deal_id).await?.ok_or_else(|| anyhow!("deal gone"))?;
    assert_eq!(stored.stage_id, Some(lost));
    assert_eq!(stored.lost_reason, Some(LossReason::FinancingDenied));
    Ok(())
}

#[tokio::test]
async fn legacy_status_maps_onto_stages() -> Result<()> {
    let SeededBoard {
        mut board,
        repo,
        seeded,
    } = seeded_board().await?;
    let deal_id = seeded.deal_ids[2];

    let MoveOutcome::Moved(confirmation) = board.move_to_status(deal_id, LegacyStatus::Closed)?
    else {
        return Err(anyhow!("closing should not be gated"));
    };
    confirmation.wait().await?;
    let stored = repo.find_deal(deal_id).await?.ok_or_else(|| anyhow!("deal gone"))?;
    assert_eq!(stored.stage_id, Some(seeded.stage_ids[4]));

    let outcome = board.move_to_status(seeded.deal_ids[3], LegacyStatus::Lost)?;
    assert!(matches!(outcome, MoveOutcome::AwaitingReason(_)));
    assert!(board.cancel_loss().is_some());
    Ok(())
}

#[tokio::test]
async fn stage_reorder_survives_a_reload() -> Result<()> {
    let SeededBoard {
        mut board,
        repo,
        seeded,
    } = seeded_board().await?;
    let mut stages = board.funnels().stages();
    stages.swap(0, 1);
    board.funnels().update_stage_order(stages)?.wait().await?;

    let stored = repo.list_stages(seeded.funnel_id).await?;
    let names: Vec<&str> = stored.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names[..2], ["Qualificado", "Novo"]);
    assert!(stored.iter().enumerate().all(|(i, s)| s.order_index == i as i32));

    board.load().await?;
    let view = ready(&board)?;
    assert_eq!(view.columns[0].stage.name, "Qualificado");
    Ok(())
}
