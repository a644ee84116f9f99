//! Board presentation: columns, cards, filters and the text rendering used by
//! the CLI.

use std::fmt;

use uuid::Uuid;

use crate::deal_store::DealsState;
use crate::drag::{ActiveDrag, DropLayout, DropTarget, Rect};
use crate::format::{currency, currency_compact, day_month};
use crate::funnel_store::FunnelState;
use crate::loss::{LOSS_PROMPT_SUBTITLE, LOSS_PROMPT_TITLE, LossReason, PendingMove};
use crate::model::{Deal, Funnel, Stage, Temperature};

pub const EMPTY_COLUMN_HINT: &str = "Arraste um card aqui";
pub const NO_FUNNEL_MESSAGE: &str = "Nenhum funil ativo encontrado.";
pub const UNASSIGNED_LANE: &str = "Sem etapa";

/// Narrows the cards shown on the board. Counts and totals follow the filter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DealFilter {
    /// Case-insensitive match on deal name or e-mail.
    pub search: Option<String>,
    pub owner_id: Option<Uuid>,
    pub temperature: Option<Temperature>,
    pub source: Option<String>,
}

impl DealFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, deal: &Deal) -> bool {
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            let in_name = deal.name.to_lowercase().contains(&term);
            let in_email = deal
                .email
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains(&term));
            if !in_name && !in_email {
                return false;
            }
        }
        if self.owner_id.is_some() && deal.owner_id != self.owner_id {
            return false;
        }
        if self.temperature.is_some() && deal.temperature != self.temperature {
            return false;
        }
        if let Some(source) = &self.source {
            if deal.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardView {
    pub deal_id: Uuid,
    pub title: String,
    pub contact_name: Option<String>,
    /// Full currency, or `-` without a value.
    pub value: String,
    pub due_date: Option<String>,
    /// The card is the subject of the current drag and renders as a ghost.
    pub is_drag_placeholder: bool,
}

impl CardView {
    pub fn from_deal(deal: &Deal) -> Self {
        Self {
            deal_id: deal.id,
            title: deal.name.clone(),
            contact_name: deal.contact.as_ref().map(|c| c.display_name()),
            value: deal
                .value_cents
                .map(currency)
                .unwrap_or_else(|| "-".to_string()),
            due_date: deal.expected_close_date.map(day_month),
            is_drag_placeholder: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnView {
    pub stage: Stage,
    pub count: usize,
    pub total_cents: i64,
    /// Compact total, only when the column has cards.
    pub total_label: Option<String>,
    pub cards: Vec<CardView>,
    pub empty_hint: Option<&'static str>,
    pub is_drop_target: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardSummary {
    pub deal_count: usize,
    /// Value of deals outside terminal stages.
    pub open_value_cents: i64,
    pub open_value_label: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LossPrompt {
    pub title: &'static str,
    pub subtitle: &'static str,
    pub deal_id: Uuid,
    pub deal_name: Option<String>,
    pub to_stage: Uuid,
    pub options: Vec<(LossReason, &'static str)>,
    pub selected: LossReason,
}

impl LossPrompt {
    pub fn new(pending: PendingMove, deal_name: Option<String>) -> Self {
        Self {
            title: LOSS_PROMPT_TITLE,
            subtitle: LOSS_PROMPT_SUBTITLE,
            deal_id: pending.deal_id,
            deal_name,
            to_stage: pending.to_stage,
            options: LossReason::ALL.iter().map(|r| (*r, r.label())).collect(),
            selected: LossReason::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardView {
    pub funnel: Funnel,
    pub columns: Vec<ColumnView>,
    /// Deals without a stage, waiting for service to start.
    pub unassigned: Vec<CardView>,
    pub overlay: Option<CardView>,
    pub summary: BoardSummary,
    pub loss_prompt: Option<LossPrompt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoardScreen {
    Loading,
    Failed(String),
    NoActiveFunnel,
    NoStages(Funnel),
    Ready(BoardView),
}

/// One column per stage in display order, each with its matching deals.
pub fn build_columns(
    stages: &[Stage],
    deals: &[Deal],
    filter: &DealFilter,
    drag: Option<&ActiveDrag>,
    highlighted: Option<Uuid>,
) -> Vec<ColumnView> {
    let mut ordered: Vec<&Stage> = stages.iter().collect();
    ordered.sort_by_key(|s| s.order_index);
    let dragged = drag.map(|d| d.deal.id);

    ordered
        .into_iter()
        .map(|stage| {
            let members: Vec<&Deal> = deals
                .iter()
                .filter(|d| d.is_in(stage.id) && filter.matches(d))
                .collect();
            let total_cents = sum_values(members.iter().copied());
            let cards: Vec<CardView> = members
                .iter()
                .map(|d| CardView {
                    is_drag_placeholder: Some(d.id) == dragged,
                    ..CardView::from_deal(d)
                })
                .collect();
            ColumnView {
                stage: stage.clone(),
                count: members.len(),
                total_cents,
                total_label: (!members.is_empty()).then(|| currency_compact(total_cents)),
                empty_hint: cards.is_empty().then_some(EMPTY_COLUMN_HINT),
                cards,
                is_drop_target: highlighted == Some(stage.id),
            }
        })
        .collect()
}

// Saturates instead of overflowing on absurd values.
fn sum_values<'a>(deals: impl IntoIterator<Item = &'a Deal>) -> i64 {
    deals
        .into_iter()
        .map(Deal::value_or_zero)
        .fold(0, i64::saturating_add)
}

fn summarize(stages: &[Stage], deals: &[&Deal]) -> BoardSummary {
    let open_value_cents = sum_values(deals.iter().copied().filter(|d| match d.stage_id {
        Some(stage_id) => stages
            .iter()
            .find(|s| s.id == stage_id)
            .is_some_and(|s| !s.is_terminal()),
        None => true,
    }));
    BoardSummary {
        deal_count: deals.len(),
        open_value_cents,
        open_value_label: currency_compact(open_value_cents),
    }
}

/// Everything the board shows for one frame.
pub struct RenderInput<'a> {
    pub funnels: &'a FunnelState,
    pub deals: &'a DealsState,
    pub filter: &'a DealFilter,
    pub drag: Option<&'a ActiveDrag>,
    pub highlighted: Option<Uuid>,
    pub pending_loss: Option<PendingMove>,
}

pub fn render(input: RenderInput<'_>) -> BoardScreen {
    let RenderInput {
        funnels,
        deals,
        filter,
        drag,
        highlighted,
        pending_loss,
    } = input;

    let Some(funnel) = funnels.active_funnel.clone() else {
        return match (&funnels.error, funnels.is_loading) {
            (_, true) => BoardScreen::Loading,
            (Some(error), false) => BoardScreen::Failed(error.clone()),
            (None, false) => BoardScreen::NoActiveFunnel,
        };
    };
    if funnels.stages.is_empty() {
        return if funnels.is_loading {
            BoardScreen::Loading
        } else {
            BoardScreen::NoStages(funnel)
        };
    }

    // Deals fetched for another funnel are stale until the next fetch lands.
    let current: &[Deal] = if deals.funnel_id == Some(funnel.id) {
        &deals.deals
    } else {
        &[]
    };
    let visible: Vec<&Deal> = current.iter().filter(|d| filter.matches(d)).collect();

    let columns = build_columns(&funnels.stages, current, filter, drag, highlighted);
    let unassigned = visible
        .iter()
        .filter(|d| d.stage_id.is_none())
        .map(|d| CardView::from_deal(d))
        .collect();
    let summary = summarize(&funnels.stages, &visible);
    let overlay = drag.map(|d| CardView::from_deal(&d.deal));
    let loss_prompt = pending_loss.map(|pending| {
        let name = current
            .iter()
            .find(|d| d.id == pending.deal_id)
            .map(|d| d.name.clone());
        LossPrompt::new(pending, name)
    });

    BoardScreen::Ready(BoardView {
        funnel,
        columns,
        unassigned,
        overlay,
        summary,
        loss_prompt,
    })
}

/// Sizes used to place columns and cards when building a [`DropLayout`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutMetrics {
    pub column_width: f64,
    pub column_gap: f64,
    pub column_height: f64,
    pub header_height: f64,
    pub card_height: f64,
    pub card_gap: f64,
    pub padding: f64,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            column_width: 280.0,
            column_gap: 12.0,
            column_height: 600.0,
            header_height: 56.0,
            card_height: 96.0,
            card_gap: 8.0,
            padding: 8.0,
        }
    }
}

impl LayoutMetrics {
    pub fn column_rect(&self, index: usize) -> Rect {
        Rect::new(
            index as f64 * (self.column_width + self.column_gap),
            0.0,
            self.column_width,
            self.column_height,
        )
    }

    pub fn card_rect(&self, column: usize, row: usize) -> Rect {
        let col = self.column_rect(column);
        Rect::new(
            col.x + self.padding,
            self.header_height + row as f64 * (self.card_height + self.card_gap),
            self.column_width - 2.0 * self.padding,
            self.card_height,
        )
    }
}

impl BoardView {
    /// Column zones are registered before the cards they contain.
    pub fn layout(&self, metrics: &LayoutMetrics) -> DropLayout {
        let mut layout = DropLayout::new();
        for (index, column) in self.columns.iter().enumerate() {
            layout.register(DropTarget::Stage(column.stage.id), metrics.column_rect(index));
            for (row, card) in column.cards.iter().enumerate() {
                layout.register(DropTarget::Deal(card.deal_id), metrics.card_rect(index, row));
            }
        }
        layout
    }

    pub fn column(&self, stage_id: Uuid) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.stage.id == stage_id)
    }
}

impl fmt::Display for CardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_drag_placeholder { "~" } else { "-" };
        write!(f, "{marker} {}", self.title)?;
        if let Some(contact) = &self.contact_name {
            write!(f, " | {contact}")?;
        }
        write!(f, " | {}", self.value)?;
        if let Some(due) = &self.due_date {
            write!(f, " | {due}")?;
        }
        Ok(())
    }
}

impl fmt::Display for BoardScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardScreen::Loading => writeln!(f, "Carregando..."),
            BoardScreen::Failed(error) => writeln!(f, "Erro: {error}"),
            BoardScreen::NoActiveFunnel => writeln!(f, "{NO_FUNNEL_MESSAGE}"),
            BoardScreen::NoStages(funnel) => {
                writeln!(f, "{}: nenhuma etapa configurada.", funnel.name)
            }
            BoardScreen::Ready(view) => write!(f, "{view}"),
        }
    }
}

impl fmt::Display for BoardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} | {} negócios | pipeline {}",
            self.funnel.name, self.summary.deal_count, self.summary.open_value_label
        )?;
        for column in &self.columns {
            write!(f, "\n[{}] {}", column.stage.name, column.count)?;
            if let Some(total) = &column.total_label {
                write!(f, " | {total}")?;
            }
            writeln!(f)?;
            match column.empty_hint {
                Some(hint) => writeln!(f, "  ({hint})")?,
                None => {
                    for card in &column.cards {
                        writeln!(f, "  {card}")?;
                    }
                }
            }
        }
        if !self.unassigned.is_empty() {
            writeln!(f, "\n[{UNASSIGNED_LANE}] {}", self.unassigned.len())?;
            for card in &self.unassigned {
                writeln!(f, "  {card}")?;
            }
        }
        if let Some(prompt) = &self.loss_prompt {
            writeln!(f, "\n{}: {}", prompt.title, prompt.subtitle)?;
            for (reason, label) in &prompt.options {
                writeln!(f, "  [{}] {label}", reason.code())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContactRef;
    use crate::model::fixtures::{deal, funnel, loss_stage, stage, win_stage};
    use chrono::NaiveDate;

    fn state() -> (FunnelState, DealsState) {
        let f = funnel("Funil de Vendas");
        let stages = vec![
            stage(&f, "Novo", 0),
            stage(&f, "Proposta", 1),
            win_stage(&f, "Vendido", 2),
            loss_stage(&f, "Perdido", 3),
        ];
        let mut a = deal(&stages[0], "Apartamento Jardins", Some(45_000_000));
        a.contact = Some(ContactRef {
            id: Uuid::new_v4(),
            first_name: "Ana".into(),
            last_name: Some("Souza".into()),
        });
        a.expected_close_date = NaiveDate::from_ymd_opt(2025, 3, 12);
        a.email = Some("ana@example.com".into());
        let b = deal(&stages[0], "Casa Morumbi", Some(10_000_000));
        let c = deal(&stages[2], "Cobertura", Some(200_000_000));
        let d = deal(&stages[3], "Terreno", None);
        let mut loose = deal(&stages[0], "Sem atendimento", Some(5_000_000));
        loose.stage_id = None;

        let funnels = FunnelState {
            funnels: vec![f.clone()],
            active_funnel: Some(f.clone()),
            stages,
            is_loading: false,
            error: None,
        };
        let deals = DealsState {
            funnel_id: Some(f.id),
            deals: vec![a, b, c, d, loose],
            is_loading: false,
            error: None,
        };
        (funnels, deals)
    }

    fn ready(funnels: &FunnelState, deals: &DealsState, filter: &DealFilter) -> BoardView {
        match render(RenderInput {
            funnels,
            deals,
            filter,
            drag: None,
            highlighted: None,
            pending_loss: None,
        }) {
            BoardScreen::Ready(view) => view,
            other => panic!("board not ready: {other:?}"),
        }
    }

    #[test]
    fn column_counts_and_totals_match_members() {
        let (funnels, deals) = state();
        let view = ready(&funnels, &deals, &DealFilter::default());

        let counts: Vec<usize> = view.columns.iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![2, 0, 1, 1]);
        assert_eq!(view.columns[0].total_cents, 55_000_000);
        assert_eq!(view.columns[0].total_label.as_deref(), Some("R$\u{a0}550\u{a0}mil"));
        assert_eq!(view.columns[1].total_label, None);
        assert_eq!(view.columns[1].empty_hint, Some(EMPTY_COLUMN_HINT));
        assert_eq!(view.columns[3].total_cents, 0);
        assert_eq!(view.unassigned.len(), 1);
    }

    #[test]
    fn proposal_column_adds_up_its_deals() {
        let f = funnel("Funil de Vendas");
        let proposal = stage(&f, "Proposta", 0);
        let deals = vec![
            deal(&proposal, "Apartamento Centro", Some(10_000_000)),
            deal(&proposal, "Sala Comercial", Some(25_000_000)),
        ];
        let columns = build_columns(&[proposal], &deals, &DealFilter::default(), None, None);
        assert_eq!(columns[0].count, 2);
        assert_eq!(columns[0].total_cents, 35_000_000);
        assert_eq!(columns[0].total_label.as_deref(), Some("R$\u{a0}350\u{a0}mil"));
    }

    #[test]
    fn huge_values_saturate_instead_of_overflowing() {
        let (funnels, mut deals) = state();
        for d in deals.deals.iter_mut().filter(|d| d.stage_id.is_some()).take(2) {
            d.value_cents = Some(i64::MAX);
        }
        let view = ready(&funnels, &deals, &DealFilter::default());
        assert_eq!(view.columns[0].total_cents, i64::MAX);
        assert_eq!(view.summary.open_value_cents, i64::MAX);
    }

    #[test]
    fn summary_counts_only_open_value() {
        let (funnels, deals) = state();
        let view = ready(&funnels, &deals, &DealFilter::default());
        assert_eq!(view.summary.deal_count, 5);
        assert_eq!(view.summary.open_value_cents, 60_000_000);
    }

    #[test]
    fn card_shows_contact_value_and_due_date() {
        let (funnels, deals) = state();
        let view = ready(&funnels, &deals, &DealFilter::default());
        let card = &view.columns[0].cards[0];
        assert_eq!(card.title, "Apartamento Jardins");
        assert_eq!(card.contact_name.as_deref(), Some("Ana Souza"));
        assert_eq!(card.value, "R$\u{a0}450.000,00");
        assert_eq!(card.due_date.as_deref(), Some("12/03"));
        assert_eq!(view.columns[3].cards[0].value, "-");
    }

    #[test]
    fn filter_narrows_cards_and_counts() {
        let (funnels, deals) = state();
        let filter = DealFilter {
            search: Some("ANA@".into()),
            ..DealFilter::default()
        };
        let view = ready(&funnels, &deals, &filter);
        assert_eq!(view.columns[0].count, 1);
        assert_eq!(view.summary.deal_count, 1);
    }

    #[test]
    fn missing_funnel_and_stages_have_their_own_screens() {
        let deals = DealsState::default();
        let filter = DealFilter::default();
        let empty = FunnelState::default();
        let screen = render(RenderInput {
            funnels: &empty,
            deals: &deals,
            filter: &filter,
            drag: None,
            highlighted: None,
            pending_loss: None,
        });
        assert_eq!(screen, BoardScreen::NoActiveFunnel);
        assert_eq!(screen.to_string().trim(), NO_FUNNEL_MESSAGE);

        let f = funnel("Vazio");
        let bare = FunnelState {
            active_funnel: Some(f.clone()),
            ..FunnelState::default()
        };
        let screen = render(RenderInput {
            funnels: &bare,
            deals: &deals,
            filter: &filter,
            drag: None,
            highlighted: None,
            pending_loss: None,
        });
        assert_eq!(screen, BoardScreen::NoStages(f));
    }

    #[test]
    fn stale_deals_from_another_funnel_are_hidden() {
        let (funnels, mut deals) = state();
        deals.funnel_id = Some(Uuid::new_v4());
        let view = ready(&funnels, &deals, &DealFilter::default());
        assert!(view.columns.iter().all(|c| c.count == 0));
    }

    #[test]
    fn layout_registers_columns_before_their_cards() {
        let (funnels, deals) = state();
        let view = ready(&funnels, &deals, &DealFilter::default());
        let layout = view.layout(&LayoutMetrics::default());
        let zones = layout.zones();
        assert_eq!(zones[0].target, DropTarget::Stage(funnels.stages[0].id));
        assert!(matches!(zones[1].target, DropTarget::Deal(_)));
        assert_eq!(zones.len(), 4 + 4);
    }

    #[test]
    fn text_rendering_lists_columns() {
        let (funnels, deals) = state();
        let text = ready(&funnels, &deals, &DealFilter::default()).to_string();
        assert!(text.contains("[Novo] 2"));
        assert!(text.contains(EMPTY_COLUMN_HINT));
        assert!(text.contains(UNASSIGNED_LANE));
    }
}
