use std::collections::HashMap;

use async_graphql::{Context, Enum, Error, ErrorExtensions, InputObject, Object, SimpleObject, ID};
use chrono::{DateTime, NaiveDate, Utc};
use platform_api::ApiError;
use products_crm::{
    BoardScreen, Deal, DealFilter, DealPatch, DealsState, Funnel, FunnelPhase, FunnelState,
    LossReason, NewDeal, PipelineError, RepositoryError, Stage, StageChange, StageKind, StageOrder,
    Temperature,
    format::currency,
    phase::{phase_of, status_for_stage},
    view::{BoardView, CardView, RenderInput, render},
};
use tracing::{Instrument, info, info_span, instrument};
use uuid::Uuid;

use super::GraphqlData;

pub const LOSS_REASON_REQUIRED: &str = "LOSS_REASON_REQUIRED";

/// Upper bound for deal values: R$ 1 trilhão.
const MAX_VALUE_CENTS: i64 = 100_000_000_000_000;

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "StageKind")]
pub enum StageKindValue {
    Open,
    Closed,
    Won,
    Lost,
}

impl From<StageKind> for StageKindValue {
    fn from(value: StageKind) -> Self {
        match value {
            StageKind::Open => Self::Open,
            StageKind::Closed => Self::Closed,
            StageKind::Won => Self::Won,
            StageKind::Lost => Self::Lost,
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "Temperature")]
pub enum TemperatureValue {
    Hot,
    Warm,
    Cold,
}

impl From<Temperature> for TemperatureValue {
    fn from(value: Temperature) -> Self {
        match value {
            Temperature::Hot => Self::Hot,
            Temperature::Warm => Self::Warm,
            Temperature::Cold => Self::Cold,
        }
    }
}

impl From<TemperatureValue> for Temperature {
    fn from(value: TemperatureValue) -> Self {
        match value {
            TemperatureValue::Hot => Self::Hot,
            TemperatureValue::Warm => Self::Warm,
            TemperatureValue::Cold => Self::Cold,
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
#[graphql(name = "LossReason")]
pub enum LossReasonValue {
    HighPrice,
    Location,
    Competitor,
    GaveUp,
    Unreachable,
    FinancingDenied,
    Other,
}

impl From<LossReason> for LossReasonValue {
    fn from(value: LossReason) -> Self {
        match value {
            LossReason::HighPrice => Self::HighPrice,
            LossReason::Location => Self::Location,
            LossReason::Competitor => Self::Competitor,
            LossReason::GaveUp => Self::GaveUp,
            LossReason::Unreachable => Self::Unreachable,
            LossReason::FinancingDenied => Self::FinancingDenied,
            LossReason::Other => Self::Other,
        }
    }
}

impl From<LossReasonValue> for LossReason {
    fn from(value: LossReasonValue) -> Self {
        match value {
            LossReasonValue::HighPrice => Self::HighPrice,
            LossReasonValue::Location => Self::Location,
            LossReasonValue::Competitor => Self::Competitor,
            LossReasonValue::GaveUp => Self::GaveUp,
            LossReasonValue::Unreachable => Self::Unreachable,
            LossReasonValue::FinancingDenied => Self::FinancingDenied,
            LossReasonValue::Other => Self::Other,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Funnel")]
pub struct FunnelNode {
    pub id: ID,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_default: bool,
}

impl From<Funnel> for FunnelNode {
    fn from(funnel: Funnel) -> Self {
        Self {
            id: ID::from(funnel.id.to_string()),
            name: funnel.name,
            description: funnel.description,
            is_active: funnel.is_active,
            is_default: funnel.is_default,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Stage")]
pub struct StageNode {
    pub id: ID,
    pub funnel_id: ID,
    pub name: String,
    pub order_index: i32,
    pub kind: StageKindValue,
    pub is_final_stage: bool,
    pub is_win_stage: bool,
    pub is_loss_stage: bool,
    pub color: Option<String>,
    /// Funnel phase number (1-4); loss stages have none.
    pub phase: Option<i32>,
    pub legacy_status: Option<String>,
}

impl StageNode {
    /// `siblings` are the other stages of the same funnel, used to place the
    /// stage within the legacy phases.
    fn new(stage: &Stage, siblings: &[Stage]) -> Self {
        Self {
            id: ID::from(stage.id.to_string()),
            funnel_id: ID::from(stage.funnel_id.to_string()),
            name: stage.name.clone(),
            order_index: stage.order_index,
            kind: stage.kind().into(),
            is_final_stage: stage.is_final_stage,
            is_win_stage: stage.is_win_stage,
            is_loss_stage: stage.is_loss_stage,
            color: stage.color.clone(),
            phase: phase_of(stage, siblings).map(|p| i32::from(p.number())),
            legacy_status: status_for_stage(stage, siblings).map(|s| s.code().to_string()),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
#[graphql(name = "Deal")]
pub struct DealNode {
    pub id: ID,
    pub funnel_id: Option<ID>,
    pub stage_id: Option<ID>,
    pub contact_id: Option<ID>,
    pub contact_name: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub value_cents: Option<i64>,
    pub value_label: String,
    pub source: Option<String>,
    pub temperature: Option<TemperatureValue>,
    pub owner_id: Option<ID>,
    pub expected_close_date: Option<NaiveDate>,
    pub lost_reason: Option<LossReasonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Deal> for DealNode {
    fn from(deal: &Deal) -> Self {
        Self {
            id: ID::from(deal.id.to_string()),
            funnel_id: deal.funnel_id.map(|id| ID::from(id.to_string())),
            stage_id: deal.stage_id.map(|id| ID::from(id.to_string())),
            contact_id: deal.contact_id.map(|id| ID::from(id.to_string())),
            contact_name: deal.contact.as_ref().map(|c| c.display_name()),
            name: deal.name.clone(),
            email: deal.email.clone(),
            phone: deal.phone.clone(),
            value_cents: deal.value_cents,
            value_label: currency(deal.value_or_zero()),
            source: deal.source.clone(),
            temperature: deal.temperature.map(Into::into),
            owner_id: deal.owner_id.map(|id| ID::from(id.to_string())),
            expected_close_date: deal.expected_close_date,
            lost_reason: deal.lost_reason.map(Into::into),
            created_at: deal.created_at,
            updated_at: deal.updated_at,
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct BoardColumn {
    pub stage: StageNode,
    pub count: i32,
    pub total_cents: i64,
    /// Compact total, absent for empty columns.
    pub total_label: Option<String>,
    pub deals: Vec<DealNode>,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct BoardPayload {
    pub funnel: FunnelNode,
    pub columns: Vec<BoardColumn>,
    /// Deals of the funnel that have no stage yet.
    pub unassigned: Vec<DealNode>,
    pub deal_count: i32,
    pub open_value_cents: i64,
    pub open_value_label: String,
}

impl BoardPayload {
    fn new(view: BoardView, stages: &[Stage], deals: &[Deal]) -> Self {
        let by_id: HashMap<Uuid, &Deal> = deals.iter().map(|d| (d.id, d)).collect();
        let pick = |cards: &[CardView]| -> Vec<DealNode> {
            cards
                .iter()
                .filter_map(|card| by_id.get(&card.deal_id).map(|d| DealNode::from(*d)))
                .collect()
        };
        let columns = view
            .columns
            .iter()
            .map(|column| BoardColumn {
                stage: StageNode::new(&column.stage, stages),
                count: column.count as i32,
                total_cents: column.total_cents,
                total_label: column.total_label.clone(),
                deals: pick(&column.cards),
            })
            .collect();
        let unassigned = pick(&view.unassigned);
        Self {
            funnel: view.funnel.into(),
            columns,
            unassigned,
            deal_count: view.summary.deal_count as i32,
            open_value_cents: view.summary.open_value_cents,
            open_value_label: view.summary.open_value_label,
        }
    }

    fn without_stages(funnel: Funnel) -> Self {
        Self {
            funnel: funnel.into(),
            columns: vec![],
            unassigned: vec![],
            deal_count: 0,
            open_value_cents: 0,
            open_value_label: products_crm::format::currency_compact(0),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct LossReasonOption {
    pub code: LossReasonValue,
    pub label: String,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct FunnelPhaseNode {
    pub number: i32,
    pub title: String,
    pub statuses: Vec<String>,
    pub questions: Vec<String>,
}

impl From<FunnelPhase> for FunnelPhaseNode {
    fn from(phase: FunnelPhase) -> Self {
        Self {
            number: i32::from(phase.number()),
            title: phase.title().to_string(),
            statuses: phase.statuses().iter().map(|s| s.label().to_string()).collect(),
            questions: phase.questions().iter().map(|q| q.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, SimpleObject)]
pub struct StageChangeNode {
    pub id: ID,
    pub deal_id: ID,
    pub from_stage_id: Option<ID>,
    pub to_stage_id: ID,
    pub lost_reason: Option<LossReasonValue>,
    pub changed_at: DateTime<Utc>,
}

impl From<StageChange> for StageChangeNode {
    fn from(change: StageChange) -> Self {
        Self {
            id: ID::from(change.id.to_string()),
            deal_id: ID::from(change.deal_id.to_string()),
            from_stage_id: change.from_stage_id.map(|id| ID::from(id.to_string())),
            to_stage_id: ID::from(change.to_stage_id.to_string()),
            lost_reason: change.lost_reason.map(Into::into),
            changed_at: change.changed_at,
        }
    }
}

#[derive(Clone, Debug, Default, InputObject)]
pub struct BoardFilterInput {
    pub search: Option<String>,
    pub owner_id: Option<ID>,
    pub temperature: Option<TemperatureValue>,
    pub source: Option<String>,
}

impl BoardFilterInput {
    fn into_filter(self) -> async_graphql::Result<DealFilter> {
        Ok(DealFilter {
            search: sanitize_optional(self.search),
            owner_id: self.owner_id.as_ref().map(parse_uuid).transpose()?,
            temperature: self.temperature.map(Into::into),
            source: sanitize_optional(self.source),
        })
    }
}

#[derive(Clone, Debug, InputObject)]
pub struct CreateDealInput {
    pub funnel_id: ID,
    /// Defaults to the first stage of the funnel.
    pub stage_id: Option<ID>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub value_cents: Option<i64>,
    pub contact_id: Option<ID>,
    pub source: Option<String>,
    pub temperature: Option<TemperatureValue>,
    pub owner_id: Option<ID>,
    pub expected_close_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, InputObject)]
pub struct UpdateDealInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub value_cents: Option<i64>,
    pub contact_id: Option<ID>,
    pub source: Option<String>,
    pub temperature: Option<TemperatureValue>,
    pub owner_id: Option<ID>,
    pub expected_close_date: Option<NaiveDate>,
}

impl UpdateDealInput {
    fn into_patch(self) -> async_graphql::Result<DealPatch> {
        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(ApiError::InvalidInput("name must not be empty".into()).extend());
            }
            other => other.map(|n| n.trim().to_string()),
        };
        Ok(DealPatch {
            name,
            email: self.email,
            phone: self.phone,
            value_cents: check_value(self.value_cents)?,
            contact_id: self.contact_id.as_ref().map(parse_uuid).transpose()?,
            source: self.source,
            temperature: self.temperature.map(Into::into),
            owner_id: self.owner_id.as_ref().map(parse_uuid).transpose()?,
            expected_close_date: self.expected_close_date,
        })
    }
}

#[derive(Default)]
pub struct PipelineQuery;

#[Object]
impl PipelineQuery {
    #[instrument(name = "graphql.funnels", skip_all)]
    async fn funnels(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = true)] active_only: bool,
    ) -> async_graphql::Result<Vec<FunnelNode>> {
        let data = graphql_data(ctx)?;
        let funnels = data.repo.list_funnels(active_only).await.map_err(repo_error)?;
        Ok(funnels.into_iter().map(FunnelNode::from).collect())
    }

    #[instrument(name = "graphql.stages", skip_all)]
    async fn stages(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "funnelId")] funnel_id: ID,
    ) -> async_graphql::Result<Vec<StageNode>> {
        let data = graphql_data(ctx)?;
        let funnel_id = parse_uuid(&funnel_id)?;
        let stages = data.repo.list_stages(funnel_id).await.map_err(repo_error)?;
        Ok(stages.iter().map(|s| StageNode::new(s, &stages)).collect())
    }

    #[instrument(name = "graphql.deal", skip_all)]
    async fn deal(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<Option<DealNode>> {
        let data = graphql_data(ctx)?;
        let deal = data
            .repo
            .find_deal(parse_uuid(&id)?)
            .await
            .map_err(repo_error)?;
        Ok(deal.as_ref().map(DealNode::from))
    }

    /// Columns in stage order with their deals, counts and totals. Counts and
    /// totals follow the filter.
    async fn board(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "funnelId")] funnel_id: ID,
        filter: Option<BoardFilterInput>,
    ) -> async_graphql::Result<BoardPayload> {
        let data = graphql_data(ctx)?;
        let funnel_id = parse_uuid(&funnel_id)?;
        let filter = filter.unwrap_or_default().into_filter()?;
        let span = info_span!(
            "graphql.board",
            %funnel_id,
            filtered = !filter.is_empty()
        );
        load_board(data, funnel_id, filter).instrument(span).await
    }

    #[graphql(name = "lossReasons")]
    async fn loss_reasons(&self) -> Vec<LossReasonOption> {
        LossReason::ALL
            .iter()
            .map(|reason| LossReasonOption {
                code: (*reason).into(),
                label: reason.label().to_string(),
            })
            .collect()
    }

    #[graphql(name = "funnelPhases")]
    async fn funnel_phases(&self) -> Vec<FunnelPhaseNode> {
        FunnelPhase::ALL.into_iter().map(FunnelPhaseNode::from).collect()
    }

    #[graphql(name = "dealStageHistory")]
    #[instrument(name = "graphql.deal_stage_history", skip_all)]
    async fn deal_stage_history(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "dealId")] deal_id: ID,
    ) -> async_graphql::Result<Vec<StageChangeNode>> {
        let data = graphql_data(ctx)?;
        let history = data
            .repo
            .stage_history(parse_uuid(&deal_id)?)
            .await
            .map_err(repo_error)?;
        Ok(history.into_iter().map(StageChangeNode::from).collect())
    }
}

#[derive(Default)]
pub struct PipelineMutation;

#[Object]
impl PipelineMutation {
    #[graphql(name = "createDeal")]
    #[instrument(name = "graphql.create_deal", skip_all)]
    async fn create_deal(
        &self,
        ctx: &Context<'_>,
        input: CreateDealInput,
    ) -> async_graphql::Result<DealNode> {
        let data = graphql_data(ctx)?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::InvalidInput("name must not be empty".into()).extend());
        }
        let funnel_id = parse_uuid(&input.funnel_id)?;
        let stages = data.repo.list_stages(funnel_id).await.map_err(repo_error)?;
        let stage = match &input.stage_id {
            Some(id) => {
                let stage_id = parse_uuid(id)?;
                stages
                    .iter()
                    .find(|s| s.id == stage_id)
                    .ok_or_else(|| pipeline_error(PipelineError::StageNotFound(stage_id)))?
            }
            None => stages
                .iter()
                .min_by_key(|s| s.order_index)
                .ok_or_else(|| pipeline_error(PipelineError::NoStages))?,
        };
        if stage.is_gated() {
            return Err(pipeline_error(PipelineError::LossReasonRequired(stage.id)));
        }

        let new_deal = NewDeal {
            funnel_id: Some(funnel_id),
            stage_id: Some(stage.id),
            contact_id: input.contact_id.as_ref().map(parse_uuid).transpose()?,
            name,
            email: input.email,
            phone: input.phone,
            value_cents: check_value(input.value_cents)?,
            source: input.source,
            temperature: input.temperature.map(Into::into),
            owner_id: input.owner_id.as_ref().map(parse_uuid).transpose()?,
            expected_close_date: input.expected_close_date,
        };
        let deal = data.repo.create_deal(new_deal).await.map_err(repo_error)?;
        info!(deal_id = %deal.id, stage_id = %stage.id, "deal created");
        Ok(DealNode::from(&deal))
    }

    #[graphql(name = "updateDeal")]
    #[instrument(name = "graphql.update_deal", skip_all)]
    async fn update_deal(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: UpdateDealInput,
    ) -> async_graphql::Result<DealNode> {
        let data = graphql_data(ctx)?;
        let deal_id = parse_uuid(&id)?;
        let patch = input.into_patch()?;
        let deal = if patch.is_empty() {
            data.repo
                .find_deal(deal_id)
                .await
                .map_err(repo_error)?
                .ok_or_else(|| pipeline_error(PipelineError::DealNotFound(deal_id)))?
        } else {
            data.repo
                .update_deal(deal_id, patch)
                .await
                .map_err(repo_error)?
        };
        Ok(DealNode::from(&deal))
    }

    /// Moves a deal to another stage. A loss reason is required exactly when
    /// the destination is a loss stage.
    #[graphql(name = "moveDeal")]
    #[instrument(name = "graphql.move_deal", skip_all)]
    async fn move_deal(
        &self,
        ctx: &Context<'_>,
        id: ID,
        #[graphql(name = "stageId")] stage_id: ID,
        #[graphql(name = "lossReason")] loss_reason: Option<LossReasonValue>,
    ) -> async_graphql::Result<DealNode> {
        let data = graphql_data(ctx)?;
        let deal_id = parse_uuid(&id)?;
        let stage_id = parse_uuid(&stage_id)?;
        let deal = data
            .repo
            .find_deal(deal_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| pipeline_error(PipelineError::DealNotFound(deal_id)))?;
        let stage = data
            .repo
            .find_stage(stage_id)
            .await
            .map_err(repo_error)?
            .ok_or_else(|| pipeline_error(PipelineError::StageNotFound(stage_id)))?;

        let planned = deal
            .plan_move(&stage, loss_reason.map(Into::into))
            .map_err(pipeline_error)?;
        let Some(mv) = planned else {
            return Ok(DealNode::from(&deal));
        };
        let moved = data
            .repo
            .move_deal_stage(deal_id, mv)
            .await
            .map_err(repo_error)?;
        info!(%deal_id, %stage_id, "deal moved");
        Ok(DealNode::from(&moved))
    }

    /// Rewrites the column order of a funnel. `stageIds` must list every
    /// stage of the funnel exactly once.
    #[graphql(name = "reorderStages")]
    #[instrument(name = "graphql.reorder_stages", skip_all)]
    async fn reorder_stages(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "funnelId")] funnel_id: ID,
        #[graphql(name = "stageIds")] stage_ids: Vec<ID>,
    ) -> async_graphql::Result<Vec<StageNode>> {
        let data = graphql_data(ctx)?;
        let funnel_id = parse_uuid(&funnel_id)?;
        let ids = stage_ids
            .iter()
            .map(parse_uuid)
            .collect::<async_graphql::Result<Vec<_>>>()?;

        let current = data.repo.list_stages(funnel_id).await.map_err(repo_error)?;
        let mut expected: Vec<Uuid> = current.iter().map(|s| s.id).collect();
        let mut given = ids.clone();
        expected.sort();
        given.sort();
        if current.is_empty() || expected != given {
            return Err(pipeline_error(PipelineError::InvalidStageOrder));
        }

        let order = ids
            .into_iter()
            .enumerate()
            .map(|(position, id)| StageOrder {
                id,
                order_index: position as i32,
            })
            .collect();
        data.repo
            .update_stage_order(order)
            .await
            .map_err(repo_error)?;

        let stages = data.repo.list_stages(funnel_id).await.map_err(repo_error)?;
        Ok(stages.iter().map(|s| StageNode::new(s, &stages)).collect())
    }
}

async fn load_board(
    data: &GraphqlData,
    funnel_id: Uuid,
    filter: DealFilter,
) -> async_graphql::Result<BoardPayload> {
    let funnel = data
        .repo
        .list_funnels(false)
        .await
        .map_err(repo_error)?
        .into_iter()
        .find(|f| f.id == funnel_id)
        .ok_or_else(|| ApiError::NotFound.extend())?;
    let stages = data.repo.list_stages(funnel_id).await.map_err(repo_error)?;
    let deals = data.repo.list_deals(funnel_id).await.map_err(repo_error)?;

    let funnels = FunnelState {
        active_funnel: Some(funnel),
        stages,
        ..FunnelState::default()
    };
    let deals = DealsState {
        funnel_id: Some(funnel_id),
        deals,
        ..DealsState::default()
    };
    let screen = render(RenderInput {
        funnels: &funnels,
        deals: &deals,
        filter: &filter,
        drag: None,
        highlighted: None,
        pending_loss: None,
    });
    match screen {
        BoardScreen::Ready(view) => Ok(BoardPayload::new(view, &funnels.stages, &deals.deals)),
        BoardScreen::NoStages(funnel) => Ok(BoardPayload::without_stages(funnel)),
        other => Err(platform_api::internal_error(anyhow::anyhow!(
            "board rendered as {other:?}"
        ))),
    }
}

fn graphql_data<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a GraphqlData> {
    ctx.data::<GraphqlData>()
        .map_err(|_| platform_api::internal_error(anyhow::anyhow!("missing pipeline repository")))
}

fn parse_uuid(id: &ID) -> async_graphql::Result<Uuid> {
    Uuid::parse_str(id.as_str())
        .map_err(|_| ApiError::InvalidInput(format!("invalid id {}", id.as_str())).extend())
}

fn check_value(value: Option<i64>) -> async_graphql::Result<Option<i64>> {
    match value {
        Some(cents) if !(0..=MAX_VALUE_CENTS).contains(&cents) => Err(ApiError::InvalidInput(
            format!("valueCents must be between 0 and {MAX_VALUE_CENTS}"),
        )
        .extend()),
        other => Ok(other),
    }
}

fn sanitize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

fn repo_error(err: RepositoryError) -> Error {
    pipeline_error(err.into())
}

fn pipeline_error(err: PipelineError) -> Error {
    let api = match err {
        PipelineError::DealNotFound(_)
        | PipelineError::FunnelNotFound(_)
        | PipelineError::StageNotFound(_)
        | PipelineError::Repository(RepositoryError::NotFound) => ApiError::NotFound,
        PipelineError::LossReasonRequired(_) => {
            ApiError::precondition(LOSS_REASON_REQUIRED, err.to_string())
        }
        PipelineError::NoStages => ApiError::precondition("NO_STAGES", err.to_string()),
        PipelineError::UnexpectedLossReason(_) | PipelineError::InvalidStageOrder => {
            ApiError::InvalidInput(err.to_string())
        }
        other => ApiError::internal(anyhow::Error::new(other)),
    };
    api.extend()
}
