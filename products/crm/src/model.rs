//! Funnel, stage and deal records as the pipeline core sees them.
//!
//! A deal's position is its `stage_id`. Everything else about a deal can be
//! edited freely through [`DealPatch`]; position changes go through
//! [`Deal::plan_move`] so loss stages always receive a reason.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::loss::LossReason;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funnel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    Open,
    /// Terminal but neither won nor lost (e.g. "on hold").
    Closed,
    Won,
    Lost,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub funnel_id: Uuid,
    pub name: String,
    pub order_index: i32,
    pub is_final_stage: bool,
    pub is_win_stage: bool,
    pub is_loss_stage: bool,
    pub color: Option<String>,
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        if self.is_loss_stage {
            StageKind::Lost
        } else if self.is_win_stage {
            StageKind::Won
        } else if self.is_final_stage {
            StageKind::Closed
        } else {
            StageKind::Open
        }
    }

    /// Entering a gated stage requires a loss reason.
    pub fn is_gated(&self) -> bool {
        self.is_loss_stage
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() != StageKind::Open
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperature {
    Hot,
    Warm,
    Cold,
}

impl Temperature {
    pub fn as_str(self) -> &'static str {
        match self {
            Temperature::Hot => "hot",
            Temperature::Warm => "warm",
            Temperature::Cold => "cold",
        }
    }

    pub fn from_code(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hot" => Some(Temperature::Hot),
            "warm" => Some(Temperature::Warm),
            "cold" => Some(Temperature::Cold),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRef {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl ContactRef {
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub funnel_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub value_cents: Option<i64>,
    pub source: Option<String>,
    pub temperature: Option<Temperature>,
    pub owner_id: Option<Uuid>,
    pub expected_close_date: Option<NaiveDate>,
    pub lost_reason: Option<LossReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub contact: Option<ContactRef>,
}

impl Deal {
    pub fn value_or_zero(&self) -> i64 {
        self.value_cents.unwrap_or(0)
    }

    pub fn is_in(&self, stage_id: Uuid) -> bool {
        self.stage_id == Some(stage_id)
    }

    /// Works out the write needed to put this deal into `to`.
    ///
    /// Returns `Ok(None)` when the deal already sits in `to`. A reason is
    /// required for loss stages and rejected everywhere else; leaving a loss
    /// stage clears the recorded reason.
    pub fn plan_move(
        &self,
        to: &Stage,
        reason: Option<LossReason>,
    ) -> PipelineResult<Option<StageMove>> {
        if let Some(funnel_id) = self.funnel_id {
            if funnel_id != to.funnel_id {
                return Err(PipelineError::StageNotFound(to.id));
            }
        }
        if self.is_in(to.id) {
            return Ok(None);
        }
        match (to.is_gated(), reason) {
            (true, None) => Err(PipelineError::LossReasonRequired(to.id)),
            (false, Some(_)) => Err(PipelineError::UnexpectedLossReason(to.id)),
            (_, lost_reason) => Ok(Some(StageMove {
                funnel_id: to.funnel_id,
                stage_id: to.id,
                lost_reason,
            })),
        }
    }

    pub(crate) fn apply_move(&mut self, mv: &StageMove, at: DateTime<Utc>) {
        self.funnel_id = Some(mv.funnel_id);
        self.stage_id = Some(mv.stage_id);
        self.lost_reason = mv.lost_reason;
        self.updated_at = at;
    }

    pub(crate) fn apply_patch(&mut self, patch: &DealPatch, at: DateTime<Utc>) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(phone) = &patch.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(value) = patch.value_cents {
            self.value_cents = Some(value);
        }
        if let Some(contact_id) = patch.contact_id {
            if self.contact_id != Some(contact_id) {
                self.contact = None;
            }
            self.contact_id = Some(contact_id);
        }
        if let Some(source) = &patch.source {
            self.source = Some(source.clone());
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = Some(temperature);
        }
        if let Some(owner_id) = patch.owner_id {
            self.owner_id = Some(owner_id);
        }
        if let Some(date) = patch.expected_close_date {
            self.expected_close_date = Some(date);
        }
        self.updated_at = at;
    }
}

/// Input for creating a deal. Without a `stage_id` the deal lands in the
/// first stage of the active funnel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeal {
    pub funnel_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub value_cents: Option<i64>,
    pub source: Option<String>,
    pub temperature: Option<Temperature>,
    pub owner_id: Option<Uuid>,
    pub expected_close_date: Option<NaiveDate>,
}

impl NewDeal {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value_cents: i64) -> Self {
        self.value_cents = Some(value_cents);
        self
    }

    pub fn in_stage(mut self, stage_id: Uuid) -> Self {
        self.stage_id = Some(stage_id);
        self
    }
}

/// Field edits. `None` leaves a field untouched; stage membership is not
/// editable here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub value_cents: Option<i64>,
    pub contact_id: Option<Uuid>,
    pub source: Option<String>,
    pub temperature: Option<Temperature>,
    pub owner_id: Option<Uuid>,
    pub expected_close_date: Option<NaiveDate>,
}

impl DealPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMove {
    /// Funnel of the destination stage; the deal adopts it.
    pub funnel_id: Uuid,
    pub stage_id: Uuid,
    pub lost_reason: Option<LossReason>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOrder {
    pub id: Uuid,
    pub order_index: i32,
}

/// One recorded stage transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub from_stage_id: Option<Uuid>,
    pub to_stage_id: Uuid,
    pub lost_reason: Option<LossReason>,
    pub changed_at: DateTime<Utc>,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn plan_move_requires_reason_for_loss_stage() {
        let f = funnel("Vendas");
        let open = stage(&f, "Novo", 0);
        let lost = loss_stage(&f, "Perdido", 1);
        let d = deal(&open, "Apto Centro", Some(10_000));

        let err = d.plan_move(&lost, None).unwrap_err();
        assert!(matches!(err, PipelineError::LossReasonRequired(id) if id == lost.id));

        let mv = d
            .plan_move(&lost, Some(LossReason::HighPrice))
            .unwrap()
            .unwrap();
        assert_eq!(mv.stage_id, lost.id);
        assert_eq!(mv.lost_reason, Some(LossReason::HighPrice));
    }

    #[test]
    fn plan_move_to_current_stage_is_a_noop() {
        let f = funnel("Vendas");
        let open = stage(&f, "Novo", 0);
        let d = deal(&open, "Casa", None);
        assert_eq!(d.plan_move(&open, None).unwrap(), None);
    }

    #[test]
    fn leaving_a_loss_stage_clears_the_reason() {
        let f = funnel("Vendas");
        let open = stage(&f, "Novo", 0);
        let lost = loss_stage(&f, "Perdido", 1);
        let mut d = deal(&lost, "Casa", None);
        d.lost_reason = Some(LossReason::Competitor);

        let mv = d.plan_move(&open, None).unwrap().unwrap();
        d.apply_move(&mv, Utc::now());
        assert_eq!(d.stage_id, Some(open.id));
        assert_eq!(d.lost_reason, None);
    }

    #[test]
    fn reason_outside_loss_stage_is_rejected() {
        let f = funnel("Vendas");
        let a = stage(&f, "Novo", 0);
        let b = stage(&f, "Qualificado", 1);
        let d = deal(&a, "Casa", None);
        assert!(matches!(
            d.plan_move(&b, Some(LossReason::Other)),
            Err(PipelineError::UnexpectedLossReason(_))
        ));
    }

    #[test]
    fn stage_from_another_funnel_is_rejected() {
        let f = funnel("Vendas");
        let other = funnel("Locação");
        let a = stage(&f, "Novo", 0);
        let foreign = stage(&other, "Novo", 0);
        let d = deal(&a, "Casa", None);
        assert!(matches!(
            d.plan_move(&foreign, None),
            Err(PipelineError::StageNotFound(_))
        ));
    }

    #[test]
    fn deal_without_funnel_adopts_the_destination_funnel() {
        let f = funnel("Vendas");
        let a = stage(&f, "Novo", 0);
        let mut d = deal(&a, "Lead avulso", None);
        d.funnel_id = None;
        d.stage_id = None;

        let mv = d.plan_move(&a, None).unwrap().unwrap();
        assert_eq!(mv.funnel_id, f.id);
        d.apply_move(&mv, Utc::now());
        assert_eq!(d.funnel_id, Some(f.id));
        assert_eq!(d.stage_id, Some(a.id));
    }

    #[test]
    fn stage_kind_prefers_loss_then_win() {
        let f = funnel("Vendas");
        assert_eq!(stage(&f, "Novo", 0).kind(), StageKind::Open);
        assert_eq!(win_stage(&f, "Vendido", 1).kind(), StageKind::Won);
        assert_eq!(loss_stage(&f, "Perdido", 2).kind(), StageKind::Lost);
        let parked = Stage {
            is_final_stage: true,
            ..stage(&f, "Pausado", 3)
        };
        assert_eq!(parked.kind(), StageKind::Closed);
        assert!(parked.is_terminal());
    }

    #[test]
    fn contact_display_name_joins_last_name() {
        let contact = ContactRef {
            id: Uuid::new_v4(),
            first_name: "Ana".into(),
            last_name: Some("Souza".into()),
        };
        assert_eq!(contact.display_name(), "Ana Souza");
        let single = ContactRef {
            last_name: Some("  ".into()),
            ..contact
        };
        assert_eq!(single.display_name(), "Ana");
    }
}
