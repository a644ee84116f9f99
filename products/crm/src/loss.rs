//! Loss reasons and the gate that holds a move into a loss stage until one
//! is chosen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::model::Stage;

pub const LOSS_PROMPT_TITLE: &str = "Motivo da Perda";
pub const LOSS_PROMPT_SUBTITLE: &str = "Por que este negócio não avançou?";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LossReason {
    #[default]
    HighPrice,
    Location,
    Competitor,
    GaveUp,
    Unreachable,
    FinancingDenied,
    Other,
}

impl LossReason {
    /// Presentation order of the reason picker.
    pub const ALL: [LossReason; 7] = [
        LossReason::HighPrice,
        LossReason::Location,
        LossReason::Competitor,
        LossReason::GaveUp,
        LossReason::Unreachable,
        LossReason::FinancingDenied,
        LossReason::Other,
    ];

    pub fn code(self) -> &'static str {
        match self {
            LossReason::HighPrice => "HIGH_PRICE",
            LossReason::Location => "LOCATION",
            LossReason::Competitor => "COMPETITOR",
            LossReason::GaveUp => "GAVE_UP",
            LossReason::Unreachable => "UNREACHABLE",
            LossReason::FinancingDenied => "FINANCING_DENIED",
            LossReason::Other => "OTHER",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LossReason::HighPrice => "Preço alto / Fora do orçamento",
            LossReason::Location => "Localização não atendeu",
            LossReason::Competitor => "Comprou com concorrente",
            LossReason::GaveUp => "Desistiu da compra",
            LossReason::Unreachable => "Não responde / Contato errado",
            LossReason::FinancingDenied => "Reprovado no Financiamento",
            LossReason::Other => "Outro",
        }
    }

    /// Accepts either the stable code or the display label.
    pub fn from_code(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|reason| reason.code().eq_ignore_ascii_case(value) || reason.label() == value)
    }
}

impl std::fmt::Display for LossReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A move that has been requested but not yet committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingMove {
    pub deal_id: Uuid,
    pub to_stage: Uuid,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GateState {
    #[default]
    Armed,
    WaitingForReason(PendingMove),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Commit straight away.
    Forward(PendingMove),
    /// Held until [`LossReasonGate::confirm`] or [`LossReasonGate::cancel`].
    Held(PendingMove),
}

/// Intercepts moves into loss stages. At most one move waits at a time.
#[derive(Debug, Default)]
pub struct LossReasonGate {
    state: GateState,
}

impl LossReasonGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn pending(&self) -> Option<PendingMove> {
        match self.state {
            GateState::Armed => None,
            GateState::WaitingForReason(mv) => Some(mv),
        }
    }

    /// Holds moves into loss stages. While one is held every other move is
    /// refused, open destinations included.
    pub fn inspect(&mut self, mv: PendingMove, destination: &Stage) -> PipelineResult<GateDecision> {
        if let GateState::WaitingForReason(waiting) = self.state {
            return Err(PipelineError::GateBusy(waiting.deal_id));
        }
        if destination.is_gated() {
            self.state = GateState::WaitingForReason(mv);
            Ok(GateDecision::Held(mv))
        } else {
            Ok(GateDecision::Forward(mv))
        }
    }

    /// Releases the held move together with the chosen reason.
    pub fn confirm(&mut self, reason: LossReason) -> PipelineResult<(PendingMove, LossReason)> {
        match std::mem::take(&mut self.state) {
            GateState::WaitingForReason(mv) => Ok((mv, reason)),
            GateState::Armed => Err(PipelineError::NothingPending),
        }
    }

    /// Discards the held move; the deal never left its stage.
    pub fn cancel(&mut self) -> Option<PendingMove> {
        match std::mem::take(&mut self.state) {
            GateState::WaitingForReason(mv) => Some(mv),
            GateState::Armed => None,
        }
    }
}
