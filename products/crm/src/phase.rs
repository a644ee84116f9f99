//! Legacy lead statuses and the four-phase service script, both derived from
//! a deal's stage.
//!
//! Win stages map to the closing phase, loss stages fall outside any phase
//! and the remaining (open) stages are split by position into prospection,
//! qualification and opportunity.

use serde::{Deserialize, Serialize};

use crate::model::{Stage, StageKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegacyStatus {
    New,
    Triage,
    Qualified,
    VisitScheduled,
    Proposal,
    Negotiation,
    Closed,
    Disqualified,
    Lost,
}

impl LegacyStatus {
    pub const ALL: [LegacyStatus; 9] = [
        LegacyStatus::New,
        LegacyStatus::Triage,
        LegacyStatus::Qualified,
        LegacyStatus::VisitScheduled,
        LegacyStatus::Proposal,
        LegacyStatus::Negotiation,
        LegacyStatus::Closed,
        LegacyStatus::Disqualified,
        LegacyStatus::Lost,
    ];

    pub fn code(self) -> &'static str {
        match self {
            LegacyStatus::New => "NEW",
            LegacyStatus::Triage => "TRIAGE",
            LegacyStatus::Qualified => "QUALIFIED",
            LegacyStatus::VisitScheduled => "VISIT_SCHEDULED",
            LegacyStatus::Proposal => "PROPOSAL",
            LegacyStatus::Negotiation => "NEGOTIATION",
            LegacyStatus::Closed => "CLOSED",
            LegacyStatus::Disqualified => "DISQUALIFIED",
            LegacyStatus::Lost => "LOST",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LegacyStatus::New => "Novo",
            LegacyStatus::Triage => "Em Triagem",
            LegacyStatus::Qualified => "Qualificado",
            LegacyStatus::VisitScheduled => "Visita",
            LegacyStatus::Proposal => "Proposta",
            LegacyStatus::Negotiation => "Negociação",
            LegacyStatus::Closed => "Vendido",
            LegacyStatus::Disqualified => "Não Qualificado",
            LegacyStatus::Lost => "Arquivado",
        }
    }

    pub fn from_code(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.code().eq_ignore_ascii_case(value) || status.label() == value)
    }

    /// Statuses that need a loss reason before a deal may take them.
    pub fn is_gated(self) -> bool {
        matches!(self, LegacyStatus::Disqualified | LegacyStatus::Lost)
    }

    /// Counts toward the open pipeline value.
    pub fn is_open(self) -> bool {
        !matches!(
            self,
            LegacyStatus::Closed | LegacyStatus::Disqualified | LegacyStatus::Lost
        )
    }

    pub fn phase(self) -> Option<FunnelPhase> {
        FunnelPhase::ALL
            .into_iter()
            .find(|phase| phase.statuses().contains(&self))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunnelPhase {
    Prospection,
    Qualification,
    Opportunity,
    Closing,
}

impl FunnelPhase {
    pub const ALL: [FunnelPhase; 4] = [
        FunnelPhase::Prospection,
        FunnelPhase::Qualification,
        FunnelPhase::Opportunity,
        FunnelPhase::Closing,
    ];

    pub fn number(self) -> u8 {
        match self {
            FunnelPhase::Prospection => 1,
            FunnelPhase::Qualification => 2,
            FunnelPhase::Opportunity => 3,
            FunnelPhase::Closing => 4,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            FunnelPhase::Prospection => "Prospecção",
            FunnelPhase::Qualification => "Qualificação",
            FunnelPhase::Opportunity => "Oportunidade",
            FunnelPhase::Closing => "Venda (Fechamento)",
        }
    }

    pub fn statuses(self) -> &'static [LegacyStatus] {
        match self {
            FunnelPhase::Prospection => &[LegacyStatus::New, LegacyStatus::Triage],
            FunnelPhase::Qualification => &[LegacyStatus::Qualified],
            FunnelPhase::Opportunity => &[
                LegacyStatus::VisitScheduled,
                LegacyStatus::Proposal,
                LegacyStatus::Negotiation,
            ],
            FunnelPhase::Closing => &[LegacyStatus::Closed],
        }
    }

    /// Questions the agent works through while a deal sits in this phase.
    pub fn questions(self) -> &'static [&'static str] {
        match self {
            FunnelPhase::Prospection => &[
                "Você procura imóvel para moradia ou investimento?",
                "Qual região você tem preferência?",
                "Já conhece algum empreendimento na área?",
                "Qual sua expectativa de preço?",
                "Precisa de vaga? Quantos dormitórios?",
            ],
            FunnelPhase::Qualification => &[
                "Qual sua renda familiar?",
                "Pretende financiar, usar FGTS ou comprar à vista?",
                "Já visitou algum decorado?",
                "Quando pretende se mudar ou investir?",
                "Tem mais alguém na decisão?",
            ],
            FunnelPhase::Opportunity => &[
                "O que pesa mais: localização, metragem ou valor?",
                "Prefere planta compacta ou ampla?",
                "Posso enviar vídeo do decorado?",
                "Quer que eu simule opções de pagamento?",
                "Vamos agendar sua visita?",
            ],
            FunnelPhase::Closing => &[
                "Qual valor consegue de entrada hoje?",
                "Prefere parcelar a entrada?",
                "Podemos formalizar sua proposta?",
                "Preferência: assinatura digital ou presencial?",
                "Envio lista de documentos para adiantar?",
            ],
        }
    }
}

/// Open stages of the funnel in display order.
fn open_stages(stages: &[Stage]) -> Vec<&Stage> {
    let mut open: Vec<&Stage> = stages
        .iter()
        .filter(|s| !s.is_win_stage && !s.is_loss_stage)
        .collect();
    open.sort_by_key(|s| s.order_index);
    open
}

const OPEN_PHASES: [FunnelPhase; 3] = [
    FunnelPhase::Prospection,
    FunnelPhase::Qualification,
    FunnelPhase::Opportunity,
];

// The first open stage is always prospection; the rest spread evenly.
fn bucket(position: usize, len: usize) -> usize {
    let len = len.max(1);
    ((position * OPEN_PHASES.len()).div_ceil(len)).min(OPEN_PHASES.len() - 1)
}

pub fn phase_of(stage: &Stage, stages: &[Stage]) -> Option<FunnelPhase> {
    match stage.kind() {
        StageKind::Lost => None,
        StageKind::Won => Some(FunnelPhase::Closing),
        StageKind::Open | StageKind::Closed => {
            let open = open_stages(stages);
            let position = open.iter().position(|s| s.id == stage.id)?;
            Some(OPEN_PHASES[bucket(position, open.len())])
        }
    }
}

fn looks_disqualified(name: &str) -> bool {
    let name = name.to_lowercase();
    ["desqualif", "não qualif", "nao qualif", "disqualif"]
        .iter()
        .any(|marker| name.contains(marker))
}

pub fn status_for_stage(stage: &Stage, stages: &[Stage]) -> Option<LegacyStatus> {
    if stage.is_loss_stage {
        return Some(if looks_disqualified(&stage.name) {
            LegacyStatus::Disqualified
        } else {
            LegacyStatus::Lost
        });
    }
    let phase = phase_of(stage, stages)?;
    if phase == FunnelPhase::Closing {
        return Some(LegacyStatus::Closed);
    }

    let open = open_stages(stages);
    let in_phase: Vec<&Stage> = open
        .iter()
        .enumerate()
        .filter(|(position, _)| OPEN_PHASES[bucket(*position, open.len())] == phase)
        .map(|(_, s)| *s)
        .collect();
    let index = in_phase.iter().position(|s| s.id == stage.id)?;
    let statuses = phase.statuses();
    let slot = (index * statuses.len() / in_phase.len()).min(statuses.len() - 1);
    Some(statuses[slot])
}

/// Stage a legacy status update should land on.
///
/// Picks the first stage whose derived status matches. Failing that, gated
/// statuses fall back to the first loss stage and the rest to the first stage
/// of the same phase.
pub fn stage_for_status(status: LegacyStatus, stages: &[Stage]) -> Option<&Stage> {
    let mut ordered: Vec<&Stage> = stages.iter().collect();
    ordered.sort_by_key(|s| s.order_index);

    if let Some(exact) = ordered
        .iter()
        .find(|s| status_for_stage(s, stages) == Some(status))
    {
        return Some(*exact);
    }
    if status.is_gated() {
        return ordered.into_iter().find(|s| s.is_loss_stage);
    }
    let phase = status.phase()?;
    ordered
        .into_iter()
        .find(|s| phase_of(s, stages) == Some(phase))
}
