//! Database connection settings and demo data.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use entity::{contact, deal, deal_stage_history, funnel, stage};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set, TransactionTrait};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Shared connection handle.
pub type DbPool = DatabaseConnection;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing (set {0})")]
    MissingUrl(String),
    #[error("invalid {key}: {value}")]
    InvalidSetting { key: &'static str, value: String },
    #[error(transparent)]
    Connect(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Reads `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DbResult<Self> {
        let url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| DbError::MissingUrl("DATABASE_URL".into()))?;
        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(DbError::InvalidSetting {
                    key: "DATABASE_MAX_CONNECTIONS",
                    value: raw,
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            url,
            max_connections,
        })
    }

    fn is_sqlite_memory(&self) -> bool {
        self.url.starts_with("sqlite::memory:") || self.url.contains("mode=memory")
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.url.clone());
        // Every pooled connection to an in-memory SQLite database would see
        // its own empty schema.
        let max = if self.is_sqlite_memory() {
            1
        } else {
            self.max_connections
        };
        options
            .max_connections(max)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);
        options
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let db = Database::connect(settings.connect_options()).await?;
    Ok(db)
}

/// Ids of the rows written by [`seed_demo_pipeline`].
#[derive(Clone, Debug)]
pub struct SeededPipeline {
    pub funnel_id: Uuid,
    pub stage_ids: Vec<Uuid>,
    pub deal_ids: Vec<Uuid>,
}

struct StageSeed {
    name: &'static str,
    color: &'static str,
    is_win: bool,
    is_loss: bool,
}

const STAGES: [StageSeed; 6] = [
    StageSeed { name: "Novo", color: "#3b82f6", is_win: false, is_loss: false },
    StageSeed { name: "Qualificado", color: "#06b6d4", is_win: false, is_loss: false },
    StageSeed { name: "Proposta", color: "#f59e0b", is_win: false, is_loss: false },
    StageSeed { name: "Negociação", color: "#f97316", is_win: false, is_loss: false },
    StageSeed { name: "Vendido", color: "#22c55e", is_win: true, is_loss: false },
    StageSeed { name: "Perdido", color: "#ef4444", is_win: false, is_loss: true },
];

// (deal name, contact first/last, value in reais, stage slot, source, temperature)
const DEALS: [(&str, &str, &str, i64, usize, &str, &str); 5] = [
    ("Apartamento Jardins", "Ana", "Souza", 450_000, 0, "site", "hot"),
    ("Casa Morumbi", "Bruno", "Lima", 1_200_000, 1, "indicacao", "warm"),
    ("Cobertura Moema", "Carla", "Mendes", 2_350_000, 2, "portal", "hot"),
    ("Studio Pinheiros", "Diego", "Rocha", 350_000, 3, "site", "cold"),
    ("Sobrado Butantã", "Elisa", "Prado", 780_000, 4, "portal", "warm"),
];

/// Writes one funnel with its stages, contacts and deals.
pub async fn seed_demo_pipeline(db: &DatabaseConnection) -> DbResult<SeededPipeline> {
    let now = Utc::now().fixed_offset();
    let txn = db.begin().await?;

    let funnel_id = Uuid::new_v4();
    funnel::ActiveModel {
        id: Set(funnel_id),
        name: Set("Funil de Vendas".into()),
        description: Set(Some("Funil padrão de vendas de imóveis".into())),
        is_active: Set(true),
        is_default: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let mut stage_ids = Vec::with_capacity(STAGES.len());
    for (index, seed) in STAGES.iter().enumerate() {
        let id = Uuid::new_v4();
        stage::ActiveModel {
            id: Set(id),
            funnel_id: Set(funnel_id),
            name: Set(seed.name.into()),
            order_index: Set(index as i32),
            is_final_stage: Set(seed.is_win || seed.is_loss),
            is_win_stage: Set(seed.is_win),
            is_loss_stage: Set(seed.is_loss),
            color: Set(Some(seed.color.into())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        stage_ids.push(id);
    }

    let close_date = NaiveDate::from_ymd_opt(2026, 12, 15);
    let mut deal_ids = Vec::with_capacity(DEALS.len());
    for (name, first, last, reais, slot, source, temperature) in DEALS {
        let contact_id = Uuid::new_v4();
        contact::ActiveModel {
            id: Set(contact_id),
            first_name: Set(first.into()),
            last_name: Set(Some(last.into())),
            email: Set(Some(format!("{}@example.com", first.to_lowercase()))),
            phone: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let deal_id = Uuid::new_v4();
        deal::ActiveModel {
            id: Set(deal_id),
            funnel_id: Set(Some(funnel_id)),
            stage_id: Set(Some(stage_ids[slot])),
            contact_id: Set(Some(contact_id)),
            name: Set(name.into()),
            email: Set(None),
            phone: Set(None),
            value_cents: Set(Some(reais * 100)),
            source: Set(Some(source.into())),
            temperature: Set(Some(temperature.into())),
            owner_id: Set(None),
            expected_close_date: Set(close_date),
            lost_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        deal_stage_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            deal_id: Set(deal_id),
            from_stage_id: Set(None),
            to_stage_id: Set(stage_ids[slot]),
            lost_reason: Set(None),
            changed_at: Set(now),
        }
        .insert(&txn)
        .await?;
        deal_ids.push(deal_id);
    }

    txn.commit().await?;
    info!(funnel_id = %funnel_id, deals = deal_ids.len(), "demo pipeline seeded");
    Ok(SeededPipeline {
        funnel_id,
        stage_ids,
        deal_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> DbResult<DatabaseSettings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DatabaseSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn url_is_required() {
        assert!(matches!(settings(&[]), Err(DbError::MissingUrl(_))));
    }

    #[test]
    fn max_connections_defaults_and_parses() {
        let cfg = settings(&[("DATABASE_URL", "postgres://localhost/pipeline")]).unwrap();
        assert_eq!(cfg.max_connections, DEFAULT_MAX_CONNECTIONS);

        let cfg = settings(&[
            ("DATABASE_URL", "postgres://localhost/pipeline"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ])
        .unwrap();
        assert_eq!(cfg.max_connections, 4);

        assert!(matches!(
            settings(&[
                ("DATABASE_URL", "postgres://localhost/pipeline"),
                ("DATABASE_MAX_CONNECTIONS", "zero"),
            ]),
            Err(DbError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn sqlite_memory_is_single_connection() {
        let cfg = DatabaseSettings::new("sqlite::memory:");
        assert!(cfg.is_sqlite_memory());
        assert_eq!(cfg.connect_options().get_max_connections(), Some(1));
    }
}
