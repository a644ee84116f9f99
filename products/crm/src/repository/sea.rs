use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use entity::{contact, deal, deal_stage_history, funnel, stage};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use super::{PipelineRepository, RepositoryResult};
use crate::error::RepositoryError;
use crate::loss::LossReason;
use crate::model::{
    ContactRef, Deal, DealPatch, Funnel, NewDeal, Stage, StageChange, StageMove, StageOrder,
    Temperature,
};

/// Repository over the relational schema from the `migration` crate.
#[derive(Clone)]
pub struct SeaOrmRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn contacts_for<C: ConnectionTrait>(
        conn: &C,
        ids: Vec<Uuid>,
    ) -> RepositoryResult<HashMap<Uuid, ContactRef>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = contact::Entity::find()
            .filter(contact::Column::Id.is_in(ids))
            .all(conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.id, contact_from(row)))
            .collect())
    }

    async fn load_deal<C: ConnectionTrait>(conn: &C, deal_id: Uuid) -> RepositoryResult<Option<Deal>> {
        let Some(row) = deal::Entity::find_by_id(deal_id).one(conn).await? else {
            return Ok(None);
        };
        let mut contacts = Self::contacts_for(conn, row.contact_id.into_iter().collect()).await?;
        let contact = row.contact_id.and_then(|id| contacts.remove(&id));
        Ok(Some(deal_from(row, contact)))
    }
}

fn funnel_from(row: funnel::Model) -> Funnel {
    Funnel {
        id: row.id,
        name: row.name,
        description: row.description,
        is_active: row.is_active,
        is_default: row.is_default,
        created_at: row.created_at.with_timezone(&Utc),
        updated_at: row.updated_at.with_timezone(&Utc),
    }
}

fn stage_from(row: stage::Model) -> Stage {
    Stage {
        id: row.id,
        funnel_id: row.funnel_id,
        name: row.name,
        order_index: row.order_index,
        is_final_stage: row.is_final_stage,
        is_win_stage: row.is_win_stage,
        is_loss_stage: row.is_loss_stage,
        color: row.color,
    }
}

fn contact_from(row: contact::Model) -> ContactRef {
    ContactRef {
        id: row.id,
        first_name: row.first_name,
        last_name: row.last_name,
    }
}

fn deal_from(row: deal::Model, contact: Option<ContactRef>) -> Deal {
    Deal {
        id: row.id,
        funnel_id: row.funnel_id,
        stage_id: row.stage_id,
        contact_id: row.contact_id,
        name: row.name,
        email: row.email,
        phone: row.phone,
        value_cents: row.value_cents,
        source: row.source,
        temperature: row.temperature.as_deref().and_then(Temperature::from_code),
        owner_id: row.owner_id,
        expected_close_date: row.expected_close_date,
        lost_reason: row.lost_reason.as_deref().and_then(LossReason::from_code),
        created_at: row.created_at.with_timezone(&Utc),
        updated_at: row.updated_at.with_timezone(&Utc),
        contact,
    }
}

fn change_from(row: deal_stage_history::Model) -> StageChange {
    StageChange {
        id: row.id,
        deal_id: row.deal_id,
        from_stage_id: row.from_stage_id,
        to_stage_id: row.to_stage_id,
        lost_reason: row.lost_reason.as_deref().and_then(LossReason::from_code),
        changed_at: row.changed_at.with_timezone(&Utc),
    }
}

#[async_trait]
impl PipelineRepository for SeaOrmRepository {
    async fn list_funnels(&self, active_only: bool) -> RepositoryResult<Vec<Funnel>> {
        let mut query = funnel::Entity::find();
        if active_only {
            query = query.filter(funnel::Column::IsActive.eq(true));
        }
        let rows = query
            .order_by_desc(funnel::Column::IsDefault)
            .order_by_asc(funnel::Column::Name)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(funnel_from).collect())
    }

    async fn list_stages(&self, funnel_id: Uuid) -> RepositoryResult<Vec<Stage>> {
        let rows = stage::Entity::find()
            .filter(stage::Column::FunnelId.eq(funnel_id))
            .order_by_asc(stage::Column::OrderIndex)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(stage_from).collect())
    }

    async fn find_stage(&self, stage_id: Uuid) -> RepositoryResult<Option<Stage>> {
        let row = stage::Entity::find_by_id(stage_id)
            .one(self.db.as_ref())
            .await?;
        Ok(row.map(stage_from))
    }

    async fn list_deals(&self, funnel_id: Uuid) -> RepositoryResult<Vec<Deal>> {
        let span = info_span!("crm.list_deals", funnel_id = %funnel_id);
        async move {
            let rows = deal::Entity::find()
                .filter(deal::Column::FunnelId.eq(funnel_id))
                .order_by_desc(deal::Column::UpdatedAt)
                .all(self.db.as_ref())
                .await?;
            let contact_ids: Vec<Uuid> = rows.iter().filter_map(|row| row.contact_id).collect();
            let contacts = Self::contacts_for(self.db.as_ref(), contact_ids).await?;
            debug!(count = rows.len(), "deals loaded");
            Ok::<_, RepositoryError>(rows
                .into_iter()
                .map(|row| {
                    let contact = row.contact_id.and_then(|id| contacts.get(&id).cloned());
                    deal_from(row, contact)
                })
                .collect())
        }
        .instrument(span)
        .await
    }

    async fn find_deal(&self, deal_id: Uuid) -> RepositoryResult<Option<Deal>> {
        Self::load_deal(self.db.as_ref(), deal_id).await
    }

    async fn create_deal(&self, input: NewDeal) -> RepositoryResult<Deal> {
        let now = Utc::now().fixed_offset();
        let deal_id = Uuid::new_v4();
        let txn = self.db.begin().await?;

        deal::ActiveModel {
            id: Set(deal_id),
            funnel_id: Set(input.funnel_id),
            stage_id: Set(input.stage_id),
            contact_id: Set(input.contact_id),
            name: Set(input.name),
            email: Set(input.email),
            phone: Set(input.phone),
            value_cents: Set(input.value_cents),
            source: Set(input.source),
            temperature: Set(input.temperature.map(|t| t.as_str().to_string())),
            owner_id: Set(input.owner_id),
            expected_close_date: Set(input.expected_close_date),
            lost_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if let Some(stage_id) = input.stage_id {
            deal_stage_history::ActiveModel {
                id: Set(Uuid::new_v4()),
                deal_id: Set(deal_id),
                from_stage_id: Set(None),
                to_stage_id: Set(stage_id),
                lost_reason: Set(None),
                changed_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        let created = Self::load_deal(&txn, deal_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        txn.commit().await?;
        Ok(created)
    }

    async fn update_deal(&self, deal_id: Uuid, patch: DealPatch) -> RepositoryResult<Deal> {
        let row = deal::Entity::find_by_id(deal_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let mut active = row.into_active_model();
        if let Some(name) = patch.name {
            active.name = Set(name);
        }
        if let Some(email) = patch.email {
            active.email = Set(Some(email));
        }
        if let Some(phone) = patch.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(value) = patch.value_cents {
            active.value_cents = Set(Some(value));
        }
        if let Some(contact_id) = patch.contact_id {
            active.contact_id = Set(Some(contact_id));
        }
        if let Some(source) = patch.source {
            active.source = Set(Some(source));
        }
        if let Some(temperature) = patch.temperature {
            active.temperature = Set(Some(temperature.as_str().to_string()));
        }
        if let Some(owner_id) = patch.owner_id {
            active.owner_id = Set(Some(owner_id));
        }
        if let Some(date) = patch.expected_close_date {
            active.expected_close_date = Set(Some(date));
        }
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(self.db.as_ref()).await?;

        Self::load_deal(self.db.as_ref(), deal_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn move_deal_stage(&self, deal_id: Uuid, mv: StageMove) -> RepositoryResult<Deal> {
        let span = info_span!(
            "crm.move_deal_stage",
            deal_id = %deal_id,
            stage_id = %mv.stage_id
        );
        async move {
            let txn = self.db.begin().await?;
            let row = deal::Entity::find_by_id(deal_id)
                .one(&txn)
                .await?
                .ok_or(RepositoryError::NotFound)?;

            if row.stage_id == Some(mv.stage_id) {
                txn.commit().await?;
                return Self::load_deal(self.db.as_ref(), deal_id)
                    .await?
                    .ok_or(RepositoryError::NotFound);
            }

            let now = Utc::now().fixed_offset();
            let from_stage_id = row.stage_id;
            let reason_code = mv.lost_reason.map(|r| r.code().to_string());

            let mut active = row.into_active_model();
            active.funnel_id = Set(Some(mv.funnel_id));
            active.stage_id = Set(Some(mv.stage_id));
            active.lost_reason = Set(reason_code.clone());
            active.updated_at = Set(now);
            active.update(&txn).await?;

            deal_stage_history::ActiveModel {
                id: Set(Uuid::new_v4()),
                deal_id: Set(deal_id),
                from_stage_id: Set(from_stage_id),
                to_stage_id: Set(mv.stage_id),
                lost_reason: Set(reason_code),
                changed_at: Set(now),
            }
            .insert(&txn)
            .await?;

            txn.commit().await?;
            debug!("stage change committed");

            Self::load_deal(self.db.as_ref(), deal_id)
                .await?
                .ok_or(RepositoryError::NotFound)
        }
        .instrument(span)
        .await
    }

    async fn update_stage_order(&self, order: Vec<StageOrder>) -> RepositoryResult<()> {
        if order.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin().await?;
        let now = Utc::now().fixed_offset();

        // (funnel_id, order_index) is unique: park every row on a negative
        // index first so the final values never collide mid-update.
        for (slot, entry) in order.iter().enumerate() {
            let parked = -(slot as i32) - 1;
            let result = stage::Entity::update_many()
                .col_expr(stage::Column::OrderIndex, Expr::value(parked))
                .filter(stage::Column::Id.eq(entry.id))
                .exec(&txn)
                .await?;
            if result.rows_affected == 0 {
                return Err(RepositoryError::NotFound);
            }
        }
        for entry in &order {
            stage::Entity::update_many()
                .col_expr(stage::Column::OrderIndex, Expr::value(entry.order_index))
                .col_expr(stage::Column::UpdatedAt, Expr::value(now))
                .filter(stage::Column::Id.eq(entry.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn stage_history(&self, deal_id: Uuid) -> RepositoryResult<Vec<StageChange>> {
        let rows = deal_stage_history::Entity::find()
            .filter(deal_stage_history::Column::DealId.eq(deal_id))
            .order_by_desc(deal_stage_history::Column::ChangedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(change_from).collect())
    }
}
