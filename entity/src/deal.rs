use sea_orm::prelude::{DateTimeWithTimeZone, *};
use uuid::Uuid;

/// A lead/opportunity row. `stage_id` is the only record of its position in
/// the funnel; `lost_reason` holds a loss-reason code while the deal sits in a
/// loss stage.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "deal")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub funnel_id: Option<Uuid>,
    #[sea_orm(indexed)]
    pub stage_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub value_cents: Option<i64>,
    pub source: Option<String>,
    pub temperature: Option<String>,
    pub owner_id: Option<Uuid>,
    pub expected_close_date: Option<Date>,
    pub lost_reason: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::funnel::Entity",
        from = "Column::FunnelId",
        to = "super::funnel::Column::Id"
    )]
    Funnel,
    #[sea_orm(
        belongs_to = "super::stage::Entity",
        from = "Column::StageId",
        to = "super::stage::Column::Id"
    )]
    Stage,
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id"
    )]
    Contact,
}

impl Related<super::funnel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Funnel.def()
    }
}

impl Related<super::stage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Stage.def()
    }
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
