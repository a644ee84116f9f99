use sea_orm::prelude::{DateTimeWithTimeZone, *};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "stage")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub funnel_id: Uuid,
    pub name: String,
    pub order_index: i32,
    pub is_final_stage: bool,
    pub is_win_stage: bool,
    pub is_loss_stage: bool,
    pub color: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::funnel::Entity",
        from = "Column::FunnelId",
        to = "super::funnel::Column::Id",
        on_delete = "Cascade"
    )]
    Funnel,
}

impl Related<super::funnel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Funnel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
