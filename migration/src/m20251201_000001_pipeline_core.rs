use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Funnel {
    Table,
    Id,
    Name,
    Description,
    IsActive,
    IsDefault,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Stage {
    Table,
    Id,
    FunnelId,
    Name,
    OrderIndex,
    IsFinalStage,
    IsWinStage,
    IsLossStage,
    Color,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Contact {
    Table,
    Id,
    FirstName,
    LastName,
    Email,
    Phone,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Deal {
    Table,
    Id,
    FunnelId,
    StageId,
    ContactId,
    Name,
    Email,
    Phone,
    ValueCents,
    Source,
    Temperature,
    OwnerId,
    ExpectedCloseDate,
    LostReason,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Funnel::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Funnel::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Funnel::Name).string_len(120).not_null())
                    .col(ColumnDef::new(Funnel::Description).text())
                    .col(
                        ColumnDef::new(Funnel::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Funnel::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Funnel::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Funnel::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Stage::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Stage::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Stage::FunnelId).uuid().not_null())
                    .col(ColumnDef::new(Stage::Name).string_len(80).not_null())
                    .col(ColumnDef::new(Stage::OrderIndex).integer().not_null())
                    .col(
                        ColumnDef::new(Stage::IsFinalStage)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Stage::IsWinStage)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Stage::IsLossStage)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Stage::Color).string_len(32))
                    .col(
                        ColumnDef::new(Stage::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Stage::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stage_funnel")
                            .from(Stage::Table, Stage::FunnelId)
                            .to(Funnel::Table, Funnel::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Column order is unique per funnel; reorders rewrite indexes in two passes.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stage_funnel_order")
                    .table(Stage::Table)
                    .col(Stage::FunnelId)
                    .col(Stage::OrderIndex)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Contact::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Contact::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Contact::FirstName).string_len(120).not_null())
                    .col(ColumnDef::new(Contact::LastName).string_len(120))
                    .col(ColumnDef::new(Contact::Email).string_len(255))
                    .col(ColumnDef::new(Contact::Phone).string_len(40))
                    .col(
                        ColumnDef::new(Contact::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Contact::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Deal::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Deal::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Deal::FunnelId).uuid())
                    .col(ColumnDef::new(Deal::StageId).uuid())
                    .col(ColumnDef::new(Deal::ContactId).uuid())
                    .col(ColumnDef::new(Deal::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Deal::Email).string_len(255))
                    .col(ColumnDef::new(Deal::Phone).string_len(40))
                    .col(ColumnDef::new(Deal::ValueCents).big_integer())
                    .col(ColumnDef::new(Deal::Source).string_len(40))
                    .col(ColumnDef::new(Deal::Temperature).string_len(8))
                    .col(ColumnDef::new(Deal::OwnerId).uuid())
                    .col(ColumnDef::new(Deal::ExpectedCloseDate).date())
                    .col(ColumnDef::new(Deal::LostReason).string_len(32))
                    .col(
                        ColumnDef::new(Deal::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Deal::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deal_funnel")
                            .from(Deal::Table, Deal::FunnelId)
                            .to(Funnel::Table, Funnel::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deal_stage")
                            .from(Deal::Table, Deal::StageId)
                            .to(Stage::Table, Stage::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deal_contact")
                            .from(Deal::Table, Deal::ContactId)
                            .to(Contact::Table, Contact::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deal_funnel_updated")
                    .table(Deal::Table)
                    .col(Deal::FunnelId)
                    .col(Deal::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deal_stage")
                    .table(Deal::Table)
                    .col(Deal::StageId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Deal::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contact::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Stage::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Funnel::Table).if_exists().to_owned())
            .await
    }
}
