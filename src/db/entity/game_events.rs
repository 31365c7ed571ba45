use sea_orm::entity::prelude::*;

/// Append-only log. The id is a globally monotonic sequence.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "game_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub table_id: Uuid,
    pub game_id: Option<Uuid>,
    pub event_type: String,
    pub details: Json,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poker_tables::Entity",
        from = "Column::TableId",
        to = "super::poker_tables::Column::Id"
    )]
    Table,
}

impl Related<super::poker_tables::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Table.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
