use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::GameState;

/// At most one game per table has `is_completed = false`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "games")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub table_id: Uuid,
    pub state: GameState,
    pub is_completed: bool,
    pub dealer_button_seat_id: Option<Uuid>,
    pub assigned_seat_id: Option<Uuid>,
    pub community_cards: Json,
    pub pot_total: i64,
    pub bet_count: i32,
    pub required_bet_count: i32,
    pub effective_small_blind: i64,
    pub effective_big_blind: i64,
    pub turn_start_time: Option<DateTimeUtc>,
    pub side_pot_details: Option<Json>,
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
