use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::{LastAction, SeatStatus};

/// Unique constraints: `(table_id, seat_number)` and `player_id`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "seats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub table_id: Uuid,
    #[sea_orm(unique)]
    pub player_id: Uuid,
    pub seat_number: i16,
    pub buy_in: i64,
    pub starting_balance: i64,
    pub current_bet: i64,
    /// Ordered card codes, at most two.
    pub cards: Json,
    pub seat_status: SeatStatus,
    pub last_action: Option<LastAction>,
    pub hand_type: Option<String>,
    pub hand_description: Option<String>,
    pub win_amount: Option<i64>,
    pub winning_cards: Json,
    /// Opaque to the engine; owned by the hardware key layer.
    pub card_nonces: Option<Json>,
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
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::PlayerId",
        to = "super::users::Column::Id"
    )]
    Player,
}

impl Related<super::poker_tables::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Table.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Player.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
