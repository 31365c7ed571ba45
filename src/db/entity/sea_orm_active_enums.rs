use sea_orm::entity::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "user_role")]
pub enum UserRole {
    #[sea_orm(string_value = "player")]
    Player,
    #[sea_orm(string_value = "dealer")]
    Dealer,
}

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "seat_status")]
pub enum SeatStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "all-in")]
    AllIn,
    #[sea_orm(string_value = "folded")]
    Folded,
    #[sea_orm(string_value = "eliminated")]
    Eliminated,
}

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "last_action")]
pub enum LastAction {
    #[sea_orm(string_value = "RAISE")]
    Raise,
    #[sea_orm(string_value = "CALL")]
    Call,
    #[sea_orm(string_value = "CHECK")]
    Check,
    #[sea_orm(string_value = "FOLD")]
    Fold,
}

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "game_state")]
pub enum GameState {
    #[sea_orm(string_value = "DEAL_HOLE_CARDS")]
    DealHoleCards,
    #[sea_orm(string_value = "BETTING")]
    Betting,
    #[sea_orm(string_value = "DEAL_FLOP")]
    DealFlop,
    #[sea_orm(string_value = "DEAL_TURN")]
    DealTurn,
    #[sea_orm(string_value = "DEAL_RIVER")]
    DealRiver,
    #[sea_orm(string_value = "SHOWDOWN")]
    Showdown,
}

#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "device_kind")]
pub enum DeviceKind {
    #[sea_orm(string_value = "scanner")]
    Scanner,
    #[sea_orm(string_value = "display")]
    Display,
}
