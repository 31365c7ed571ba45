pub mod game_events;
pub mod games;
pub mod pi_devices;
pub mod poker_tables;
pub mod sea_orm_active_enums;
pub mod seats;
pub mod users;
