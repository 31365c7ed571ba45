pub mod betting;
pub mod coordinator;
pub mod hand;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use betting::BetAction;
pub use coordinator::{Caller, CreateTableParams, TableAction, TableCoordinator};
pub use snapshot::TableView;
