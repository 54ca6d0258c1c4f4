pub mod inventory;
pub mod ledger;

pub use inventory::{HoldId, InventoryError, SeatHold, SeatInventory};
pub use ledger::InventoryLedger;
