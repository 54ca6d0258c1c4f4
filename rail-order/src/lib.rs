pub mod engine;
pub mod memory;
pub mod read_model;
pub mod sweeper;

pub use engine::{ReservationEngine, ReservationPolicy};
pub use memory::{MemoryCatalog, MemoryStore};
pub use read_model::{BookingReadModel, BookingView};
pub use sweeper::{ExpirySweeper, SweepReport};
