mod clock;
mod mem_store;
mod stubs;

pub use clock::ManualClock;
pub use mem_store::{MemHandle, MemStore};
pub use stubs::*;
