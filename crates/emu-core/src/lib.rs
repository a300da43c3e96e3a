//! Core traits and types for cycle-accurate emulation.
//!
//! Everything ticks at the master crystal frequency. All component timing
//! derives from this. No exceptions.

mod bus;
mod clock;
mod iobus;
mod ticks;

pub use bus::{Bus, SimpleBus};
pub use clock::MasterClock;
pub use iobus::{IoBus, IoPort};
pub use ticks::Ticks;
