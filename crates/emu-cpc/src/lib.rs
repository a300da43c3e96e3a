//! Amstrad CPC emulator.
//!
//! Composes the Z80 core with the CPC chipset: the gate array (memory
//! mapping, palette, raster interrupts), the 6845 CRTC for video
//! timing, the 8255 PPI bridging the keyboard and sound chip, the
//! AY-3-8910 register file, and the uPD765 floppy controller. Devices
//! hang off a partially decoded I/O bus exactly as the hardware wires
//! them.

mod bus;
mod config;
mod cpc;
mod gate_array;
mod ports;

pub use bus::CpcBus;
pub use config::CpcConfig;
pub use cpc::Cpc;
pub use gate_array::GateArray;
