//! I/O port bus with partial address decoding.
//!
//! Eight-bit machines rarely decoded the full 16-bit port number; each
//! device compared only a handful of address lines. A device registered
//! with `(mask, address)` responds to every port where
//! `port & mask == address`, so a single port number can select several
//! devices at once. Writes fan out to all of them; reads take the value
//! of the last device registered, which is how the real shared data bus
//! resolved contention on these machines.

use std::cell::RefCell;
use std::rc::Rc;

/// A single device-side I/O port.
///
/// Devices expose one implementation per hardware port they decode.
/// `read` takes `&mut self` because reads have side effects on real
/// hardware (FDC data reads advance the transfer, for one).
pub trait IoPort {
    fn write(&mut self, value: u8);
    fn read(&mut self) -> u8;
}

/// Shared handle to a port, so the machine can keep its own reference
/// to the owning device while the bus holds the port.
pub type PortHandle = Rc<RefCell<dyn IoPort>>;

struct Connection {
    mask: u16,
    address: u16,
    port: PortHandle,
}

/// The I/O address space: `select` a port number, then `read`/`write`.
///
/// Mirrors the two-phase bus cycle of the hardware, where the address
/// lines settle before the data strobe.
pub struct IoBus {
    connections: Vec<Connection>,
    selected: Vec<usize>,
}

impl IoBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Vec::new(),
            selected: Vec::new(),
        }
    }

    /// Attach a port that decodes `port_number & mask == address`.
    pub fn connect(&mut self, mask: u16, address: u16, port: PortHandle) {
        self.connections.push(Connection {
            mask,
            address,
            port,
        });
    }

    /// Drive the address lines: activate every matching port.
    pub fn select(&mut self, port_number: u16) {
        self.selected.clear();
        for (index, conn) in self.connections.iter().enumerate() {
            if port_number & conn.mask == conn.address {
                self.selected.push(index);
            }
        }
    }

    /// Write to every selected port.
    pub fn write(&mut self, value: u8) {
        for &index in &self.selected {
            self.connections[index].port.borrow_mut().write(value);
        }
    }

    /// Read from every selected port; the last one registered wins.
    ///
    /// Returns 0xFF (floating bus) when nothing is selected.
    pub fn read(&mut self) -> u8 {
        let mut value = 0xFF;
        for &index in &self.selected {
            value = self.connections[index].port.borrow_mut().read();
        }
        value
    }
}

impl Default for IoBus {
    fn default() -> Self {
        Self::new()
    }
}
