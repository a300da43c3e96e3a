//! Intel 8255 programmable peripheral interface, wired the way the CPC
//! uses it: port A carries the sound-chip data bus, port B collects
//! status inputs (vsync on bit 0), and port C drives the sound-chip
//! function lines and the keyboard row select.
//!
//! The chip itself does not know about the sound chip. Transitions on
//! the port C function lines are latched as [`PsgCommand`]s for the
//! machine to collect with [`Ppi::take_psg_command`] and forward.

/// Sound-chip bus function, decoded from port C bits 7:6 (BDIR/BC1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsgFunction {
    Inactive,
    Read,
    Write,
    SelectRegister,
}

impl PsgFunction {
    fn decode(port_c: u8) -> Self {
        match port_c >> 6 {
            0 => Self::Inactive,
            1 => Self::Read,
            2 => Self::Write,
            _ => Self::SelectRegister,
        }
    }
}

/// A completed sound-chip bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsgCommand {
    /// The CPU asked to read; load port A via [`Ppi::set_port_a`].
    Read,
    /// Register data write, carrying the port A value.
    Write(u8),
    /// Register select, carrying the port A value.
    SelectRegister(u8),
}

/// Port B idle value: printer ready, 50 Hz, Amstrad distributor bits.
const PORT_B_DEFAULT: u8 = 0x5A;

pub struct Ppi {
    port_a: u8,
    port_b: u8,
    port_c: u8,
    /// True when the mode word configured port A as an input.
    port_a_input: bool,
    function: PsgFunction,
    pending: Option<PsgCommand>,
    vsync: bool,
}

impl Ppi {
    #[must_use]
    pub fn new() -> Self {
        Self {
            port_a: 0,
            port_b: PORT_B_DEFAULT,
            port_c: 0,
            port_a_input: false,
            function: PsgFunction::Inactive,
            pending: None,
            vsync: false,
        }
    }

    #[must_use]
    pub fn read_port_a(&self) -> u8 {
        self.port_a
    }

    pub fn write_port_a(&mut self, value: u8) {
        self.port_a = value;
    }

    /// Load port A from outside, used when the sound chip answers a read.
    pub fn set_port_a(&mut self, value: u8) {
        self.port_a = value;
    }

    #[must_use]
    pub fn read_port_b(&self) -> u8 {
        self.port_b
    }

    pub fn write_port_b(&mut self, value: u8) {
        self.port_b = value;
        // Bit 0 is an input; the vsync line wins over whatever was written.
        if self.vsync {
            self.port_b |= 0x01;
        }
    }

    #[must_use]
    pub fn read_port_c(&self) -> u8 {
        self.port_c
    }

    pub fn write_port_c(&mut self, value: u8) {
        self.set_port_c(value);
    }

    /// Control register: mode set (bit 7) or port C bit set/reset.
    pub fn write_control(&mut self, value: u8) {
        if value & 0x80 != 0 {
            self.port_a = 0;
            self.port_b = PORT_B_DEFAULT;
            self.set_port_c(0);
            self.port_a_input = value & 0x10 != 0;
            if self.vsync {
                self.port_b |= 0x01;
            }
        } else {
            let bit = (value >> 1) & 0x07;
            let mut port_c = self.port_c & !(1 << bit);
            port_c |= (value & 0x01) << bit;
            self.set_port_c(port_c);
        }
    }

    /// Vsync input line, reflected on port B bit 0.
    pub fn set_vsync(&mut self, level: bool) {
        self.vsync = level;
        if level {
            self.port_b |= 0x01;
        } else {
            self.port_b &= !0x01;
        }
    }

    #[must_use]
    pub fn port_a_is_input(&self) -> bool {
        self.port_a_input
    }

    /// Current function-line state.
    #[must_use]
    pub fn psg_function(&self) -> PsgFunction {
        self.function
    }

    /// Keyboard row select, port C low nibble.
    #[must_use]
    pub fn keyboard_row(&self) -> u8 {
        self.port_c & 0x0F
    }

    /// Collect the transaction latched by the last port C change, if any.
    pub fn take_psg_command(&mut self) -> Option<PsgCommand> {
        self.pending.take()
    }

    fn set_port_c(&mut self, value: u8) {
        self.port_c = value;
        let old = self.function;
        self.function = PsgFunction::decode(value);

        if self.function == PsgFunction::Read {
            self.pending = Some(PsgCommand::Read);
        }
        // Write and select latch on the falling edge back to inactive.
        if self.function == PsgFunction::Inactive && old != PsgFunction::Inactive {
            match old {
                PsgFunction::Write => self.pending = Some(PsgCommand::Write(self.port_a)),
                PsgFunction::SelectRegister => {
                    self.pending = Some(PsgCommand::SelectRegister(self.port_a));
                }
                PsgFunction::Read | PsgFunction::Inactive => {}
            }
        }
    }
}

impl Default for Ppi {
    fn default() -> Self {
        Self::new()
    }
}
