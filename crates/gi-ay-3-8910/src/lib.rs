//! General Instrument AY-3-8910 programmable sound generator.
//!
//! Register file and the I/O port A keyboard scan, which is how the CPC
//! reads its keyboard: the 8255 selects a matrix row, and register 14
//! reads that row's key states, active low. Tone and envelope synthesis
//! are not modelled; the registers just hold their programmed values.

/// Valid bits per register. The AY ignores writes to unimplemented bits
/// and reads them back as zero.
const REGISTER_MASKS: [u8; 16] = [
    0xFF, 0x0F, 0xFF, 0x0F, 0xFF, 0x0F, 0x1F, 0xFF, 0x1F, 0x1F, 0x1F, 0xFF, 0xFF, 0x0F, 0xFF,
    0xFF,
];

/// Keyboard port register.
const REG_IO_A: usize = 14;

/// CPC keyboard matrix rows.
const MATRIX_ROWS: usize = 10;

pub struct Psg {
    selected: u8,
    registers: [u8; 16],
    /// Key states per row, one bit per key, 0 = pressed.
    matrix: [u8; MATRIX_ROWS],
    row: usize,
}

impl Psg {
    #[must_use]
    pub fn new() -> Self {
        Self {
            selected: 0,
            registers: [0; 16],
            matrix: [0xFF; MATRIX_ROWS],
            row: 0,
        }
    }

    /// Latch the register address from the data bus.
    pub fn select_register(&mut self, value: u8) {
        self.selected = value & 0x0F;
    }

    /// Write the selected register.
    pub fn write(&mut self, value: u8) {
        let index = self.selected as usize;
        self.registers[index] = value & REGISTER_MASKS[index];
    }

    /// Read the selected register. Register 14 returns the keyboard row
    /// chosen with [`Psg::select_keyboard_row`].
    #[must_use]
    pub fn read(&self) -> u8 {
        if self.selected as usize == REG_IO_A {
            self.matrix.get(self.row).copied().unwrap_or(0xFF)
        } else {
            self.registers[self.selected as usize]
        }
    }

    /// Keyboard row select, driven by the 8255's port C low nibble.
    pub fn select_keyboard_row(&mut self, row: u8) {
        self.row = row as usize;
    }

    /// Press a key: `row` 0..=9, `bit` 0..=7. Pressed keys read as 0.
    pub fn set_key(&mut self, row: usize, bit: u8) {
        if let Some(line) = self.matrix.get_mut(row) {
            *line &= !(1 << (bit & 0x07));
        }
    }

    /// Release a key.
    pub fn clear_key(&mut self, row: usize, bit: u8) {
        if let Some(line) = self.matrix.get_mut(row) {
            *line |= 1 << (bit & 0x07);
        }
    }

    #[must_use]
    pub fn register(&self, index: usize) -> u8 {
        self.registers.get(index).copied().unwrap_or(0)
    }
}

impl Default for Psg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_hold_masked_values() {
        let mut psg = Psg::new();
        psg.select_register(0);
        psg.write(0xAB);
        psg.select_register(1);
        psg.write(0xAB);
        assert_eq!(psg.register(0), 0xAB);
        assert_eq!(psg.register(1), 0x0B, "coarse tone period is 4 bits");

        psg.select_register(8);
        psg.write(0xFF);
        assert_eq!(psg.register(8), 0x1F, "volume is 5 bits");
    }

    #[test]
    fn read_returns_the_selected_register() {
        let mut psg = Psg::new();
        psg.select_register(7);
        psg.write(0x38);
        psg.select_register(2);
        psg.write(0x44);
        assert_eq!(psg.read(), 0x44);
        psg.select_register(7);
        assert_eq!(psg.read(), 0x38);
    }

    #[test]
    fn select_address_uses_four_bits() {
        let mut psg = Psg::new();
        psg.select_register(0x17);
        psg.write(0x38);
        assert_eq!(psg.register(7), 0x38);
    }

    #[test]
    fn keyboard_rows_read_active_low() {
        let mut psg = Psg::new();
        psg.select_register(14);
        psg.select_keyboard_row(8);
        assert_eq!(psg.read(), 0xFF, "nothing pressed");

        // Row 8 bit 3 is the Q key.
        psg.set_key(8, 3);
        assert_eq!(psg.read(), 0xF7);
        psg.select_keyboard_row(5);
        assert_eq!(psg.read(), 0xFF, "other rows unaffected");

        psg.select_keyboard_row(8);
        psg.clear_key(8, 3);
        assert_eq!(psg.read(), 0xFF);
    }

    #[test]
    fn out_of_range_row_reads_as_released() {
        let mut psg = Psg::new();
        psg.select_register(14);
        psg.select_keyboard_row(0x0F);
        assert_eq!(psg.read(), 0xFF);
    }
}
