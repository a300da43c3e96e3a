//! Gate array: memory mapping, palette latches and the raster interrupt
//! counter.
//!
//! The gate array sits between the CPU and memory. Reads see the lower
//! ROM over 0x0000..=0x3FFF and the selected upper ROM bank over
//! 0xC000..=0xFFFF while those overlays are enabled; writes always land
//! in RAM underneath. It also counts scanlines to raise the 300 Hz
//! raster interrupt.

use std::collections::HashMap;

use emu_core::Bus;

const RAM_SIZE: usize = 0x10000;

const LOWER_ROM_END: u16 = 0x3FFF;
const UPPER_ROM_START: u16 = 0xC000;

/// Scanlines between raster interrupts.
const INTERRUPT_LINE_COUNT: u8 = 52;

pub struct GateArray {
    ram: Box<[u8; RAM_SIZE]>,
    lower_rom: Vec<u8>,
    upper_roms: HashMap<u8, Vec<u8>>,
    selected_rom: u8,
    lower_rom_enabled: bool,
    upper_rom_enabled: bool,
    /// Screen mode in effect, latched from `mode_requested` at hsync.
    mode: u8,
    mode_requested: u8,
    pens: [u8; 16],
    border: u8,
    selected_pen: u8,
    border_selected: bool,
    line_count: u8,
    /// Scanlines left before the post-vsync counter adjustment.
    line_count_delay: u8,
    interrupt_request: bool,
}

impl GateArray {
    #[must_use]
    pub fn new(lower_rom: Vec<u8>, upper_roms: HashMap<u8, Vec<u8>>) -> Self {
        let mut pens = [0; 16];
        for (index, pen) in pens.iter_mut().enumerate() {
            *pen = index as u8;
        }
        Self {
            ram: Box::new([0; RAM_SIZE]),
            lower_rom,
            upper_roms,
            selected_rom: 0,
            lower_rom_enabled: true,
            upper_rom_enabled: false,
            mode: 1,
            mode_requested: 1,
            pens,
            border: 0,
            selected_pen: 0,
            border_selected: false,
            line_count: 0,
            line_count_delay: 0,
            interrupt_request: false,
        }
    }

    /// Control port write, function decoded from the top two bits.
    pub fn write_port(&mut self, value: u8) {
        match value & 0xC0 {
            0x00 => {
                if value & 0x10 != 0 {
                    self.border_selected = true;
                } else {
                    self.border_selected = false;
                    self.selected_pen = value & 0x0F;
                }
            }
            0x40 => {
                if self.border_selected {
                    self.border = value & 0x1F;
                } else {
                    self.pens[self.selected_pen as usize] = value & 0x1F;
                }
            }
            0x80 => {
                if value & 0x10 != 0 {
                    self.line_count = 0;
                }
                self.lower_rom_enabled = value & 0x04 == 0;
                self.upper_rom_enabled = value & 0x08 == 0;
                self.mode_requested = value & 0x03;
                log::debug!(
                    "gate array: lower rom {}, upper rom {}, mode {}",
                    self.lower_rom_enabled,
                    self.upper_rom_enabled,
                    self.mode_requested
                );
            }
            _ => {}
        }
    }

    /// Upper ROM bank select. Banks without a loaded ROM fall back to
    /// bank 0, as the CPC's ROM decoder does.
    pub fn write_rom_bank(&mut self, value: u8) {
        self.selected_rom = value;
        log::debug!("gate array: upper rom bank {value}");
    }

    /// Hsync falling edge: latch the requested mode and advance the
    /// interrupt counter.
    pub fn end_of_line(&mut self) {
        self.mode = self.mode_requested;
        if self.line_count_delay > 0 {
            self.line_count_delay -= 1;
            // Two scanlines after vsync the counter restarts, but only
            // if it was past halfway, keeping interrupts frame-locked.
            if self.line_count_delay == 0 && self.line_count >= 32 {
                self.line_count = 0;
            }
        } else {
            self.line_count += 1;
            if self.line_count == INTERRUPT_LINE_COUNT {
                self.line_count = 0;
                self.interrupt_request = true;
            }
        }
    }

    /// Vsync leading edge starts the counter adjustment window.
    pub fn vsync_start(&mut self) {
        self.line_count_delay = 2;
    }

    #[must_use]
    pub fn interrupt_requested(&self) -> bool {
        self.interrupt_request
    }

    /// Interrupt acknowledge: drop the request and clear bit 5 of the
    /// counter so the next interrupt cannot arrive early.
    pub fn acknowledge_interrupt(&mut self) {
        self.interrupt_request = false;
        self.line_count &= !0x20;
    }

    #[must_use]
    pub fn mode(&self) -> u8 {
        self.mode
    }

    #[must_use]
    pub fn pen(&self, index: usize) -> u8 {
        self.pens.get(index).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn border(&self) -> u8 {
        self.border
    }

    /// Direct RAM view, bypassing the ROM overlays.
    #[must_use]
    pub fn ram(&self) -> &[u8] {
        &self.ram[..]
    }

    fn upper_rom(&self) -> Option<&Vec<u8>> {
        self.upper_roms
            .get(&self.selected_rom)
            .or_else(|| self.upper_roms.get(&0))
    }
}

impl Bus for GateArray {
    fn read(&mut self, address: u16) -> u8 {
        if self.lower_rom_enabled && address <= LOWER_ROM_END {
            if let Some(&byte) = self.lower_rom.get(address as usize) {
                return byte;
            }
        }
        if self.upper_rom_enabled && address >= UPPER_ROM_START {
            if let Some(rom) = self.upper_rom() {
                if let Some(&byte) = rom.get((address - UPPER_ROM_START) as usize) {
                    return byte;
                }
            }
        }
        self.ram[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.ram[address as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_gate_array() -> GateArray {
        let mut lower = vec![0x11; 0x4000];
        lower[0x0123] = 0xAA;
        let mut basic = vec![0x22; 0x4000];
        basic[0x0456] = 0xBB;
        let mut amsdos = vec![0x33; 0x4000];
        amsdos[0x0789] = 0xCC;
        let mut upper = HashMap::new();
        upper.insert(0, basic);
        upper.insert(7, amsdos);
        GateArray::new(lower, upper)
    }

    #[test]
    fn lower_rom_overlays_reads_but_not_writes() {
        let mut ga = make_gate_array();
        assert_eq!(ga.read(0x0123), 0xAA);
        ga.write(0x0123, 0x55);
        assert_eq!(ga.read(0x0123), 0xAA, "write went to RAM underneath");
        ga.write_port(0x80 | 0x04);
        assert_eq!(ga.read(0x0123), 0x55, "RAM visible once ROM is paged out");
    }

    #[test]
    fn upper_rom_banks_switch() {
        let mut ga = make_gate_array();
        ga.write_port(0x80);
        assert_eq!(ga.read(0xC456), 0xBB, "bank 0 after reset");
        ga.write_rom_bank(7);
        assert_eq!(ga.read(0xC789), 0xCC);
        ga.write_rom_bank(3);
        assert_eq!(ga.read(0xC456), 0xBB, "unloaded banks fall back to 0");
    }

    #[test]
    fn pen_and_border_latches() {
        let mut ga = make_gate_array();
        ga.write_port(0x02);
        ga.write_port(0x40 | 0x14);
        assert_eq!(ga.pen(2), 0x14);
        ga.write_port(0x10);
        ga.write_port(0x40 | 0x0B);
        assert_eq!(ga.border(), 0x0B);
        assert_eq!(ga.pen(2), 0x14, "border write leaves pens alone");
    }

    #[test]
    fn mode_change_waits_for_end_of_line() {
        let mut ga = make_gate_array();
        ga.write_port(0x80 | 0x02);
        assert_eq!(ga.mode(), 1);
        ga.end_of_line();
        assert_eq!(ga.mode(), 2);
    }

    #[test]
    fn interrupt_fires_every_52_lines() {
        let mut ga = make_gate_array();
        for _ in 0..51 {
            ga.end_of_line();
            assert!(!ga.interrupt_requested());
        }
        ga.end_of_line();
        assert!(ga.interrupt_requested());
        ga.acknowledge_interrupt();
        assert!(!ga.interrupt_requested());
    }

    #[test]
    fn acknowledge_clears_counter_bit_5() {
        let mut ga = make_gate_array();
        for _ in 0..40 {
            ga.end_of_line();
        }
        ga.acknowledge_interrupt();
        // 40 & !0x20 = 8, so the next interrupt needs 44 more lines.
        for _ in 0..43 {
            ga.end_of_line();
            assert!(!ga.interrupt_requested());
        }
        ga.end_of_line();
        assert!(ga.interrupt_requested());
    }

    #[test]
    fn vsync_window_resets_a_late_counter() {
        let mut ga = make_gate_array();
        for _ in 0..35 {
            ga.end_of_line();
        }
        ga.vsync_start();
        ga.end_of_line();
        ga.end_of_line();
        ga.acknowledge_interrupt();
        // Counter restarted from 0 at the end of the window.
        for _ in 0..51 {
            ga.end_of_line();
            assert!(!ga.interrupt_requested());
        }
        ga.end_of_line();
        assert!(ga.interrupt_requested());
    }

    #[test]
    fn counter_clear_bit_on_control_port() {
        let mut ga = make_gate_array();
        for _ in 0..30 {
            ga.end_of_line();
        }
        ga.write_port(0x80 | 0x10);
        for _ in 0..51 {
            ga.end_of_line();
            assert!(!ga.interrupt_requested());
        }
        ga.end_of_line();
        assert!(ga.interrupt_requested());
    }
}
