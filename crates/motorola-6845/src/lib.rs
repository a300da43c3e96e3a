//! Motorola 6845 CRT controller.
//!
//! Register file plus the horizontal and vertical character counters.
//! `tick` advances one character clock; sync pulses, display enable and
//! the refresh address come out through getter methods for the machine
//! to sample.

/// Write masks per register. Unused high bits read back as zero.
const REGISTER_MASKS: [u8; 16] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0x7F, 0x1F, 0x7F, 0x7F, 0x03, 0x1F, 0x1F, 0x1F, 0x3F, 0xFF, 0x3F,
    0xFF,
];

const R0_HORIZ_TOTAL: usize = 0;
const R1_HORIZ_DISPLAYED: usize = 1;
const R2_HSYNC_POS: usize = 2;
const R3_SYNC_WIDTHS: usize = 3;
const R4_VERT_TOTAL: usize = 4;
const R6_VERT_DISPLAYED: usize = 6;
const R9_MAX_RASTER: usize = 9;
const R12_START_HI: usize = 12;
const R13_START_LO: usize = 13;

pub struct Crtc {
    selected: u8,
    registers: [u8; 16],
    hsync: bool,
    vsync: bool,
    display_enable: bool,
    /// Refresh memory address, counts characters within the frame.
    ma: u16,
    /// Raster line within the current character row.
    ra: u8,
    horiz: u8,
    vert: u8,
    hsync_width: u8,
    vsync_width: u8,
    /// MA at the start of the current character row.
    row_address: u16,
    frame_pending: bool,
    row_pending: bool,
}

impl Crtc {
    #[must_use]
    pub fn new() -> Self {
        let mut crtc = Self {
            selected: 0,
            registers: [0; 16],
            hsync: false,
            vsync: false,
            display_enable: false,
            ma: 0,
            ra: 0,
            horiz: 0,
            vert: 0,
            hsync_width: 0,
            vsync_width: 0,
            row_address: 0,
            frame_pending: true,
            row_pending: true,
        };
        // 50 Hz defaults as the CPC firmware would program them.
        crtc.registers[R0_HORIZ_TOTAL] = 63;
        crtc.registers[R1_HORIZ_DISPLAYED] = 40;
        crtc.registers[R2_HSYNC_POS] = 46;
        crtc.registers[R3_SYNC_WIDTHS] = 0x8E;
        crtc.registers[R4_VERT_TOTAL] = 38;
        crtc.registers[R6_VERT_DISPLAYED] = 25;
        crtc.registers[7] = 30;
        crtc.registers[R9_MAX_RASTER] = 7;
        crtc.registers[R12_START_HI] = 0x20;
        crtc
    }

    /// Index port write: choose the register addressed by the data port.
    pub fn select_register(&mut self, value: u8) {
        self.selected = value & 0x1F;
    }

    /// Data port write.
    pub fn write_register(&mut self, value: u8) {
        if let Some(slot) = self.registers.get_mut(self.selected as usize) {
            *slot = value & REGISTER_MASKS[self.selected as usize];
        }
    }

    /// Data port read. Only the cursor and light-pen group reads back;
    /// the timing registers are write-only and return zero.
    #[must_use]
    pub fn read_register(&self) -> u8 {
        if self.selected >= 10 {
            self.registers
                .get(self.selected as usize)
                .copied()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Status port. The type 0 part has no status register.
    #[must_use]
    pub fn read_status(&self) -> u8 {
        0
    }

    #[must_use]
    pub fn register(&self, index: usize) -> u8 {
        self.registers.get(index).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn hsync(&self) -> bool {
        self.hsync
    }

    #[must_use]
    pub fn vsync(&self) -> bool {
        self.vsync
    }

    #[must_use]
    pub fn display_enable(&self) -> bool {
        self.display_enable
    }

    /// Refresh memory address for the current character.
    #[must_use]
    pub fn ma(&self) -> u16 {
        self.ma
    }

    /// Raster address within the character row.
    #[must_use]
    pub fn ra(&self) -> u8 {
        self.ra
    }

    /// Advance one character clock.
    pub fn tick(&mut self) {
        if self.frame_pending {
            self.start_frame();
            return;
        }
        if self.row_pending {
            self.row_pending = false;
        } else {
            self.horiz = self.horiz.wrapping_add(1);
            self.ma = self.ma.wrapping_add(1);
        }

        if self.hsync {
            self.hsync_width += 1;
        }
        if self.horiz == self.registers[R2_HSYNC_POS] {
            self.hsync = true;
        }
        if self.hsync_width == self.registers[R3_SYNC_WIDTHS] & 0x0F {
            self.hsync_width = 0;
            self.hsync = false;
        }

        self.display_enable = self.horiz < self.registers[R1_HORIZ_DISPLAYED]
            && self.vert < self.registers[R6_VERT_DISPLAYED];

        if self.horiz == self.registers[R0_HORIZ_TOTAL] {
            self.end_line();
        }
    }

    fn start_frame(&mut self) {
        self.frame_pending = false;
        self.row_pending = true;
        self.horiz = 0;
        self.vert = 0;
        self.ra = 0;
        self.hsync_width = 0;
        self.vsync_width = 0;
        self.hsync = false;
        self.vsync = false;
        self.row_address =
            u16::from(self.registers[R12_START_HI]) << 8 | u16::from(self.registers[R13_START_LO]);
        self.ma = self.row_address;
        self.display_enable = true;
    }

    fn end_line(&mut self) {
        self.horiz = 0;
        self.row_pending = true;
        if self.vsync {
            self.vsync_width += 1;
            if self.vsync_width == self.registers[R3_SYNC_WIDTHS] >> 4 {
                self.vsync = false;
            }
        }
        if self.ra == self.registers[R9_MAX_RASTER] {
            self.end_character_row();
        } else {
            self.ra += 1;
        }
        self.ma = self.row_address;
    }

    fn end_character_row(&mut self) {
        self.ra = 0;
        self.row_address = self
            .row_address
            .wrapping_add(u16::from(self.registers[R1_HORIZ_DISPLAYED]));
        if self.vert == self.registers[R4_VERT_TOTAL] {
            self.frame_pending = true;
        } else {
            self.vert += 1;
            if self.vert == self.registers[R6_VERT_DISPLAYED] {
                self.vsync = true;
                self.vsync_width = 0;
            }
        }
    }
}

impl Default for Crtc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_n(crtc: &mut Crtc, n: u32) {
        for _ in 0..n {
            crtc.tick();
        }
    }

    #[test]
    fn registers_apply_write_masks() {
        let mut crtc = Crtc::new();
        crtc.select_register(4);
        crtc.write_register(0xFF);
        assert_eq!(crtc.register(4), 0x7F);
        crtc.select_register(8);
        crtc.write_register(0xFF);
        assert_eq!(crtc.register(8), 0x03);
    }

    #[test]
    fn timing_registers_are_write_only() {
        let mut crtc = Crtc::new();
        crtc.select_register(1);
        assert_eq!(crtc.read_register(), 0);
        crtc.select_register(12);
        assert_eq!(crtc.read_register(), 0x20);
    }

    #[test]
    fn select_index_wraps_to_five_bits() {
        let mut crtc = Crtc::new();
        crtc.select_register(0x2C);
        assert_eq!(crtc.read_register(), 0x20, "index 0x2C selects R12");
    }

    #[test]
    fn hsync_pulses_at_position_with_programmed_width() {
        let mut crtc = Crtc::new();
        // First tick starts the frame, second consumes the row-start slot.
        tick_n(&mut crtc, 2);
        let mut high = 0;
        let mut seen = false;
        for _ in 0..64 {
            if crtc.hsync() {
                seen = true;
                high += 1;
            } else {
                assert!(!seen || high == 14, "pulse must be contiguous");
            }
            crtc.tick();
        }
        assert_eq!(high, 14, "width from R3 low nibble");
    }

    #[test]
    fn line_takes_horizontal_total_plus_one_characters() {
        let mut crtc = Crtc::new();
        crtc.tick();
        assert_eq!(crtc.ra(), 0);
        // R0 is 63: 64 characters per scanline.
        tick_n(&mut crtc, 64);
        assert_eq!(crtc.ra(), 1, "next raster line after one scanline");
    }

    #[test]
    fn ma_restarts_from_row_address_each_scanline() {
        let mut crtc = Crtc::new();
        crtc.tick();
        let start = crtc.ma();
        assert_eq!(start, 0x2000, "from R12/R13 defaults");
        tick_n(&mut crtc, 10);
        assert_eq!(crtc.ma(), start + 9);
        tick_n(&mut crtc, 54);
        assert_eq!(crtc.ma(), start, "same row, same address");
        // After the full character row (R9+1 scanlines), MA advances by R1.
        tick_n(&mut crtc, 7 * 64);
        assert_eq!(crtc.ma(), start + 40);
    }

    #[test]
    fn vsync_starts_at_vertical_displayed_row() {
        let mut crtc = Crtc::new();
        crtc.tick();
        // 25 character rows of 8 scanlines of 64 characters.
        tick_n(&mut crtc, 25 * 8 * 64);
        let mut guard = 0;
        while !crtc.vsync() {
            crtc.tick();
            guard += 1;
            assert!(guard < 128, "vsync must rise during row 25");
        }
        // Width is R3 high nibble: 8 scanlines.
        tick_n(&mut crtc, 8 * 64);
        assert!(!crtc.vsync());
    }

    #[test]
    fn display_enable_tracks_both_counters() {
        let mut crtc = Crtc::new();
        tick_n(&mut crtc, 2);
        assert!(crtc.display_enable());
        tick_n(&mut crtc, 40);
        assert!(!crtc.display_enable(), "past R1 on the line");
    }
}
