//! NEC uPD765 floppy disk controller.
//!
//! The controller is driven through three CPU-visible registers: the
//! main status register, the data register, and (on machines that wire
//! it up) a motor control latch. Commands arrive as multi-byte writes
//! to the data register; the controller then moves through command,
//! execution and result phases, with the main status register telling
//! the CPU which direction the data register currently flows.
//!
//! Seeks take real time: `tick` must be called regularly, and a seek or
//! recalibrate completes only after the head has had time to step,
//! raising the interrupt line when it lands.

pub mod dsk;

pub use dsk::{DskError, DskImage};

/// Request for Master: the data register is ready for a transfer.
const MSR_RQM: u8 = 0x80;
/// Data direction: set when the controller has bytes for the CPU.
const MSR_DIO: u8 = 0x40;
/// Execution mode, set during non-DMA data transfers.
const MSR_EXM: u8 = 0x20;
/// Controller busy: a command is in progress.
const MSR_CB: u8 = 0x10;

/// ST0 seek-end bit.
const ST0_SEEK_END: u8 = 0x20;
/// ST0 abnormal-termination code.
const ST0_ABNORMAL: u8 = 0x40;
/// ST0 not-ready bit.
const ST0_NOT_READY: u8 = 0x08;
/// ST0 value reported for an invalid command.
const ST0_INVALID: u8 = 0x80;

/// ST1 no-data: the requested sector ID was not found.
const ST1_NO_DATA: u8 = 0x04;

/// ST3 ready and track-0 bits for SENSE DRIVE STATUS.
const ST3_READY: u8 = 0x20;
const ST3_TRACK0: u8 = 0x10;

const CMD_READ_DATA: u8 = 0x06;
const CMD_WRITE_DATA: u8 = 0x05;
const CMD_RECALIBRATE: u8 = 0x07;
const CMD_SENSE_INTERRUPT: u8 = 0x08;
const CMD_SPECIFY: u8 = 0x03;
const CMD_SENSE_DRIVE: u8 = 0x04;
const CMD_READ_ID: u8 = 0x0A;
const CMD_SEEK: u8 = 0x0F;

/// Ticks per cylinder stepped. At the 1 MHz peripheral clock this is
/// about 1 ms per step, in the range real drives took.
const STEP_TICKS: u32 = 1000;

const DRIVES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Command,
    Execution,
    Result,
}

/// Floppy disk controller with up to two disk images inserted.
pub struct Upd765 {
    phase: Phase,
    command: Vec<u8>,
    command_len: usize,
    result: Vec<u8>,
    result_index: usize,
    data: Vec<u8>,
    data_index: usize,
    /// True when the execution phase flows CPU to controller.
    writing: bool,
    st0: u8,
    st1: u8,
    st2: u8,
    /// Present cylinder number per drive.
    pcn: [u8; DRIVES],
    seek_target: u8,
    seek_drive: usize,
    seek_countdown: u32,
    motor_on: bool,
    interrupt_pending: bool,
    disks: [Option<DskImage>; 2],
}

impl Upd765 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            command: Vec::new(),
            command_len: 0,
            result: Vec::new(),
            result_index: 0,
            data: Vec::new(),
            data_index: 0,
            writing: false,
            st0: 0,
            st1: 0,
            st2: 0,
            pcn: [0; DRIVES],
            seek_target: 0,
            seek_drive: 0,
            seek_countdown: 0,
            motor_on: false,
            interrupt_pending: false,
            disks: [None, None],
        }
    }

    /// Insert a disk image into drive 0 or 1.
    pub fn insert_disk(&mut self, drive: usize, image: DskImage) {
        if drive < self.disks.len() {
            self.disks[drive] = Some(image);
        }
    }

    pub fn eject_disk(&mut self, drive: usize) {
        if drive < self.disks.len() {
            self.disks[drive] = None;
        }
    }

    /// Main status register. Never blocks: RQM reflects which phase the
    /// controller is in.
    #[must_use]
    pub fn read_msr(&self) -> u8 {
        let mut msr = 0;
        if self.seek_countdown > 0 {
            msr |= 1 << self.seek_drive;
        }
        match self.phase {
            Phase::Idle => msr | MSR_RQM,
            Phase::Command => msr | MSR_RQM | MSR_CB,
            Phase::Execution => {
                let dio = if self.writing { 0 } else { MSR_DIO };
                msr | MSR_RQM | MSR_EXM | MSR_CB | dio
            }
            Phase::Result => msr | MSR_RQM | MSR_DIO | MSR_CB,
        }
    }

    /// Read the data register.
    pub fn read_data(&mut self) -> u8 {
        match self.phase {
            Phase::Execution if !self.writing => {
                let byte = self.data.get(self.data_index).copied().unwrap_or(0xFF);
                self.data_index += 1;
                if self.data_index >= self.data.len() {
                    self.enter_result_phase();
                }
                byte
            }
            Phase::Result => {
                let byte = self.result.get(self.result_index).copied().unwrap_or(0xFF);
                self.result_index += 1;
                if self.result_index >= self.result.len() {
                    self.phase = Phase::Idle;
                }
                byte
            }
            _ => 0xFF,
        }
    }

    /// Write the data register: command bytes or execution-phase data.
    pub fn write_data(&mut self, value: u8) {
        match self.phase {
            Phase::Idle => {
                self.command.clear();
                self.command.push(value);
                self.command_len = command_length(value);
                if self.command_len <= 1 {
                    self.start_command();
                } else {
                    self.phase = Phase::Command;
                }
            }
            Phase::Command => {
                self.command.push(value);
                if self.command.len() >= self.command_len {
                    self.start_command();
                }
            }
            Phase::Execution if self.writing => {
                if self.data_index < self.data.len() {
                    self.data[self.data_index] = value;
                    self.data_index += 1;
                }
                if self.data_index >= self.data.len() {
                    self.finish_write();
                }
            }
            _ => {}
        }
    }

    /// Motor control latch: bit 0 spins both drives up or down.
    pub fn write_motor(&mut self, value: u8) {
        self.motor_on = value & 0x01 != 0;
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    /// Advance the head stepper by one peripheral clock tick.
    pub fn tick(&mut self) {
        if self.seek_countdown == 0 {
            return;
        }
        self.seek_countdown -= 1;
        if self.seek_countdown == 0 {
            self.pcn[self.seek_drive] = self.seek_target;
            self.st0 = ST0_SEEK_END | self.seek_drive as u8;
            self.interrupt_pending = true;
        }
    }

    #[must_use]
    pub fn interrupt_pending(&self) -> bool {
        self.interrupt_pending
    }

    /// Read and clear the interrupt line.
    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt_pending)
    }

    fn start_command(&mut self) {
        log::debug!("fdc command {:02X?}", self.command);
        match self.command[0] & 0x1F {
            CMD_SPECIFY => {
                // Step-rate and head timings are not modelled.
                self.phase = Phase::Idle;
            }
            CMD_SENSE_DRIVE => self.sense_drive_status(),
            CMD_SENSE_INTERRUPT => self.sense_interrupt_status(),
            CMD_RECALIBRATE => self.begin_seek(0),
            CMD_SEEK => self.begin_seek(self.command[2]),
            CMD_READ_ID => self.read_id(),
            CMD_READ_DATA => self.read_data_command(),
            CMD_WRITE_DATA => self.write_data_command(),
            _ => {
                self.st0 = ST0_INVALID;
                self.set_result(&[self.st0]);
            }
        }
    }

    fn sense_drive_status(&mut self) {
        let drive = (self.command[1] & 0x03) as usize;
        let mut st3 = self.command[1] & 0x07;
        if self.drive_ready(drive) {
            st3 |= ST3_READY;
        }
        if self.pcn[drive] == 0 {
            st3 |= ST3_TRACK0;
        }
        self.set_result(&[st3]);
    }

    fn sense_interrupt_status(&mut self) {
        if self.interrupt_pending {
            self.interrupt_pending = false;
            let drive = (self.st0 & 0x03) as usize;
            let st0 = self.st0;
            let pcn = self.pcn[drive];
            self.set_result(&[st0, pcn]);
        } else {
            self.set_result(&[ST0_INVALID]);
        }
    }

    fn begin_seek(&mut self, cylinder: u8) {
        let drive = (self.command[1] & 0x03) as usize;
        self.seek_drive = drive;
        self.seek_target = cylinder;
        let distance = u32::from(self.pcn[drive].abs_diff(cylinder));
        // A seek to the current cylinder still completes, on the next tick.
        self.seek_countdown = (distance * STEP_TICKS).max(1);
        self.phase = Phase::Idle;
    }

    fn read_id(&mut self) {
        let drive = (self.command[1] & 0x03) as usize;
        let head = (self.command[1] >> 2) & 0x01;
        if !self.drive_ready(drive) {
            self.fail_not_ready(drive);
            return;
        }
        let cylinder = self.pcn[drive];
        let id = self.disks[drive.min(1)]
            .as_ref()
            .and_then(|disk| disk.track(cylinder, head))
            .and_then(|track| track.sectors.first())
            .map(|s| (s.c, s.h, s.r, s.n));
        match id {
            Some((c, h, r, n)) => {
                self.st0 = self.command[1] & 0x07;
                let result = [self.st0, 0, 0, c, h, r, n];
                self.set_result(&result);
            }
            None => self.fail_no_data(drive),
        }
    }

    /// READ DATA: collect every sector from R through EOT into the data
    /// buffer, then stream it out through the data register.
    fn read_data_command(&mut self) {
        let drive = (self.command[1] & 0x03) as usize;
        if !self.drive_ready(drive) {
            self.fail_not_ready(drive);
            return;
        }
        let head = self.command[3];
        let first = self.command[4];
        let last = self.command[6];

        self.data.clear();
        let cylinder = self.pcn[drive];
        let mut found_any = false;
        if let Some(disk) = self.disks[drive.min(1)].as_ref() {
            if let Some(track) = disk.track(cylinder, head) {
                for r in first..=last {
                    if let Some(sector) = track.sector(r) {
                        self.data.extend_from_slice(&sector.data);
                        found_any = true;
                    } else {
                        break;
                    }
                }
            }
        }
        if !found_any {
            self.fail_no_data(drive);
            return;
        }
        self.data_index = 0;
        self.writing = false;
        self.st0 = self.command[1] & 0x07;
        self.st1 = 0;
        self.st2 = 0;
        self.phase = Phase::Execution;
    }

    /// WRITE DATA: size the buffer from the sectors R through EOT, accept
    /// that many bytes, then commit them back to the disk image.
    fn write_data_command(&mut self) {
        let drive = (self.command[1] & 0x03) as usize;
        if !self.drive_ready(drive) {
            self.fail_not_ready(drive);
            return;
        }
        let head = self.command[3];
        let first = self.command[4];
        let last = self.command[6];

        let cylinder = self.pcn[drive];
        let mut total = 0;
        if let Some(disk) = self.disks[drive.min(1)].as_ref() {
            if let Some(track) = disk.track(cylinder, head) {
                for r in first..=last {
                    match track.sector(r) {
                        Some(sector) => total += sector.data.len(),
                        None => break,
                    }
                }
            }
        }
        if total == 0 {
            self.fail_no_data(drive);
            return;
        }
        self.data = vec![0; total];
        self.data_index = 0;
        self.writing = true;
        self.st0 = self.command[1] & 0x07;
        self.st1 = 0;
        self.st2 = 0;
        self.phase = Phase::Execution;
    }

    fn finish_write(&mut self) {
        let drive = (self.command[1] & 0x03) as usize;
        let head = self.command[3];
        let first = self.command[4];
        let last = self.command[6];
        let cylinder = self.pcn[drive];

        let mut offset = 0;
        if let Some(disk) = self.disks[drive.min(1)].as_mut() {
            if let Some(track) = disk.track_mut(cylinder, head) {
                for r in first..=last {
                    let Some(sector) = track.sector_mut(r) else {
                        break;
                    };
                    let len = sector.data.len();
                    if offset + len > self.data.len() {
                        break;
                    }
                    sector.data.copy_from_slice(&self.data[offset..offset + len]);
                    offset += len;
                }
            }
        }
        self.enter_result_phase();
    }

    fn enter_result_phase(&mut self) {
        let result = [
            self.st0,
            self.st1,
            self.st2,
            self.command.get(2).copied().unwrap_or(0),
            self.command.get(3).copied().unwrap_or(0),
            self.command.get(4).copied().unwrap_or(0),
            self.command.get(5).copied().unwrap_or(0),
        ];
        self.interrupt_pending = true;
        self.set_result(&result);
    }

    fn fail_not_ready(&mut self, drive: usize) {
        self.st0 = ST0_ABNORMAL | ST0_NOT_READY | drive as u8;
        self.st1 = 0;
        self.st2 = 0;
        let result = [self.st0, self.st1, self.st2, 0, 0, 0, 0];
        self.interrupt_pending = true;
        self.set_result(&result);
    }

    fn fail_no_data(&mut self, drive: usize) {
        self.st0 = ST0_ABNORMAL | drive as u8;
        self.st1 = ST1_NO_DATA;
        self.st2 = 0;
        let result = [self.st0, self.st1, self.st2, 0, 0, 0, 0];
        self.interrupt_pending = true;
        self.set_result(&result);
    }

    fn drive_ready(&self, drive: usize) -> bool {
        self.motor_on && drive < self.disks.len() && self.disks[drive].is_some()
    }

    fn set_result(&mut self, bytes: &[u8]) {
        self.result.clear();
        self.result.extend_from_slice(bytes);
        self.result_index = 0;
        self.phase = Phase::Result;
    }
}

impl Default for Upd765 {
    fn default() -> Self {
        Self::new()
    }
}

/// Total command length in bytes, including the opcode byte.
fn command_length(opcode: u8) -> usize {
    match opcode & 0x1F {
        CMD_SPECIFY | CMD_SEEK => 3,
        CMD_SENSE_DRIVE | CMD_RECALIBRATE | CMD_READ_ID => 2,
        CMD_SENSE_INTERRUPT => 1,
        CMD_READ_DATA | CMD_WRITE_DATA => 9,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fdc_with_disk(sector_ids: &[u8]) -> Upd765 {
        let raw = dsk::test_image(sector_ids, 0xE5);
        let image = DskImage::from_bytes(&raw).expect("test image parses");
        let mut fdc = Upd765::new();
        fdc.insert_disk(0, image);
        fdc.write_motor(0x01);
        fdc
    }

    fn send_command(fdc: &mut Upd765, bytes: &[u8]) {
        for &b in bytes {
            fdc.write_data(b);
        }
    }

    fn drain_result(fdc: &mut Upd765) -> Vec<u8> {
        let mut result = Vec::new();
        while fdc.read_msr() & MSR_CB != 0 && fdc.read_msr() & MSR_DIO != 0 {
            result.push(fdc.read_data());
        }
        result
    }

    fn run_seek_to_completion(fdc: &mut Upd765) {
        let mut guard = 0;
        while !fdc.interrupt_pending() {
            fdc.tick();
            guard += 1;
            assert!(guard < 200_000, "seek never completed");
        }
    }

    #[test]
    fn idle_controller_is_ready_for_commands() {
        let fdc = Upd765::new();
        assert_eq!(fdc.read_msr(), MSR_RQM);
    }

    #[test]
    fn specify_completes_without_result_phase() {
        let mut fdc = Upd765::new();
        send_command(&mut fdc, &[0x03, 0xAF, 0x03]);
        assert_eq!(fdc.read_msr(), MSR_RQM);
        assert!(!fdc.interrupt_pending());
    }

    #[test]
    fn invalid_command_reports_st0_80() {
        let mut fdc = Upd765::new();
        fdc.write_data(0x1F);
        assert_eq!(drain_result(&mut fdc), vec![0x80]);
    }

    #[test]
    fn recalibrate_steps_home_and_interrupts() {
        let mut fdc = make_fdc_with_disk(&[0xC1]);
        send_command(&mut fdc, &[0x0F, 0x00, 0x05]);
        run_seek_to_completion(&mut fdc);
        send_command(&mut fdc, &[0x08]);
        assert_eq!(drain_result(&mut fdc), vec![0x20, 5]);

        send_command(&mut fdc, &[0x07, 0x00]);
        // Drive-busy bit shows in the MSR while the head steps.
        assert_eq!(fdc.read_msr() & 0x01, 0x01);
        run_seek_to_completion(&mut fdc);
        send_command(&mut fdc, &[0x08]);
        assert_eq!(drain_result(&mut fdc), vec![0x20, 0]);
    }

    #[test]
    fn seek_takes_time_proportional_to_distance() {
        let mut fdc = make_fdc_with_disk(&[0xC1]);
        send_command(&mut fdc, &[0x0F, 0x00, 0x03]);
        for _ in 0..3 * STEP_TICKS - 1 {
            fdc.tick();
        }
        assert!(!fdc.interrupt_pending());
        fdc.tick();
        assert!(fdc.take_interrupt());
        assert!(!fdc.interrupt_pending());
    }

    #[test]
    fn sense_interrupt_without_pending_is_invalid() {
        let mut fdc = Upd765::new();
        send_command(&mut fdc, &[0x08]);
        assert_eq!(drain_result(&mut fdc), vec![0x80]);
    }

    #[test]
    fn sense_drive_status_reports_ready_and_track0() {
        let mut fdc = make_fdc_with_disk(&[0xC1]);
        send_command(&mut fdc, &[0x04, 0x00]);
        assert_eq!(drain_result(&mut fdc), vec![ST3_READY | ST3_TRACK0]);
    }

    #[test]
    fn read_id_returns_first_sector_id() {
        let mut fdc = make_fdc_with_disk(&[0xC1, 0xC6]);
        send_command(&mut fdc, &[0x4A, 0x00]);
        let result = drain_result(&mut fdc);
        assert_eq!(result, vec![0x00, 0x00, 0x00, 0, 0, 0xC1, 2]);
    }

    #[test]
    fn read_data_streams_one_sector() {
        let mut fdc = make_fdc_with_disk(&[0xC1, 0xC2]);
        send_command(
            &mut fdc,
            &[0x46, 0x00, 0x00, 0x00, 0xC2, 0x02, 0xC2, 0x2A, 0xFF],
        );
        assert_eq!(
            fdc.read_msr(),
            MSR_RQM | MSR_DIO | MSR_EXM | MSR_CB,
            "execution phase, controller to CPU"
        );
        let mut bytes = Vec::new();
        for _ in 0..512 {
            bytes.push(fdc.read_data());
        }
        assert_eq!(bytes[0], 0xA1);
        assert!(bytes[1..].iter().all(|&b| b == 0xE5));

        let result = drain_result(&mut fdc);
        assert_eq!(result.len(), 7);
        assert_eq!(result[0], 0x00);
        assert!(fdc.take_interrupt());
        assert_eq!(fdc.read_msr(), MSR_RQM);
    }

    #[test]
    fn read_data_spans_sectors_up_to_eot() {
        let mut fdc = make_fdc_with_disk(&[0xC1, 0xC2, 0xC3]);
        send_command(
            &mut fdc,
            &[0x46, 0x00, 0x00, 0x00, 0xC1, 0x02, 0xC3, 0x2A, 0xFF],
        );
        let mut bytes = Vec::new();
        while fdc.read_msr() & MSR_EXM != 0 {
            bytes.push(fdc.read_data());
        }
        assert_eq!(bytes.len(), 3 * 512);
        assert_eq!(bytes[0], 0xA0);
        assert_eq!(bytes[512], 0xA1);
        assert_eq!(bytes[1024], 0xA2);
    }

    #[test]
    fn read_data_missing_sector_fails_with_no_data() {
        let mut fdc = make_fdc_with_disk(&[0xC1]);
        send_command(
            &mut fdc,
            &[0x46, 0x00, 0x00, 0x00, 0x99, 0x02, 0x99, 0x2A, 0xFF],
        );
        let result = drain_result(&mut fdc);
        assert_eq!(result[0], ST0_ABNORMAL);
        assert_eq!(result[1], ST1_NO_DATA);
    }

    #[test]
    fn read_data_with_motor_off_is_not_ready() {
        let mut fdc = make_fdc_with_disk(&[0xC1]);
        fdc.write_motor(0x00);
        send_command(
            &mut fdc,
            &[0x46, 0x00, 0x00, 0x00, 0xC1, 0x02, 0xC1, 0x2A, 0xFF],
        );
        let result = drain_result(&mut fdc);
        assert_eq!(result[0], ST0_ABNORMAL | ST0_NOT_READY);
    }

    #[test]
    fn write_data_commits_bytes_to_the_image() {
        let mut fdc = make_fdc_with_disk(&[0xC1]);
        send_command(
            &mut fdc,
            &[0x45, 0x00, 0x00, 0x00, 0xC1, 0x02, 0xC1, 0x2A, 0xFF],
        );
        assert_eq!(
            fdc.read_msr(),
            MSR_RQM | MSR_EXM | MSR_CB,
            "execution phase, CPU to controller"
        );
        for i in 0..512u32 {
            fdc.write_data(i as u8);
        }
        let result = drain_result(&mut fdc);
        assert_eq!(result[0], 0x00);

        send_command(
            &mut fdc,
            &[0x46, 0x00, 0x00, 0x00, 0xC1, 0x02, 0xC1, 0x2A, 0xFF],
        );
        let mut bytes = Vec::new();
        for _ in 0..512 {
            bytes.push(fdc.read_data());
        }
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[255], 0xFF);
        assert_eq!(bytes[511], 0xFF);
    }

    #[test]
    fn ejecting_makes_the_drive_not_ready() {
        let mut fdc = make_fdc_with_disk(&[0xC1]);
        fdc.eject_disk(0);
        send_command(&mut fdc, &[0x4A, 0x00]);
        let result = drain_result(&mut fdc);
        assert_eq!(result[0], ST0_ABNORMAL | ST0_NOT_READY);
    }
}
