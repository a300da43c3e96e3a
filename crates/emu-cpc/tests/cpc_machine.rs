//! Whole-machine tests.
//!
//! Each test builds a CPC with a tiny hand-assembled OS ROM and runs it
//! until HALT or across video frames, checking machine-level behaviour:
//! ROM paging, the raster interrupt chain, keyboard scanning through
//! the 8255/PSG pair, and the floppy controller port wiring.

use emu_cpc::{Cpc, CpcConfig};

const ROM_SIZE: usize = 0x4000;

fn rom_with(entries: &[(usize, &[u8])]) -> Vec<u8> {
    let mut rom = vec![0; ROM_SIZE];
    for (offset, bytes) in entries {
        rom[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    }
    rom
}

fn make_cpc(os_rom: Vec<u8>) -> Cpc {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = CpcConfig {
        os_rom,
        basic_rom: vec![0; ROM_SIZE],
        amsdos_rom: None,
        disk: None,
    };
    Cpc::new(config).expect("machine builds")
}

fn run_until_halt(cpc: &mut Cpc) {
    let mut guard = 0;
    while !cpc.cpu().is_halted() {
        cpc.step();
        guard += 1;
        assert!(guard < 1_000_000, "program never halted");
    }
}

#[test]
fn boots_from_the_os_rom() {
    // LD A,0x42; LD (0x4000),A; HALT
    let rom = rom_with(&[(0, &[0x3E, 0x42, 0x32, 0x00, 0x40, 0x76][..])]);
    let mut cpc = make_cpc(rom);
    run_until_halt(&mut cpc);
    assert_eq!(cpc.ram(0x4000), 0x42);
}

#[test]
fn rejects_undersized_rom() {
    let config = CpcConfig {
        os_rom: vec![0; 0x1000],
        basic_rom: vec![0; ROM_SIZE],
        amsdos_rom: None,
        disk: None,
    };
    assert!(Cpc::new(config).is_err());
}

#[test]
fn gate_array_port_pages_the_lower_rom() {
    // The boot stub copies a routine to RAM and jumps there, because
    // the routine pages out the ROM it would otherwise be running from.
    let boot = [
        0x21, 0x20, 0x00, // LD HL,0x0020
        0x11, 0x00, 0x40, // LD DE,0x4000
        0x01, 0x20, 0x00, // LD BC,0x0020
        0xED, 0xB0, // LDIR
        0xC3, 0x00, 0x40, // JP 0x4000
    ];
    let routine = [
        0x3E, 0x5A, // LD A,0x5A
        0x32, 0x00, 0x00, // LD (0x0000),A      ; RAM under the ROM
        0x3A, 0x00, 0x00, // LD A,(0x0000)      ; ROM still mapped
        0x32, 0x80, 0x40, // LD (0x4080),A
        0x01, 0x00, 0x7F, // LD BC,0x7F00
        0x3E, 0x8C, // LD A,0x8C               ; page out both ROMs
        0xED, 0x79, // OUT (C),A
        0x3A, 0x00, 0x00, // LD A,(0x0000)      ; now reads RAM
        0x32, 0x81, 0x40, // LD (0x4081),A
        0x76, // HALT
    ];
    let rom = rom_with(&[(0, &boot[..]), (0x20, &routine[..])]);
    let mut cpc = make_cpc(rom);
    run_until_halt(&mut cpc);
    assert_eq!(cpc.ram(0x4080), 0x21, "first ROM byte while mapped");
    assert_eq!(cpc.ram(0x4081), 0x5A, "RAM underneath after paging out");
}

#[test]
fn run_frame_covers_a_pal_frame() {
    // JR -2: spin until the frame ends.
    let rom = rom_with(&[(0, &[0x18, 0xFE][..])]);
    let mut cpc = make_cpc(rom);
    // The first frame starts mid-screen; the second is a full one:
    // 312 scanlines of 64 characters at 4 T-states each.
    cpc.run_frame();
    let before = cpc.total_ticks();
    let tstates = cpc.run_frame();
    assert!(
        tstates.abs_diff(Cpc::ticks_per_frame().get()) < 5_000,
        "full frame was {tstates} T-states"
    );
    assert_eq!((cpc.total_ticks() - before).get(), tstates);
    assert_eq!(cpc.frame_count(), 2);
}

#[test]
fn raster_interrupt_drives_an_im1_handler() {
    let main = [
        0xFB, // EI
        0xED, 0x56, // IM 1
        0x76, // HALT
        0x18, 0xFD, // JR -3 (back to the HALT)
    ];
    let handler = [
        0x21, 0x00, 0x40, // LD HL,0x4000
        0x34, // INC (HL)
        0xFB, // EI
        0xC9, // RET
    ];
    let rom = rom_with(&[(0, &main[..]), (0x38, &handler[..])]);
    let mut cpc = make_cpc(rom);
    cpc.run_frame();
    cpc.run_frame();
    let count = cpc.ram(0x4000);
    // 312 lines per frame, one interrupt per 52 lines: six a frame once
    // the counter settles.
    assert!(
        (6..=14).contains(&count),
        "handler ran {count} times over two frames"
    );
}

#[test]
fn keyboard_scans_through_ppi_and_psg() {
    let program = [
        0x01, 0x00, 0xF4, // LD BC,0xF400       ; 8255 port A
        0x3E, 0x0E, // LD A,0x0E
        0xED, 0x79, // OUT (C),A               ; PSG register number
        0x01, 0x00, 0xF6, // LD BC,0xF600       ; 8255 port C
        0x3E, 0xC0, // LD A,0xC0               ; select-register function
        0xED, 0x79, // OUT (C),A
        0x3E, 0x00, // LD A,0x00               ; back to inactive
        0xED, 0x79, // OUT (C),A
        0x3E, 0x48, // LD A,0x48               ; read function, row 8
        0xED, 0x79, // OUT (C),A
        0x01, 0x00, 0xF4, // LD BC,0xF400
        0xED, 0x78, // IN A,(C)
        0x32, 0x00, 0x40, // LD (0x4000),A
        0x76, // HALT
    ];
    let rom = rom_with(&[(0, &program[..])]);
    let mut cpc = make_cpc(rom);
    // Q lives at row 8, bit 3.
    cpc.key_down(8, 3);
    run_until_halt(&mut cpc);
    assert_eq!(cpc.ram(0x4000), 0xF7, "pressed key reads low");

    cpc.key_up(8, 3);
    cpc.cpu_mut().reset();
    run_until_halt(&mut cpc);
    assert_eq!(cpc.ram(0x4000), 0xFF);
}

#[test]
fn fdc_answers_read_id_over_the_port_map() {
    let program = [
        0x01, 0x7E, 0xFA, // LD BC,0xFA7E       ; motor port
        0x3E, 0x01, // LD A,0x01
        0xED, 0x79, // OUT (C),A               ; motor on
        0x01, 0x7F, 0xFB, // LD BC,0xFB7F       ; FDC data register
        0x3E, 0x4A, // LD A,0x4A               ; READ ID
        0xED, 0x79, // OUT (C),A
        0x3E, 0x00, // LD A,0x00               ; drive 0
        0xED, 0x79, // OUT (C),A
        0xED, 0x78, // IN A,(C)                ; ST0
        0x32, 0x00, 0x40, // LD (0x4000),A
        0xED, 0x78, // IN A,(C)                ; ST1
        0xED, 0x78, // IN A,(C)                ; ST2
        0xED, 0x78, // IN A,(C)                ; C
        0xED, 0x78, // IN A,(C)                ; H
        0xED, 0x78, // IN A,(C)                ; R
        0x32, 0x01, 0x40, // LD (0x4001),A
        0xED, 0x78, // IN A,(C)                ; N
        0x32, 0x02, 0x40, // LD (0x4002),A
        0x76, // HALT
    ];
    let rom = rom_with(&[(0, &program[..])]);
    let _ = env_logger::builder().is_test(true).try_init();
    let config = CpcConfig {
        os_rom: rom,
        basic_rom: vec![0; ROM_SIZE],
        amsdos_rom: Some(vec![0; ROM_SIZE]),
        disk: Some(nec_upd765::dsk::test_image(&[0xC1, 0xC2], 0xE5)),
    };
    let mut cpc = Cpc::new(config).expect("machine builds");
    run_until_halt(&mut cpc);
    assert_eq!(cpc.ram(0x4000), 0x00, "ST0 normal termination");
    assert_eq!(cpc.ram(0x4001), 0xC1, "first sector ID on the track");
    assert_eq!(cpc.ram(0x4002), 0x02, "512-byte sectors");
}
