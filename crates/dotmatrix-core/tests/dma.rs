mod common;

use common::{RomBuilder, console, idle_at, run_until_pc};

/// Routine run from high RAM: start DMA from 0xC100, sample ROM while the
/// transfer is running, then wait it out.
const HRAM_ROUTINE: [u8; 15] = [
    0x3E, 0xC1, // LD A,0xC1
    0xE0, 0x46, // LDH (DMA),A
    0xFA, 0x00, 0x01, // LD A,(0x0100)
    0xE0, 0x90, // LDH (0x90),A
    0x3E, 0x2C, // LD A,44
    0x3D, // wait: DEC A
    0x20, 0xFD, // JR NZ,wait
    0xC9, // RET
];

#[test]
fn dma_from_high_ram_fills_oam() {
    let program = [
        0xCD, 0x80, 0xFF, // CALL 0xFF80
        0x18, 0xFE, // JR -2
    ];
    let rom = RomBuilder::new("DMA")
        .code(&program)
        .bytes_at(0x0100, &[0x00])
        .build();
    let (mut gc, _) = console(rom);
    for (i, &b) in HRAM_ROUTINE.iter().enumerate() {
        gc.bus.write(0xFF80 + i as u16, b);
    }
    for i in 0..0xA0u16 {
        gc.bus.write(0xC100 + i, (i as u8).wrapping_mul(3));
    }

    assert!(run_until_pc(&mut gc, idle_at(program.len()), 500));
    assert!(!gc.bus.dma.active());
    for i in 0..0xA0usize {
        assert_eq!(gc.bus.ppu.oam.read(i), (i as u8).wrapping_mul(3), "OAM byte {i}");
    }
    // ROM was unreachable while the transfer owned the bus.
    assert_eq!(gc.bus.read(0xFF90), 0xFF);
    assert_eq!(gc.bus.read(0xFF46), 0xC1);
}
