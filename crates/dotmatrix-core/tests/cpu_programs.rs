mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{RomBuilder, console, console_with_input, idle_at, run_until_pc};
use dotmatrix_core::bus::IF;
use dotmatrix_core::input::{JOYP, button};

#[test]
fn counting_loop() {
    let program = [
        0x06, 0x0A, // LD B,10
        0xAF, // XOR A
        0xC6, 0x03, // loop: ADD A,3
        0x05, // DEC B
        0x20, 0xFB, // JR NZ,loop
        0xEA, 0x00, 0xC0, // LD (0xC000),A
        0x18, 0xFE, // JR -2
    ];
    let (mut gc, _) = console(RomBuilder::new("LOOP").code(&program).build());
    assert!(run_until_pc(&mut gc, idle_at(program.len()), 200));
    assert_eq!(gc.cpu.regs.a, 30);
    assert_eq!(gc.bus.read(0xC000), 30);
    assert_eq!(gc.cpu.regs.b, 0);
}

#[test]
fn serial_output_is_captured() {
    let program = [
        0x3E, b'O', // LD A,'O'
        0xCD, 0x60, 0x01, // CALL send
        0x3E, b'K', // LD A,'K'
        0xCD, 0x60, 0x01, // CALL send
        0x18, 0xFE, // JR -2
    ];
    let send = [
        0xE0, 0x01, // LDH (SB),A
        0x3E, 0x81, // LD A,0x81
        0xE0, 0x02, // LDH (SC),A
        0xF0, 0x02, // wait: LDH A,(SC)
        0x87, // ADD A,A
        0x38, 0xFB, // JR C,wait
        0xC9, // RET
    ];
    let rom = RomBuilder::new("SERIAL")
        .code(&program)
        .bytes_at(0x0160, &send)
        .build();
    let (mut gc, _) = console(rom);
    assert!(run_until_pc(&mut gc, idle_at(program.len()), 10_000));
    assert_eq!(gc.serial_output(), b"OK");
    // Nothing on the other end of the cable.
    assert_eq!(gc.bus.read(0xFF01), 0xFF);
}

#[test]
fn timer_interrupt_wakes_halt() {
    let program = [
        0x3E, 0x04, // LD A,0x04
        0xE0, 0xFF, // LDH (IE),A
        0xAF, // XOR A
        0xE0, 0x0F, // LDH (IF),A
        0x3E, 0xF0, // LD A,0xF0
        0xE0, 0x05, // LDH (TIMA),A
        0x3E, 0x05, // LD A,0x05
        0xE0, 0x07, // LDH (TAC),A
        0xFB, // EI
        0x76, // HALT
        0x00, // NOP
        0xFA, 0x00, 0xC0, // LD A,(0xC000)
        0x18, 0xFE, // JR -2
    ];
    let isr = [
        0x3E, 0x42, // LD A,0x42
        0xEA, 0x00, 0xC0, // LD (0xC000),A
        0xD9, // RETI
    ];
    let rom = RomBuilder::new("TIMER")
        .code(&program)
        .bytes_at(0x0050, &isr)
        .build();
    let (mut gc, _) = console(rom);
    assert!(run_until_pc(&mut gc, idle_at(program.len()), 2_000));
    assert_eq!(gc.cpu.regs.a, 0x42);
    assert!(gc.bus.interrupts.ime);
    assert_eq!(gc.bus.read(IF) & 0x04, 0);
}

#[test]
fn button_press_requests_joypad_interrupt() {
    let held = Rc::new(Cell::new(0u8));
    let rom = RomBuilder::new("JOYPAD").code(&[0x18, 0xFE]).build();
    let (mut gc, _) = console_with_input(rom, Box::new(held.clone()));
    // Select the action buttons.
    gc.bus.write(JOYP, 0x10);
    gc.bus.write(IF, 0x00);
    for _ in 0..100 {
        gc.step();
    }
    assert_eq!(gc.bus.read(IF) & 0x10, 0);

    held.set(button::A);
    for _ in 0..100 {
        gc.step();
    }
    assert_eq!(gc.bus.read(IF) & 0x10, 0x10);
    assert_eq!(gc.bus.read(JOYP) & 0x0F, 0x0E);
}
