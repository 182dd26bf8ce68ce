//! Cycle-accurate DMG Game Boy emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU/bus/PPU/timer/etc).
//! Frontends live in separate crates and drive the core through
//! [`console::GameConsole`], supplying a pixel sink, a sound unit and an input
//! source.

/// Memory-mapped I/O routing and the per-M-cycle hardware tick.
pub mod bus;

/// Cartridge header parsing and memory bank controllers.
pub mod cartridge;

/// Composition root wiring the CPU to the bus.
pub mod console;

/// SM83 CPU core.
pub mod cpu;

/// Pixel sink boundary and an in-memory frame buffer.
pub mod display;

/// OAM DMA sequencing.
pub mod dma;

/// Joypad register and the input-source boundary.
pub mod input;

/// IE/IF registers and interrupt priority.
pub mod interrupts;

/// Fixed-size byte arrays backing RAM regions.
pub mod memory;

/// Battery RAM and save-state storage boundary.
pub mod persist;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// CPU register file.
pub mod registers;

/// Serial port with nothing attached.
pub mod serial;

/// Sound register boundary.
pub mod sound;

/// Save-state encoding.
pub mod state;

/// Divider/timer unit.
pub mod timer;

pub use console::{ConsoleError, GameConsole};
