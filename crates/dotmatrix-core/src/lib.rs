//! Game Boy / Game Boy Color emulation core.
//!
//! The crate is platform agnostic: it produces indexed frame buffers, audio
//! sample blocks and consumes joypad snapshots through the traits in [`sink`].
//! Hosts drive it through the [`emulator`] loop or step a [`gameboy::GameBoy`]
//! directly.

#![allow(dead_code)]

/// Partial audio unit: register file and two square channels.
pub mod apu;

/// Cartridge memory bank controllers, battery RAM and the MBC3 clock.
pub mod cartridge;

/// SM83 instruction engine.
pub mod cpu;

/// OAM and VRAM (HDMA) transfer engines.
pub mod dma;

/// Run loop, pacing and the threaded handle.
pub mod emulator;

/// Machine faults and cartridge construction errors.
pub mod error;

/// Machine facade that fans CPU cycles out to the peripherals.
pub mod gameboy;

/// Cartridge header fields.
pub mod header;

/// IE/IF registers and interrupt priority.
pub mod interrupt;

/// Joypad register and keypress edge detection.
pub mod joypad;

/// Memory map.
pub mod mmu;

/// Sprite attribute table.
pub mod oam;

/// DMG shade and CGB color palette memory.
pub mod palette;

/// Pixel processing unit.
pub mod ppu;

/// CPU register file.
pub mod registers;

/// Frame, audio and input boundaries to the host.
pub mod sink;

/// Divider and timer.
pub mod timer;

/// Video RAM banks and tile decoding.
pub mod vram;

pub use cartridge::Cartridge;
pub use emulator::{Emulator, EmulatorHandle, LoopConfig, RunState};
pub use error::{CartridgeError, Fault};
pub use gameboy::{GameBoy, Model};
