use std::io;

use thiserror::Error;

/// A condition that halts the emulated machine.
///
/// Faults never unwind the host; they are returned from [`crate::cpu::Cpu::step`]
/// and from every bus access so the driver can report them and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("unimplemented opcode {}{opcode:#04X} at PC {pc:#06X}", prefix_label(.prefixed))]
    UnknownOpcode { opcode: u8, prefixed: bool, pc: u16 },
    #[error("access to unmapped address {addr:#06X}")]
    UnreachableAddress { addr: u16 },
    #[error("bank {bank} selected but the cartridge only has {banks}")]
    BankOutOfRange { bank: usize, banks: usize },
}

fn prefix_label(prefixed: &bool) -> &'static str {
    if *prefixed { "CB " } else { "" }
}

/// Failure to build a [`crate::cartridge::Cartridge`] from a ROM image.
#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM image is {len} bytes, smaller than the 0x150 byte header")]
    TooSmall { len: usize },
    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedType(u8),
    #[error("invalid ROM size code {0:#04X}")]
    InvalidRomSize(u8),
    #[error("invalid RAM size code {0:#04X}")]
    InvalidRamSize(u8),
    #[error("ROM image is {actual} bytes but the header declares {expected}")]
    RomTruncated { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}
