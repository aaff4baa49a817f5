//! Transfer engines. Both copy through a borrowed [`Bus`] for the length of
//! one tick and keep no reference to it between ticks.

use crate::error::Fault;
use crate::mmu::Bus;

const OAM_BASE: u16 = 0xFE00;
const OAM_DMA_LEN: u16 = 0xA0;

const HDMA_BLOCK: u16 = 0x10;
const VRAM_BASE: u16 = 0x8000;
const VRAM_END: u16 = 0x9FFF;

/// OAM DMA started by writing a source page to 0xFF46.
#[derive(Debug, Default)]
pub struct OamDma {
    register: u8,
    source: u16,
    offset: u16,
    active: bool,
}

impl OamDma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn read(&self) -> u8 {
        if self.active { 0xFF } else { self.register }
    }

    pub fn write(&mut self, val: u8) {
        if self.active {
            return;
        }
        self.register = val;
        self.source = (val as u16) << 8;
        self.offset = 0;
        self.active = true;
    }

    /// Copy up to `cycles` bytes of the remaining transfer.
    pub fn tick<B: Bus>(&mut self, cycles: u32, bus: &mut B) -> Result<(), Fault> {
        if !self.active {
            return Ok(());
        }
        let remaining = (OAM_DMA_LEN - self.offset) as u32;
        for _ in 0..cycles.min(remaining) {
            let byte = bus.read_byte(self.source.wrapping_add(self.offset))?;
            bus.write_byte(OAM_BASE + self.offset, byte)?;
            self.offset += 1;
        }
        if self.offset >= OAM_DMA_LEN {
            self.active = false;
        }
        Ok(())
    }
}

/// CGB VRAM DMA (0xFF51-0xFF55).
///
/// The whole requested length is copied on the tick after the start write,
/// whether or not the H-Blank mode bit (bit 7 of 0xFF55) was set. A transfer
/// that would run past 0x9FFF stops at the end of VRAM.
#[derive(Debug, Default)]
pub struct VramDma {
    source: u16,
    dest: u16,
    length: u16,
    active: bool,
}

impl VramDma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF51 => (self.source >> 8) as u8,
            0xFF52 => self.source as u8,
            0xFF53 => (self.dest >> 8) as u8,
            0xFF54 => self.dest as u8,
            0xFF55 => {
                if self.active {
                    ((self.length / HDMA_BLOCK - 1) & 0x7F) as u8
                } else {
                    0xFF
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF51 => self.source = ((val as u16) << 8) | (self.source & 0x00FF),
            0xFF52 => self.source = (self.source & 0xFF00) | (val & 0xF0) as u16,
            0xFF53 => self.dest = ((((val & 0x1F) | 0x80) as u16) << 8) | (self.dest & 0x00FF),
            0xFF54 => self.dest = (self.dest & 0xFF00) | (val & 0xF0) as u16,
            0xFF55 => {
                self.length = ((val & 0x7F) as u16 + 1) * HDMA_BLOCK;
                self.active = true;
            }
            _ => {}
        }
    }

    pub fn tick<B: Bus>(&mut self, _cycles: u32, bus: &mut B) -> Result<(), Fault> {
        if !self.active {
            return Ok(());
        }
        let dest = VRAM_BASE | (self.dest & 0x1FF0);
        let count = self.length.min(VRAM_END + 1 - dest);
        for i in 0..count {
            let byte = bus.read_byte(self.source.wrapping_add(i))?;
            bus.write_byte(dest + i, byte)?;
        }
        self.source = self.source.wrapping_add(self.length);
        self.dest = VRAM_BASE | (dest.wrapping_add(self.length) & 0x1FFF);
        self.active = false;
        Ok(())
    }
}
