pub const OAM_SIZE: usize = 0xA0;
pub const TOTAL_SPRITES: usize = 40;

// Sprite flag bits
pub const FLAG_PALETTE_CGB: u8 = 0x07;
pub const FLAG_BANK: u8 = 0x08;
pub const FLAG_DMG_PALETTE: u8 = 0x10;
pub const FLAG_XFLIP: u8 = 0x20;
pub const FLAG_YFLIP: u8 = 0x40;
pub const FLAG_BEHIND_BG: u8 = 0x80;

/// One decoded OAM record, positions already offset to screen space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sprite {
    pub y: i16,
    pub x: i16,
    pub tile: u8,
    pub flags: u8,
    pub oam_index: usize,
}

/// Sprite attribute table at 0xFE00-0xFE9F.
pub struct Oam {
    data: [u8; OAM_SIZE],
}

impl Oam {
    pub fn new() -> Self {
        Self {
            data: [0; OAM_SIZE],
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.data[(addr - 0xFE00) as usize]
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        self.data[(addr - 0xFE00) as usize] = val;
    }

    pub fn sprite(&self, index: usize) -> Sprite {
        let base = index * 4;
        Sprite {
            y: self.data[base] as i16 - 16,
            x: self.data[base + 1] as i16 - 8,
            tile: self.data[base + 2],
            flags: self.data[base + 3],
            oam_index: index,
        }
    }
}

impl Default for Oam {
    fn default() -> Self {
        Self::new()
    }
}
