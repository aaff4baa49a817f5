use crate::sink::FrameColors;

// DMG shade intensities, lightest first
const DMG_SHADES: [u8; 4] = [0xED, 0x99, 0x66, 0x21];

const PAL_RAM_SIZE: usize = 0x40;
const PAL_INDEX_MASK: u8 = 0x3F;
const PAL_AUTO_INCREMENT_BIT: u8 = 0x80;

/// First [`FrameColors`] entry used by background palettes.
pub const BG_ENTRY_BASE: usize = 32;

/// Frame-buffer prefix for a background/window pixel using palette `pal`.
pub fn bg_prefix(pal: u8) -> u8 {
    0b10_0000 | ((pal & 0x07) << 2)
}

/// Frame-buffer prefix for an object pixel using palette `pal`.
pub fn obj_prefix(pal: u8) -> u8 {
    (pal & 0x07) << 2
}

/// One CGB palette RAM bank with its BCPS/OCPS style index register.
pub struct ColorPalette {
    index: u8,
    data: [u8; PAL_RAM_SIZE],
}

impl ColorPalette {
    pub fn new() -> Self {
        Self {
            index: 0,
            data: [0xFF; PAL_RAM_SIZE],
        }
    }

    pub fn read_index(&self) -> u8 {
        self.index | 0x40
    }

    pub fn write_index(&mut self, val: u8) {
        self.index = val & (PAL_AUTO_INCREMENT_BIT | PAL_INDEX_MASK);
    }

    pub fn read_data(&self) -> u8 {
        self.data[(self.index & PAL_INDEX_MASK) as usize]
    }

    pub fn write_data(&mut self, val: u8) {
        self.data[(self.index & PAL_INDEX_MASK) as usize] = val;
        if self.index & PAL_AUTO_INCREMENT_BIT != 0 {
            let next = (self.index + 1) & PAL_INDEX_MASK;
            self.index = PAL_AUTO_INCREMENT_BIT | next;
        }
    }

    /// Expand the 32 little-endian BGR555 entries into RGB triples starting
    /// at entry `first`.
    pub fn expand(&self, colors: &mut FrameColors, first: usize) {
        for entry in 0..32 {
            let raw = ((self.data[entry * 2 + 1] as u16) << 8) | self.data[entry * 2] as u16;
            let out = (first + entry) * 3;
            colors[out] = ((raw & 0x1F) as u8) << 3;
            colors[out + 1] = (((raw >> 5) & 0x1F) as u8) << 3;
            colors[out + 2] = (((raw >> 10) & 0x1F) as u8) << 3;
        }
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::new()
    }
}

/// Write the four shades of a DMG palette register at entry `first`.
pub fn expand_dmg(colors: &mut FrameColors, first: usize, palette: u8) {
    for color_id in 0..4 {
        let shade = (palette >> (color_id * 2)) & 0x03;
        let out = (first + color_id as usize) * 3;
        colors[out..out + 3].fill(DMG_SHADES[shade as usize]);
    }
}
