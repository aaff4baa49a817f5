pub const VRAM_BANK_SIZE: usize = 0x2000;

// VRAM layout constants, relative to 0x8000
const BG_MAP_0_BASE: usize = 0x1800;
const BG_MAP_1_BASE: usize = 0x1C00;
const TILE_DATA_0_BASE: usize = 0x0000;
const TILE_DATA_1_BASE: usize = 0x1000;

/// Tile-map entry attribute bits (bank 1 of the map area, CGB only).
pub const ATTR_PALETTE: u8 = 0x07;
pub const ATTR_BANK: u8 = 0x08;
pub const ATTR_XFLIP: u8 = 0x20;
pub const ATTR_YFLIP: u8 = 0x40;
pub const ATTR_PRIORITY: u8 = 0x80;

/// Background or window map entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapEntry {
    pub tile: u8,
    pub attr: u8,
}

/// Two banks of video RAM. Bank 1 is only reachable in CGB mode.
pub struct Vram {
    banks: [[u8; VRAM_BANK_SIZE]; 2],
    bank: usize,
    cgb: bool,
}

impl Vram {
    pub fn new(cgb: bool) -> Self {
        Self {
            banks: [[0; VRAM_BANK_SIZE]; 2],
            bank: 0,
            cgb,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.banks[self.bank][(addr as usize - 0x8000) & 0x1FFF]
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        self.banks[self.bank][(addr as usize - 0x8000) & 0x1FFF] = val;
    }

    /// VBK (0xFF4F)
    pub fn read_bank_select(&self) -> u8 {
        if self.cgb { 0xFE | self.bank as u8 } else { 0xFF }
    }

    pub fn write_bank_select(&mut self, val: u8) {
        if self.cgb {
            self.bank = (val & 0x01) as usize;
        }
    }

    /// Entry at tile column `col`, row `row` of the map selected by `high_map`.
    pub fn map_entry(&self, high_map: bool, col: usize, row: usize) -> MapEntry {
        let base = if high_map { BG_MAP_1_BASE } else { BG_MAP_0_BASE };
        let idx = base + (row & 31) * 32 + (col & 31);
        MapEntry {
            tile: self.banks[0][idx],
            attr: if self.cgb { self.banks[1][idx] } else { 0 },
        }
    }

    /// Offset of a background tile; `unsigned` is LCDC bit 4.
    pub fn bg_tile_offset(tile: u8, unsigned: bool) -> usize {
        if unsigned {
            TILE_DATA_0_BASE + tile as usize * 16
        } else {
            (TILE_DATA_1_BASE as isize + (tile as i8 as isize) * 16) as usize
        }
    }

    /// Decode one 8-pixel row of the tile at `offset` into color ids,
    /// leftmost pixel first.
    pub fn tile_row(&self, bank: usize, offset: usize, row: usize, xflip: bool) -> [u8; 8] {
        let lo = self.banks[bank][offset + row * 2];
        let hi = self.banks[bank][offset + row * 2 + 1];
        let mut out = [0u8; 8];
        for (px, color) in out.iter_mut().enumerate() {
            let bit = if xflip { px } else { 7 - px };
            *color = (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1);
        }
        out
    }
}
