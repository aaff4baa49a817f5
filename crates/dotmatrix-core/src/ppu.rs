#[cfg(feature = "ppu-trace")]
use log::trace;

use crate::oam::{
    FLAG_BANK, FLAG_BEHIND_BG, FLAG_DMG_PALETTE, FLAG_PALETTE_CGB, FLAG_XFLIP, FLAG_YFLIP, Oam,
    Sprite, TOTAL_SPRITES,
};
use crate::palette::{BG_ENTRY_BASE, ColorPalette, bg_prefix, expand_dmg, obj_prefix};
use crate::sink::{
    FrameBuffer, FrameColors, FrameSink, SCREEN_HEIGHT, SCREEN_WIDTH, new_frame_buffer,
    new_frame_colors,
};
use crate::vram::{ATTR_BANK, ATTR_PALETTE, ATTR_PRIORITY, ATTR_XFLIP, ATTR_YFLIP, Vram};

// Timing constants per LCD mode in dots
const MODE0_CYCLES: u32 = 204; // HBlank
const MODE2_CYCLES: u32 = 80; // OAM scan
const MODE3_CYCLES: u32 = 172; // Pixel transfer
pub const LINE_CYCLES: u32 = MODE2_CYCLES + MODE3_CYCLES + MODE0_CYCLES;

const TOTAL_LINES: u32 = 154;
const VISIBLE_CYCLES: u32 = SCREEN_HEIGHT as u32 * LINE_CYCLES;
pub const FRAME_CYCLES: u32 = TOTAL_LINES * LINE_CYCLES;

// Longest slice of time handled in one pass of the state machine
const MAX_STEP: u32 = 4;

const MAX_SPRITES_PER_LINE: usize = 10;

// Window X position is clipped if greater than this value
const WINDOW_X_MAX: u8 = 166;

// LCD modes used in the `mode` field
pub const MODE_HBLANK: u8 = 0;
pub const MODE_VBLANK: u8 = 1;
pub const MODE_OAM: u8 = 2;
pub const MODE_TRANSFER: u8 = 3;

// LCDC bits
const LCDC_BG_ENABLE: u8 = 0x01;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_OBJ_TALL: u8 = 0x04;
const LCDC_BG_MAP: u8 = 0x08;
const LCDC_TILE_DATA: u8 = 0x10;
const LCDC_WINDOW_ENABLE: u8 = 0x20;
const LCDC_WINDOW_MAP: u8 = 0x40;
const LCDC_ON: u8 = 0x80;

// STAT interrupt sources
const STAT_HBLANK: u8 = 0x08;
const STAT_VBLANK: u8 = 0x10;
const STAT_OAM: u8 = 0x20;
const STAT_LYC: u8 = 0x40;

/// One decoded row of a background or window tile.
#[derive(Clone, Copy)]
struct TileLine {
    colors: [u8; 8],
    prefix: u8,
    priority: bool,
}

pub struct Ppu {
    pub vram: Vram,
    pub oam: Oam,
    pub bg_palette: ColorPalette,
    pub obj_palette: ColorPalette,

    cgb: bool,

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    lyc_eq_ly: bool,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    /// Internal window line counter
    win_line_counter: u8,

    mode: u8,
    line_cycles: u32,
    frame_cycles: u32,

    pixels: Box<FrameBuffer>,
    colors: Box<FrameColors>,

    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    line_color_zero: [bool; SCREEN_WIDTH],
    line_priority: [bool; SCREEN_WIDTH],

    frames: u64,
}

impl Ppu {
    /// PPU in the state left by the boot ROM: LCD on, BG palette 0xFC.
    pub fn new(cgb: bool) -> Self {
        Self {
            vram: Vram::new(cgb),
            oam: Oam::new(),
            bg_palette: ColorPalette::new(),
            obj_palette: ColorPalette::new(),
            cgb,
            lcdc: 0x91,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            lyc_eq_ly: false,
            bgp: 0xFC,
            obp0: 0xFF,
            obp1: 0xFF,
            wy: 0,
            wx: 0,
            win_line_counter: 0,
            mode: MODE_OAM,
            line_cycles: 0,
            frame_cycles: 0,
            pixels: new_frame_buffer(),
            colors: new_frame_colors(),
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            line_color_zero: [true; SCREEN_WIDTH],
            line_priority: [false; SCREEN_WIDTH],
            frames: 0,
        }
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    /// Frames handed to the sink so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_ON != 0
    }

    /// The frame currently being drawn.
    pub fn pixels(&self) -> &FrameBuffer {
        &self.pixels
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                let coincidence = if self.lyc_eq_ly { 0x04 } else { 0 };
                0x80 | (self.stat & 0x78) | coincidence | self.mode
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => {
                let was_on = self.lcd_enabled();
                self.lcdc = val;
                if was_on && !self.lcd_enabled() {
                    self.blank();
                } else if !was_on && self.lcd_enabled() {
                    self.line_cycles = 0;
                    self.frame_cycles = 0;
                }
            }
            0xFF41 => self.stat = val & 0x78,
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF44 => {}
            0xFF45 => self.lyc = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    /// BCPS/BCPD/OCPS/OCPD (0xFF68-0xFF6B), CGB only.
    pub fn read_palette(&self, addr: u16) -> u8 {
        if !self.cgb {
            return 0xFF;
        }
        match addr {
            0xFF68 => self.bg_palette.read_index(),
            0xFF69 => self.bg_palette.read_data(),
            0xFF6A => self.obj_palette.read_index(),
            0xFF6B => self.obj_palette.read_data(),
            _ => 0xFF,
        }
    }

    pub fn write_palette(&mut self, addr: u16, val: u8) {
        if !self.cgb {
            return;
        }
        match addr {
            0xFF68 => self.bg_palette.write_index(val),
            0xFF69 => self.bg_palette.write_data(val),
            0xFF6A => self.obj_palette.write_index(val),
            0xFF6B => self.obj_palette.write_data(val),
            _ => {}
        }
    }

    fn blank(&mut self) {
        self.mode = MODE_HBLANK;
        self.ly = 0;
        self.line_cycles = 0;
        self.frame_cycles = 0;
        self.win_line_counter = 0;
    }

    /// Advance by `cycles` dots. VBlank/STAT requests go to `if_reg`; a
    /// finished frame is swapped with `sink`.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8, sink: &mut dyn FrameSink) {
        let mut remaining = cycles;
        while remaining > 0 {
            let increment = remaining.min(MAX_STEP);
            remaining -= increment;
            if !self.lcd_enabled() {
                self.blank();
                continue;
            }

            self.line_cycles += increment;
            self.frame_cycles += increment;

            if self.frame_cycles >= FRAME_CYCLES {
                self.frame_cycles -= FRAME_CYCLES;
                self.line_cycles = self.frame_cycles;
                self.ly = 0;
                self.win_line_counter = 0;
            } else if self.line_cycles >= LINE_CYCLES {
                self.line_cycles -= LINE_CYCLES;
                self.ly += 1;
            }

            if self.frame_cycles >= VISIBLE_CYCLES {
                if self.mode != MODE_VBLANK {
                    self.enter_vblank(if_reg, sink);
                }
            } else if self.line_cycles < MODE2_CYCLES {
                self.set_mode(MODE_OAM, if_reg);
            } else if self.line_cycles < MODE2_CYCLES + MODE3_CYCLES {
                if self.mode != MODE_TRANSFER {
                    self.set_mode(MODE_TRANSFER, if_reg);
                    self.render_scanline();
                }
            } else {
                self.set_mode(MODE_HBLANK, if_reg);
            }

            self.update_coincidence(if_reg);
        }
    }

    fn set_mode(&mut self, mode: u8, if_reg: &mut u8) {
        if self.mode == mode {
            return;
        }
        #[cfg(feature = "ppu-trace")]
        trace!("LY {:3} mode {} -> {}", self.ly, self.mode, mode);
        self.mode = mode;
        let source = match mode {
            MODE_HBLANK => STAT_HBLANK,
            MODE_VBLANK => STAT_VBLANK,
            MODE_OAM => STAT_OAM,
            _ => 0,
        };
        if self.stat & source != 0 {
            *if_reg |= 0x02;
        }
    }

    fn enter_vblank(&mut self, if_reg: &mut u8, sink: &mut dyn FrameSink) {
        self.set_mode(MODE_VBLANK, if_reg);
        *if_reg |= 0x01;
        self.present(sink);
    }

    /// Fill the palette colors and hand the frame to the sink.
    fn present(&mut self, sink: &mut dyn FrameSink) {
        if self.cgb {
            self.obj_palette.expand(&mut self.colors, 0);
            self.bg_palette.expand(&mut self.colors, BG_ENTRY_BASE);
        } else {
            expand_dmg(&mut self.colors, BG_ENTRY_BASE, self.bgp);
            expand_dmg(&mut self.colors, 0, self.obp0);
            expand_dmg(&mut self.colors, 4, self.obp1);
        }
        sink.swap(&mut self.pixels, &mut self.colors);
        self.frames += 1;
        #[cfg(feature = "ppu-trace")]
        trace!("frame {} presented", self.frames);
    }

    fn update_coincidence(&mut self, if_reg: &mut u8) {
        let eq = self.ly == self.lyc;
        if eq && !self.lyc_eq_ly && self.stat & STAT_LYC != 0 {
            *if_reg |= 0x02;
        }
        self.lyc_eq_ly = eq;
    }

    /// Collect up to 10 sprites visible on the current scanline.
    fn oam_scan(&mut self) {
        let sprite_height: i16 = if self.lcdc & LCDC_OBJ_TALL != 0 { 16 } else { 8 };
        let ly = self.ly as i16;
        self.sprite_count = 0;
        for i in 0..TOTAL_SPRITES {
            if self.sprite_count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let sprite = self.oam.sprite(i);
            if ly >= sprite.y && ly < sprite.y + sprite_height {
                self.line_sprites[self.sprite_count] = sprite;
                self.sprite_count += 1;
            }
        }
        if self.cgb {
            self.line_sprites[..self.sprite_count].sort_by_key(|s| s.oam_index);
        } else {
            self.line_sprites[..self.sprite_count].sort_by_key(|s| (s.x, s.oam_index));
        }
    }

    fn tile_line(&self, high_map: bool, col: usize, map_y: usize) -> TileLine {
        let entry = self.vram.map_entry(high_map, col, map_y / 8);
        let offset = Vram::bg_tile_offset(entry.tile, self.lcdc & LCDC_TILE_DATA != 0);
        let mut row = map_y % 8;
        if entry.attr & ATTR_YFLIP != 0 {
            row = 7 - row;
        }
        let bank = if entry.attr & ATTR_BANK != 0 { 1 } else { 0 };
        TileLine {
            colors: self
                .vram
                .tile_row(bank, offset, row, entry.attr & ATTR_XFLIP != 0),
            prefix: bg_prefix(entry.attr & ATTR_PALETTE),
            priority: entry.attr & ATTR_PRIORITY != 0,
        }
    }

    /// Paint map pixels from `map_x` onward into screen columns `start..160`.
    fn draw_map_span(&mut self, high_map: bool, start: usize, map_x: usize, map_y: usize) {
        let row_start = self.ly as usize * SCREEN_WIDTH;
        let mut cached: Option<(usize, TileLine)> = None;
        for x in start..SCREEN_WIDTH {
            let mx = (map_x + x - start) & 0xFF;
            let col = mx / 8;
            let line = match cached {
                Some((c, line)) if c == col => line,
                _ => {
                    let line = self.tile_line(high_map, col, map_y);
                    cached = Some((col, line));
                    line
                }
            };
            let color = line.colors[mx % 8];
            self.pixels[row_start + x] = line.prefix | color;
            self.line_color_zero[x] = color == 0;
            self.line_priority[x] = line.priority;
        }
    }

    fn render_scanline(&mut self) {
        if self.ly as usize >= SCREEN_HEIGHT {
            return;
        }
        self.oam_scan();

        let row_start = self.ly as usize * SCREEN_WIDTH;
        self.line_priority.fill(false);
        self.line_color_zero.fill(true);

        // On CGB, LCDC bit 0 only strips BG/window priority.
        let bg_enabled = self.cgb || self.lcdc & LCDC_BG_ENABLE != 0;
        let master_priority = !self.cgb || self.lcdc & LCDC_BG_ENABLE != 0;

        self.pixels[row_start..row_start + SCREEN_WIDTH].fill(bg_prefix(0));

        if bg_enabled {
            let map_y = self.ly.wrapping_add(self.scy) as usize;
            self.draw_map_span(
                self.lcdc & LCDC_BG_MAP != 0,
                0,
                self.scx as usize,
                map_y,
            );

            if self.lcdc & LCDC_WINDOW_ENABLE != 0 && self.ly >= self.wy && self.wx <= WINDOW_X_MAX
            {
                let origin = self.wx as isize - 7;
                let start = origin.max(0) as usize;
                let map_x = (start as isize - origin) as usize;
                self.draw_map_span(
                    self.lcdc & LCDC_WINDOW_MAP != 0,
                    start,
                    map_x,
                    self.win_line_counter as usize,
                );
                self.win_line_counter = self.win_line_counter.wrapping_add(1);
            }
        }

        if self.lcdc & LCDC_OBJ_ENABLE == 0 {
            return;
        }

        let sprite_height: i16 = if self.lcdc & LCDC_OBJ_TALL != 0 { 16 } else { 8 };
        let mut drawn = [false; SCREEN_WIDTH];
        for i in 0..self.sprite_count {
            let s = self.line_sprites[i];
            let mut line = self.ly as i16 - s.y;
            if s.flags & FLAG_YFLIP != 0 {
                line = sprite_height - 1 - line;
            }
            let tile = if sprite_height == 16 {
                (s.tile & 0xFE) | (line >> 3) as u8
            } else {
                s.tile
            };
            let bank = if self.cgb && s.flags & FLAG_BANK != 0 { 1 } else { 0 };
            let colors = self.vram.tile_row(
                bank,
                tile as usize * 16,
                (line & 7) as usize,
                s.flags & FLAG_XFLIP != 0,
            );
            let prefix = if self.cgb {
                obj_prefix(s.flags & FLAG_PALETTE_CGB)
            } else if s.flags & FLAG_DMG_PALETTE != 0 {
                obj_prefix(1)
            } else {
                obj_prefix(0)
            };

            for (px, &color) in colors.iter().enumerate() {
                if color == 0 {
                    continue;
                }
                let sx = s.x + px as i16;
                if !(0..SCREEN_WIDTH as i16).contains(&sx) || drawn[sx as usize] {
                    continue;
                }
                let sx = sx as usize;
                drawn[sx] = true;
                let bg_zero = self.line_color_zero[sx];
                if master_priority && !bg_zero {
                    if self.cgb && self.line_priority[sx] {
                        continue;
                    }
                    if s.flags & FLAG_BEHIND_BG != 0 {
                        continue;
                    }
                }
                self.pixels[row_start + sx] = prefix | color;
            }
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullFrameSink;

    struct CountingSink {
        swaps: usize,
    }

    impl FrameSink for CountingSink {
        fn swap(&mut self, _pixels: &mut Box<FrameBuffer>, _colors: &mut Box<FrameColors>) {
            self.swaps += 1;
        }
    }

    fn line_pixels(ppu: &Ppu, ly: usize) -> &[u8] {
        &ppu.pixels()[ly * SCREEN_WIDTH..(ly + 1) * SCREEN_WIDTH]
    }

    /// Tile 1 solid color 3, tile 2 solid color 1.
    fn load_tiles(ppu: &mut Ppu) {
        for row in 0..8 {
            ppu.vram.write(0x8010 + row * 2, 0xFF);
            ppu.vram.write(0x8011 + row * 2, 0xFF);
            ppu.vram.write(0x8020 + row * 2, 0xFF);
        }
    }

    #[test]
    fn one_line_advances_ly() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        ppu.step(LINE_CYCLES, &mut if_reg, &mut NullFrameSink);
        assert_eq!(ppu.ly(), 1);
        assert_eq!(ppu.mode(), MODE_OAM);
    }

    #[test]
    fn mode_sequence_within_line() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        let mut sink = NullFrameSink;
        ppu.step(76, &mut if_reg, &mut sink);
        assert_eq!(ppu.mode(), MODE_OAM);
        ppu.step(4, &mut if_reg, &mut sink);
        assert_eq!(ppu.mode(), MODE_TRANSFER);
        ppu.step(172, &mut if_reg, &mut sink);
        assert_eq!(ppu.mode(), MODE_HBLANK);
    }

    #[test]
    fn full_frame_swaps_once() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        let mut sink = CountingSink { swaps: 0 };
        let mut max_ly = 0;
        for _ in 0..FRAME_CYCLES / 4 {
            ppu.step(4, &mut if_reg, &mut sink);
            max_ly = max_ly.max(ppu.ly());
        }
        assert_eq!(sink.swaps, 1);
        assert_eq!(max_ly, 153);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(if_reg & 0x01, 0x01);
        assert_eq!(ppu.frames(), 1);
    }

    #[test]
    fn vblank_starts_at_line_144() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        ppu.step(VISIBLE_CYCLES - 4, &mut if_reg, &mut NullFrameSink);
        assert_eq!(ppu.mode(), MODE_HBLANK);
        assert_eq!(if_reg & 0x01, 0);
        ppu.step(4, &mut if_reg, &mut NullFrameSink);
        assert_eq!(ppu.ly(), 144);
        assert_eq!(ppu.mode(), MODE_VBLANK);
        assert_eq!(if_reg & 0x01, 0x01);
    }

    #[test]
    fn lcd_off_holds_line_zero() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        let mut sink = CountingSink { swaps: 0 };
        ppu.step(LINE_CYCLES * 3, &mut if_reg, &mut sink);
        ppu.write_reg(0xFF40, 0x11);
        ppu.step(FRAME_CYCLES, &mut if_reg, &mut sink);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.read_reg(0xFF41) & 0x03, MODE_HBLANK);
        assert_eq!(sink.swaps, 0);
    }

    #[test]
    fn lyc_interrupt_on_rising_edge() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        ppu.write_reg(0xFF45, 2);
        ppu.write_reg(0xFF41, STAT_LYC);
        ppu.step(LINE_CYCLES * 2, &mut if_reg, &mut NullFrameSink);
        assert_eq!(if_reg & 0x02, 0x02);
        assert_eq!(ppu.read_reg(0xFF41) & 0x04, 0x04);

        if_reg = 0;
        ppu.step(LINE_CYCLES / 2, &mut if_reg, &mut NullFrameSink);
        assert_eq!(if_reg & 0x02, 0);
    }

    #[test]
    fn hblank_stat_interrupt() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        ppu.write_reg(0xFF41, STAT_HBLANK);
        ppu.step(MODE2_CYCLES + MODE3_CYCLES, &mut if_reg, &mut NullFrameSink);
        assert_eq!(if_reg & 0x02, 0x02);
    }

    #[test]
    fn background_scroll_clips_tiles() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        load_tiles(&mut ppu);
        // map row 0: tile 1 then tile 2
        ppu.vram.write(0x9800, 1);
        ppu.vram.write(0x9801, 2);
        ppu.write_reg(0xFF43, 3);
        ppu.step(MODE2_CYCLES + 4, &mut if_reg, &mut NullFrameSink);

        let line = line_pixels(&ppu, 0);
        assert!(line[..5].iter().all(|&p| p == bg_prefix(0) | 3));
        assert!(line[5..13].iter().all(|&p| p == bg_prefix(0) | 1));
        assert_eq!(line[13], bg_prefix(0));
    }

    #[test]
    fn window_overrides_background() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        load_tiles(&mut ppu);
        for col in 0..32 {
            ppu.vram.write(0x9C00 + col, 2);
        }
        ppu.write_reg(0xFF4A, 0);
        ppu.write_reg(0xFF4B, 7 + 80);
        ppu.write_reg(0xFF40, 0x91 | LCDC_WINDOW_ENABLE | LCDC_WINDOW_MAP);
        ppu.step(MODE2_CYCLES + 4, &mut if_reg, &mut NullFrameSink);

        let line = line_pixels(&ppu, 0);
        assert_eq!(line[79], bg_prefix(0));
        assert_eq!(line[80], bg_prefix(0) | 1);
        assert_eq!(line[159], bg_prefix(0) | 1);
    }

    #[test]
    fn sprite_priority_and_palettes() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        load_tiles(&mut ppu);
        ppu.vram.write(0x9800, 1);
        // sprite 0 at x=4 over the opaque tile but behind BG
        ppu.oam.write(0xFE00, 16);
        ppu.oam.write(0xFE01, 8 + 4);
        ppu.oam.write(0xFE02, 2);
        ppu.oam.write(0xFE03, FLAG_BEHIND_BG);
        // sprite 1 at x=10 using OBP1
        ppu.oam.write(0xFE04, 16);
        ppu.oam.write(0xFE05, 8 + 10);
        ppu.oam.write(0xFE06, 1);
        ppu.oam.write(0xFE07, FLAG_DMG_PALETTE);
        ppu.write_reg(0xFF40, 0x91 | LCDC_OBJ_ENABLE);
        ppu.step(MODE2_CYCLES + 4, &mut if_reg, &mut NullFrameSink);

        let line = line_pixels(&ppu, 0);
        // hidden behind BG color 3
        assert_eq!(line[4], bg_prefix(0) | 3);
        // over BG color 0
        assert_eq!(line[8], obj_prefix(0) | 1);
        // overlap goes to the sprite with the smaller x
        assert_eq!(line[10], obj_prefix(0) | 1);
        assert_eq!(line[12], obj_prefix(1) | 3);
    }

    #[test]
    fn dmg_sprites_order_by_x() {
        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        load_tiles(&mut ppu);
        // later OAM entry with smaller x wins the overlap
        ppu.oam.write(0xFE00, 16);
        ppu.oam.write(0xFE01, 8 + 4);
        ppu.oam.write(0xFE02, 2);
        ppu.oam.write(0xFE04, 16);
        ppu.oam.write(0xFE05, 8);
        ppu.oam.write(0xFE06, 1);
        ppu.write_reg(0xFF40, 0x91 | LCDC_OBJ_ENABLE);
        ppu.step(MODE2_CYCLES + 4, &mut if_reg, &mut NullFrameSink);

        let line = line_pixels(&ppu, 0);
        assert_eq!(line[5], obj_prefix(0) | 3);
        assert_eq!(line[9], obj_prefix(0) | 1);
    }

    #[test]
    fn cgb_attributes_select_bank_and_palette() {
        let mut ppu = Ppu::new(true);
        let mut if_reg = 0;
        ppu.vram.write_bank_select(1);
        for row in 0..8 {
            ppu.vram.write(0x8010 + row * 2, 0xFF);
        }
        ppu.vram.write(0x9800, ATTR_BANK | 0x05);
        ppu.vram.write_bank_select(0);
        ppu.vram.write(0x9800, 1);
        ppu.step(MODE2_CYCLES + 4, &mut if_reg, &mut NullFrameSink);

        assert_eq!(line_pixels(&ppu, 0)[0], bg_prefix(5) | 1);
    }

    #[test]
    fn dmg_colors_expanded_on_swap() {
        struct Capture(Option<Vec<u8>>);
        impl FrameSink for Capture {
            fn swap(&mut self, _pixels: &mut Box<FrameBuffer>, colors: &mut Box<FrameColors>) {
                self.0 = Some(colors.to_vec());
            }
        }

        let mut ppu = Ppu::new(false);
        let mut if_reg = 0;
        let mut sink = Capture(None);
        ppu.write_reg(0xFF48, 0xE4);
        ppu.step(FRAME_CYCLES, &mut if_reg, &mut sink);

        let colors = sink.0.unwrap();
        let bg = BG_ENTRY_BASE * 3;
        // BGP 0xFC: color 0 lightest, others darkest
        assert_eq!(colors[bg], 0xED);
        assert_eq!(colors[bg + 3], 0x21);
        assert_eq!(colors[3], 0x99);
    }
}
