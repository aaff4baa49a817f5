use crate::{
    apu::Apu,
    cartridge::Cartridge,
    dma::{OamDma, VramDma},
    error::Fault,
    interrupt::InterruptController,
    joypad::Joypad,
    ppu::Ppu,
    sink::{AudioSink, FrameSink},
    timer::Timer,
};

const WRAM_BANK_SIZE: usize = 0x1000;
const WRAM_BANKS: usize = 8;
const HRAM_SIZE: usize = 0x7F;
const UNUSABLE_SIZE: usize = 0x60;
const IO_SIZE: usize = 0x80;

/// Byte-addressed view of the machine used by the CPU and the DMA engines.
pub trait Bus {
    fn read_byte(&mut self, addr: u16) -> Result<u8, Fault>;
    fn write_byte(&mut self, addr: u16, val: u8) -> Result<(), Fault>;
    fn interrupts(&mut self) -> &mut InterruptController;
}

/// Owns every memory-mapped device. The address decode in
/// [`Bus::read_byte`]/[`Bus::write_byte`] is the only place that decides
/// which device answers an address.
pub struct Mmu {
    pub cart: Cartridge,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub joypad: Joypad,
    pub interrupts: InterruptController,
    pub oam_dma: OamDma,
    pub vram_dma: VramDma,
    wram: [[u8; WRAM_BANK_SIZE]; WRAM_BANKS],
    wram_bank: usize,
    hram: [u8; HRAM_SIZE],
    unusable: [u8; UNUSABLE_SIZE],
    /// I/O ports without a dedicated device (serial, KEY1, boot ROM lock...).
    io: [u8; IO_SIZE],
    cgb: bool,
}

impl Mmu {
    pub fn new(cart: Cartridge, cgb: bool) -> Self {
        let mut mmu = Self {
            cart,
            ppu: Ppu::new(cgb),
            apu: Apu::new(),
            timer: Timer::new(),
            joypad: Joypad::new(),
            interrupts: InterruptController::new(),
            oam_dma: OamDma::new(),
            vram_dma: VramDma::new(),
            wram: [[0; WRAM_BANK_SIZE]; WRAM_BANKS],
            wram_bank: 1,
            hram: [0; HRAM_SIZE],
            unusable: [0; UNUSABLE_SIZE],
            io: [0; IO_SIZE],
            cgb,
        };
        mmu.apply_boot_state();
        mmu
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    /// Return every device except the cartridge to its post-boot state.
    pub fn reset(&mut self) {
        self.ppu = Ppu::new(self.cgb);
        self.apu = Apu::new();
        self.timer = Timer::new();
        self.joypad = Joypad::new();
        self.interrupts = InterruptController::new();
        self.oam_dma = OamDma::new();
        self.vram_dma = VramDma::new();
        self.wram = [[0; WRAM_BANK_SIZE]; WRAM_BANKS];
        self.wram_bank = 1;
        self.hram = [0; HRAM_SIZE];
        self.unusable = [0; UNUSABLE_SIZE];
        self.io = [0; IO_SIZE];
        self.apply_boot_state();
    }

    fn apply_boot_state(&mut self) {
        // Boot ROM unmapped
        self.io[0x50] = 0x01;
        self.interrupts.flags = 0x01;
        self.interrupts.enable = 0x00;
    }

    pub fn tick_ppu(&mut self, cycles: u32, sink: &mut dyn FrameSink) {
        self.ppu.step(cycles, &mut self.interrupts.flags, sink);
    }

    pub fn tick_timer(&mut self, cycles: u32) {
        self.timer.step(cycles, &mut self.interrupts.flags);
    }

    pub fn tick_apu(&mut self, cycles: u32, sink: &mut dyn AudioSink) {
        self.apu.step(cycles, sink);
    }

    pub fn tick_oam_dma(&mut self, cycles: u32) -> Result<(), Fault> {
        if !self.oam_dma.is_active() {
            return Ok(());
        }
        let mut dma = std::mem::take(&mut self.oam_dma);
        let result = dma.tick(cycles, self);
        self.oam_dma = dma;
        result
    }

    pub fn tick_vram_dma(&mut self, cycles: u32) -> Result<(), Fault> {
        if !self.vram_dma.is_active() {
            return Ok(());
        }
        let mut dma = std::mem::take(&mut self.vram_dma);
        let result = dma.tick(cycles, self);
        self.vram_dma = dma;
        result
    }

    pub fn update_input(&mut self, input: u8) {
        self.joypad.update(input, &mut self.interrupts.flags);
    }
}

impl Bus for Mmu {
    fn read_byte(&mut self, addr: u16) -> Result<u8, Fault> {
        let val = match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.read(addr)?,
            0x8000..=0x9FFF => self.ppu.vram.read(addr),
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize],
            0xD000..=0xDFFF => self.wram[self.wram_bank][(addr - 0xD000) as usize],
            0xE000..=0xFDFF => return self.read_byte(addr - 0x2000),
            0xFE00..=0xFE9F => self.ppu.oam.read(addr),
            0xFEA0..=0xFEFF => self.unusable[(addr - 0xFEA0) as usize],
            0xFF00 => self.joypad.read(),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.interrupts.read_flags(),
            0xFF10..=0xFF3F => self.apu.read(addr),
            0xFF46 => self.oam_dma.read(),
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF4F => self.ppu.vram.read_bank_select(),
            0xFF4D => {
                if self.cgb {
                    self.io[0x4D] | 0x7E
                } else {
                    0xFF
                }
            }
            0xFF51..=0xFF55 => {
                if self.cgb {
                    self.vram_dma.read(addr)
                } else {
                    0xFF
                }
            }
            0xFF68..=0xFF6B => self.ppu.read_palette(addr),
            0xFF70 => {
                if self.cgb {
                    0xF8 | self.wram_bank as u8
                } else {
                    0xFF
                }
            }
            0xFF01..=0xFF7F => self.io[(addr & 0x7F) as usize],
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.interrupts.enable,
        };
        Ok(val)
    }

    fn write_byte(&mut self, addr: u16, val: u8) -> Result<(), Fault> {
        match addr {
            0xFF04 => self.timer.reset_div(),
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.write(addr, val)?,
            0x8000..=0x9FFF => self.ppu.vram.write(addr, val),
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize] = val,
            0xD000..=0xDFFF => self.wram[self.wram_bank][(addr - 0xD000) as usize] = val,
            0xE000..=0xFDFF => return self.write_byte(addr - 0x2000, val),
            0xFE00..=0xFE9F => self.ppu.oam.write(addr, val),
            0xFEA0..=0xFEFF => self.unusable[(addr - 0xFEA0) as usize] = val,
            0xFF00 => self.joypad.write(val),
            0xFF05..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.interrupts.write_flags(val),
            0xFF10..=0xFF3F => self.apu.write(addr, val),
            0xFF46 => self.oam_dma.write(val),
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val),
            0xFF4F => self.ppu.vram.write_bank_select(val),
            0xFF4D => {
                if self.cgb {
                    self.io[0x4D] = val & 0x81;
                }
            }
            0xFF51..=0xFF55 => {
                if self.cgb {
                    self.vram_dma.write(addr, val);
                }
            }
            0xFF68..=0xFF6B => self.ppu.write_palette(addr, val),
            0xFF70 => {
                if self.cgb {
                    self.wram_bank = ((val & 0x07) as usize).max(1);
                }
            }
            0xFF01..=0xFF7F => self.io[(addr & 0x7F) as usize] = val,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.interrupts.enable = val,
        }
        Ok(())
    }

    fn interrupts(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mmu(cgb: bool) -> Mmu {
        let cart = Cartridge::new(vec![0; 0x8000]).unwrap();
        Mmu::new(cart, cgb)
    }

    #[test]
    fn echo_ram_mirrors_wram() {
        let mut mmu = mmu(false);
        mmu.write_byte(0xC123, 0x5A).unwrap();
        assert_eq!(mmu.read_byte(0xE123).unwrap(), 0x5A);
        mmu.write_byte(0xFDFF, 0xA5).unwrap();
        assert_eq!(mmu.read_byte(0xDDFF).unwrap(), 0xA5);
    }

    #[test]
    fn svbk_zero_selects_bank_one() {
        let mut mmu = mmu(true);
        mmu.write_byte(0xFF70, 0x00).unwrap();
        mmu.write_byte(0xD000, 0x11).unwrap();
        mmu.write_byte(0xFF70, 0x01).unwrap();
        assert_eq!(mmu.read_byte(0xD000).unwrap(), 0x11);
        mmu.write_byte(0xFF70, 0x03).unwrap();
        assert_eq!(mmu.read_byte(0xD000).unwrap(), 0x00);
        assert_eq!(mmu.read_byte(0xFF70).unwrap(), 0xFB);
    }

    #[test]
    fn dmg_ignores_svbk() {
        let mut mmu = mmu(false);
        mmu.write_byte(0xD000, 0x22).unwrap();
        mmu.write_byte(0xFF70, 0x05).unwrap();
        assert_eq!(mmu.read_byte(0xD000).unwrap(), 0x22);
        assert_eq!(mmu.read_byte(0xFF70).unwrap(), 0xFF);
    }

    #[test]
    fn div_write_resets() {
        let mut mmu = mmu(false);
        mmu.tick_timer(1024);
        assert_eq!(mmu.read_byte(0xFF04).unwrap(), 4);
        mmu.write_byte(0xFF04, 0x99).unwrap();
        assert_eq!(mmu.read_byte(0xFF04).unwrap(), 0);
    }

    #[test]
    fn oam_dma_through_bus() {
        let mut mmu = mmu(false);
        for i in 0..0xA0u16 {
            mmu.write_byte(0xC000 + i, i as u8).unwrap();
        }
        mmu.write_byte(0xFF46, 0xC0).unwrap();
        assert_eq!(mmu.read_byte(0xFF46).unwrap(), 0xFF);
        mmu.tick_oam_dma(0xA0).unwrap();
        assert_eq!(mmu.read_byte(0xFE00).unwrap(), 0);
        assert_eq!(mmu.read_byte(0xFE9F).unwrap(), 0x9F);
        assert_eq!(mmu.read_byte(0xFF46).unwrap(), 0xC0);
    }

    #[test]
    fn unusable_area_is_backed() {
        let mut mmu = mmu(false);
        mmu.write_byte(0xFEA0, 0x42).unwrap();
        assert_eq!(mmu.read_byte(0xFEA0).unwrap(), 0x42);
    }

    #[test]
    fn interrupt_registers() {
        let mut mmu = mmu(false);
        mmu.write_byte(0xFFFF, 0x1F).unwrap();
        mmu.write_byte(0xFF0F, 0x04).unwrap();
        assert_eq!(mmu.read_byte(0xFF0F).unwrap(), 0xE4);
        assert!(mmu.interrupts().has_pending());
    }

    #[test]
    fn reset_keeps_cartridge() {
        let mut mmu = mmu(true);
        mmu.write_byte(0xC000, 0x77).unwrap();
        mmu.reset();
        assert_eq!(mmu.read_byte(0xC000).unwrap(), 0);
        assert_eq!(mmu.read_byte(0xFF40).unwrap(), 0x91);
        assert_eq!(mmu.read_byte(0xFF50).unwrap(), 0x01);
    }
}
