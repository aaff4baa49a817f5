use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{debug, info};

use crate::error::{CartridgeError, Fault};
use crate::header::{HEADER_END, Header};

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

// BGB/VBA-M style clock footer appended to the battery file
const RTC_FOOTER_LEN: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc3,
    Mbc5,
}

impl MbcType {
    fn from_cart_type(cart_type: u8) -> Result<Self, CartridgeError> {
        match cart_type {
            0x00 => Ok(MbcType::NoMbc),
            0x01 | 0x03 => Ok(MbcType::Mbc1),
            0x10 | 0x13 => Ok(MbcType::Mbc3),
            0x19 | 0x1B => Ok(MbcType::Mbc5),
            other => Err(CartridgeError::UnsupportedType(other)),
        }
    }
}

/// ROM image plus external RAM behind one of the supported bank controllers.
#[derive(Debug)]
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    pub mbc: MbcType,
    cart_type: u8,
    rom_banks: usize,
    ram_banks: usize,
    mbc_state: MbcState,
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_low: u8,
        upper: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        /// 0x00-0x03 selects a RAM bank, 0x08-0x0C a clock register.
        select: u8,
        ram_enable: bool,
        rtc: Option<Rtc>,
        latch_armed: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

/// MBC3 clock driven by host wall time.
#[derive(Debug, Clone)]
struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    last_update: SystemTime,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }

    fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.seconds & 0x3F,
            0x09 => self.minutes & 0x3F,
            0x0A => self.hours & 0x1F,
            0x0B => (self.days & 0x00FF) as u8,
            0x0C => self.control_byte(),
            _ => 0xFF,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        for reg in 0x08..=0x0C {
            out.extend_from_slice(&(self.read(reg) as u32).to_le_bytes());
        }
    }

    fn decode(words: &[u8]) -> Self {
        let word = |i: usize| words[i * 4];
        let control = word(4);
        Self {
            seconds: word(0) & 0x3F,
            minutes: word(1) & 0x3F,
            hours: word(2) & 0x1F,
            days: word(3) as u16 | (((control & 0x01) as u16) << 8),
            halt: control & 0x40 != 0,
            carry: control & 0x80 != 0,
        }
    }
}

impl Rtc {
    fn new(now: SystemTime) -> Self {
        let regs = RtcRegisters::default();
        Self {
            regs,
            latched: regs,
            last_update: now,
        }
    }

    /// Fold whole seconds elapsed since the last update into the counters.
    fn sync(&mut self, now: SystemTime) {
        if self.regs.halt {
            self.last_update = now;
            return;
        }
        let elapsed = now
            .duration_since(self.last_update)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        if elapsed > 0 {
            self.advance_seconds(elapsed);
            self.last_update += Duration::from_secs(elapsed);
        }
    }

    fn latch(&mut self) {
        self.latched = self.regs;
    }

    fn write_register(&mut self, reg: u8, value: u8, now: SystemTime) {
        self.sync(now);
        match reg {
            0x08 => {
                self.regs.seconds = value & 0x3F;
                self.last_update = now;
            }
            0x09 => self.regs.minutes = value & 0x3F,
            0x0A => self.regs.hours = value & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | value as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.regs.halt = value & 0x40 != 0;
                self.regs.carry = value & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        while seconds > 0 {
            let until_minute_tick = self.seconds_until_minute_tick();
            if seconds < until_minute_tick {
                self.regs.seconds = ((self.regs.seconds as u64 + seconds) & 0x3F) as u8;
                return;
            }

            seconds -= until_minute_tick;
            self.regs.seconds = 0;
            self.minute_tick();
        }
    }

    fn seconds_until_minute_tick(&self) -> u64 {
        // Out-of-range values written by software count up to 63 and wrap.
        let sec = self.regs.seconds as u64;
        if sec <= 59 { 60 - sec } else { 64 - sec + 60 }
    }

    fn minute_tick(&mut self) {
        let overflow = self.regs.minutes == 59;
        self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        if overflow {
            self.regs.minutes = 0;
            self.hour_tick();
        }
    }

    fn hour_tick(&mut self) {
        let overflow = self.regs.hours == 23;
        self.regs.hours = (self.regs.hours + 1) & 0x1F;
        if overflow {
            self.regs.hours = 0;
            self.day_tick();
        }
    }

    fn day_tick(&mut self) {
        if self.regs.days >= 0x01FF {
            self.regs.days = 0;
            self.regs.carry = true;
        } else {
            self.regs.days += 1;
        }
    }

    fn footer(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RTC_FOOTER_LEN);
        self.regs.encode(&mut out);
        self.latched.encode(&mut out);
        let stamp = self
            .last_update
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        out.extend_from_slice(&stamp.to_le_bytes());
        out
    }

    fn load_footer(&mut self, footer: &[u8]) {
        self.regs = RtcRegisters::decode(&footer[0..20]);
        self.latched = RtcRegisters::decode(&footer[20..40]);
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&footer[40..48]);
        self.last_update = UNIX_EPOCH + Duration::from_secs(u64::from_le_bytes(stamp));
    }
}

fn rom_bank_count(code: u8) -> Result<usize, CartridgeError> {
    match code {
        0x00..=0x08 => Ok(2 << code),
        0x52 => Ok(72),
        0x53 => Ok(80),
        0x54 => Ok(96),
        other => Err(CartridgeError::InvalidRomSize(other)),
    }
}

fn ram_size(code: u8) -> Result<usize, CartridgeError> {
    match code {
        0x00 => Ok(0),
        0x01 => Ok(0x800),   // 2KB
        0x02 => Ok(0x2000),  // 8KB
        0x03 => Ok(0x8000),  // 32KB (4 banks)
        0x04 => Ok(0x20000), // 128KB (16 banks)
        0x05 => Ok(0x10000), // 64KB (8 banks)
        other => Err(CartridgeError::InvalidRamSize(other)),
    }
}

fn check_bank(bank: usize, banks: usize) -> Result<(), Fault> {
    if bank >= banks {
        return Err(Fault::BankOutOfRange { bank, banks });
    }
    Ok(())
}

// MBC1 carts up to 512 KiB only use the 2-bit register as a RAM bank.
const MBC1_SMALL_ROM_BANKS: usize = 32;

/// Bank an MBC1 maps at 0x4000-0x7FFF.
fn mbc1_rom_bank(rom_low: u8, upper: u8, mode: u8, rom_banks: usize) -> usize {
    if mode == 0 && rom_banks > MBC1_SMALL_ROM_BANKS {
        ((upper as usize) << 5) | rom_low as usize
    } else {
        rom_low as usize
    }
}

/// Reject an MBC1 register state that maps a bank the cart does not have.
fn check_mbc1(
    rom_low: u8,
    upper: u8,
    mode: u8,
    rom_banks: usize,
    ram_banks: usize,
) -> Result<(), Fault> {
    check_bank(mbc1_rom_bank(rom_low, upper, mode, rom_banks), rom_banks)?;
    if mode == 1 && ram_banks > 0 {
        check_bank(upper as usize, ram_banks)?;
    }
    Ok(())
}

impl Cartridge {
    /// Build the controller named by the type byte at 0x147.
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.len() < HEADER_END {
            return Err(CartridgeError::TooSmall { len: rom.len() });
        }
        let header = Header::parse(&rom);
        let cart_type = header.cart_type();
        let mbc = MbcType::from_cart_type(cart_type)?;
        let rom_banks = rom_bank_count(header.rom_size_code())?;
        let ram_len = ram_size(header.ram_size_code())?;

        let expected = rom_banks * ROM_BANK_SIZE;
        if rom.len() < expected {
            return Err(CartridgeError::RomTruncated {
                expected,
                actual: rom.len(),
            });
        }

        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_low: 1,
                upper: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                select: 0,
                ram_enable: false,
                rtc: (cart_type == 0x10).then(|| Rtc::new(SystemTime::now())),
                latch_armed: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        let ram = if mbc == MbcType::NoMbc {
            Vec::new()
        } else {
            vec![0; ram_len]
        };
        let ram_banks = ram.len().div_ceil(RAM_BANK_SIZE);

        Ok(Self {
            rom,
            ram,
            mbc,
            cart_type,
            rom_banks,
            ram_banks,
            mbc_state,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        let cart = Self::new(data)?;
        info!(
            "Loaded ROM: {} (MBC: {:?}, CGB: {})",
            cart.header().title(),
            cart.mbc,
            if cart.header().cgb_supported() {
                "yes"
            } else {
                "no"
            }
        );
        Ok(cart)
    }

    pub fn header(&self) -> Header<'_> {
        Header::parse(&self.rom)
    }

    pub fn rom_banks(&self) -> usize {
        self.rom_banks
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn read(&self, addr: u16) -> Result<u8, Fault> {
        match addr {
            0x0000..=0x3FFF => Ok(self.rom[addr as usize]),
            0x4000..=0x7FFF => {
                let bank = self.rom_bank();
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().ok_or(Fault::BankOutOfRange {
                    bank,
                    banks: self.rom_banks,
                })
            }
            0xA000..=0xBFFF => Ok(self.read_ram(addr)),
            _ => Err(Fault::UnreachableAddress { addr }),
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) -> Result<(), Fault> {
        if (0xA000..=0xBFFF).contains(&addr) && !matches!(self.mbc_state, MbcState::NoMbc) {
            self.write_ram(addr, val);
            return Ok(());
        }
        let rom_banks = self.rom_banks;
        let mbc1_ram_banks = self.ram_banks;
        let ram_banks = self.ram_banks.max(1);
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, 0x0000..=0x7FFF | 0xA000..=0xBFFF) => {
                debug!("Ignoring write {val:#04X} to ROM-only cartridge at {addr:#06X}");
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (
                MbcState::Mbc1 {
                    rom_low,
                    upper,
                    mode,
                    ..
                },
                0x2000..=0x3FFF,
            ) => {
                let low = match val & 0x1F {
                    0 => 1,
                    v => v,
                };
                check_mbc1(low, *upper, *mode, rom_banks, mbc1_ram_banks)?;
                *rom_low = low;
            }
            (
                MbcState::Mbc1 {
                    rom_low,
                    upper,
                    mode,
                    ..
                },
                0x4000..=0x5FFF,
            ) => {
                let bits = val & 0x03;
                check_mbc1(*rom_low, bits, *mode, rom_banks, mbc1_ram_banks)?;
                *upper = bits;
            }
            (
                MbcState::Mbc1 {
                    rom_low,
                    upper,
                    mode,
                    ..
                },
                0x6000..=0x7FFF,
            ) => {
                let new_mode = val & 0x01;
                check_mbc1(*rom_low, *upper, new_mode, rom_banks, mbc1_ram_banks)?;
                *mode = new_mode;
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                let bank = match val & 0x7F {
                    0 => 1,
                    v => v,
                };
                check_bank(bank as usize, rom_banks)?;
                *rom_bank = bank;
            }
            (MbcState::Mbc3 { select, .. }, 0x4000..=0x5FFF) => match val {
                0x00..=0x07 => {
                    check_bank(val as usize, ram_banks)?;
                    *select = val;
                }
                0x08..=0x0C => *select = val,
                _ => debug!("Ignoring MBC3 select {val:#04X}"),
            },
            (
                MbcState::Mbc3 {
                    rtc, latch_armed, ..
                },
                0x6000..=0x7FFF,
            ) => {
                if val == 0x01
                    && *latch_armed
                    && let Some(rtc) = rtc
                {
                    rtc.sync(SystemTime::now());
                    rtc.latch();
                }
                *latch_armed = val == 0x00;
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                let bank = (*rom_bank & 0x100) | val as u16;
                check_bank(bank as usize, rom_banks)?;
                *rom_bank = bank;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                let bank = (*rom_bank & 0xFF) | (((val & 0x01) as u16) << 8);
                check_bank(bank as usize, rom_banks)?;
                *rom_bank = bank;
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                let bank = val & 0x0F;
                check_bank(bank as usize, ram_banks)?;
                *ram_bank = bank;
            }
            (MbcState::Mbc5 { .. }, 0x6000..=0x7FFF) => {}
            _ => return Err(Fault::UnreachableAddress { addr }),
        }
        Ok(())
    }

    /// Bank mapped at 0x4000-0x7FFF.
    fn rom_bank(&self) -> usize {
        match &self.mbc_state {
            MbcState::NoMbc => 1,
            MbcState::Mbc1 {
                rom_low,
                upper,
                mode,
                ..
            } => mbc1_rom_bank(*rom_low, *upper, *mode, self.rom_banks),
            MbcState::Mbc3 { rom_bank, .. } => *rom_bank as usize,
            MbcState::Mbc5 { rom_bank, .. } => *rom_bank as usize,
        }
    }

    /// Offset into `ram` for an enabled RAM access, or `None` when RAM is
    /// disabled, absent, or a clock register is selected.
    fn ram_offset(&self, addr: u16) -> Option<usize> {
        let bank = match &self.mbc_state {
            MbcState::NoMbc => return None,
            MbcState::Mbc1 {
                ram_enable, upper, mode, ..
            } => {
                if !*ram_enable {
                    return None;
                }
                if *mode == 1 { *upper as usize } else { 0 }
            }
            MbcState::Mbc3 {
                ram_enable, select, ..
            } => {
                if !*ram_enable || *select > 0x07 {
                    return None;
                }
                *select as usize
            }
            MbcState::Mbc5 {
                ram_enable,
                ram_bank,
                ..
            } => {
                if !*ram_enable {
                    return None;
                }
                *ram_bank as usize
            }
        };
        if self.ram.is_empty() {
            return None;
        }
        Some((bank * RAM_BANK_SIZE + (addr as usize - 0xA000)) % self.ram.len())
    }

    fn read_ram(&self, addr: u16) -> u8 {
        if let MbcState::Mbc3 {
            ram_enable: true,
            select: reg @ 0x08..=0x0C,
            rtc,
            ..
        } = &self.mbc_state
        {
            return rtc.as_ref().map_or(0xFF, |rtc| rtc.latched.read(*reg));
        }
        match self.ram_offset(addr) {
            Some(offset) => self.ram[offset],
            None => 0xFF,
        }
    }

    fn write_ram(&mut self, addr: u16, val: u8) {
        if let MbcState::Mbc3 {
            ram_enable: true,
            select: reg @ 0x08..=0x0C,
            rtc,
            ..
        } = &mut self.mbc_state
        {
            if let Some(rtc) = rtc {
                rtc.write_register(*reg, val, SystemTime::now());
            }
            return;
        }
        if let Some(offset) = self.ram_offset(addr) {
            self.ram[offset] = val;
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(self.cart_type, 0x03 | 0x10 | 0x13 | 0x1B)
    }

    fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match &mut self.mbc_state {
            MbcState::Mbc3 { rtc: Some(rtc), .. } => Some(rtc),
            _ => None,
        }
    }

    /// Conventional battery file location next to the ROM.
    pub fn battery_path(rom_path: &Path) -> PathBuf {
        rom_path.with_extension("sav")
    }

    /// Restore battery RAM (and the clock, if present) from `path`.
    ///
    /// Returns `Ok(false)` when the cartridge has no battery or the file does
    /// not exist yet.
    pub fn load_battery(&mut self, path: &Path) -> Result<bool, CartridgeError> {
        if !self.has_battery() {
            return Ok(false);
        }
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        for (d, s) in self.ram.iter_mut().zip(bytes.iter()) {
            *d = *s;
        }
        let ram_len = self.ram.len();
        if let Some(rtc) = self.rtc_mut() {
            if let Some(footer) = bytes.get(ram_len..ram_len + RTC_FOOTER_LEN) {
                rtc.load_footer(footer);
            }
            rtc.sync(SystemTime::now());
            rtc.latch();
        }
        info!("Loaded battery RAM from {}", path.display());
        Ok(true)
    }

    /// Write battery RAM (and the clock, if present) to `path`.
    pub fn save_battery(&mut self, path: &Path) -> io::Result<bool> {
        if !self.has_battery() {
            return Ok(false);
        }
        let mut data = self.ram.clone();
        if let Some(rtc) = self.rtc_mut() {
            rtc.sync(SystemTime::now());
            data.extend_from_slice(&rtc.footer());
        }
        if data.is_empty() {
            return Ok(false);
        }
        fs::write(path, data)?;
        Ok(true)
    }
}
