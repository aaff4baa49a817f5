use log::debug;
#[cfg(feature = "cpu-trace")]
use log::trace;

use crate::error::Fault;
use crate::interrupt::NO_INTERRUPT;
use crate::mmu::Bus;
use crate::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z, Registers};

const CB_PREFIX: u8 = 0xCB;

// Machine cycles spent pushing PC and jumping to an interrupt vector
const INTERRUPT_CYCLES: u8 = 2;

const KEY1: u16 = 0xFF4D;
const KEY1_PREPARE: u8 = 0x01;
const KEY1_DOUBLE_SPEED: u8 = 0x80;

// Selectors shared by the 8-bit register encodings in the opcode tables
const REG_HL_INDIRECT: u8 = 6;

// ALU operation encoded in bits 3-5 of 0x80-0xBF and the d8 forms
const ALU_ADD: u8 = 0;
const ALU_ADC: u8 = 1;
const ALU_SUB: u8 = 2;
const ALU_SBC: u8 = 3;
const ALU_AND: u8 = 4;
const ALU_XOR: u8 = 5;
const ALU_OR: u8 = 6;
const ALU_CP: u8 = 7;

pub struct Cpu {
    pub regs: Registers,
    pub halted: bool,
    pub double_speed: bool,
    cgb: bool,
}

impl Cpu {
    /// CPU in the state the boot ROM hands over to the cartridge.
    pub fn new(cgb: bool) -> Self {
        Self {
            regs: Registers::post_boot(cgb),
            halted: false,
            double_speed: false,
            cgb,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.cgb);
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} SP:{:04X} PC:{:04X}",
            self.regs.af(),
            self.regs.bc(),
            self.regs.de(),
            self.regs.hl(),
            self.regs.sp,
            self.regs.pc
        )
    }

    /// Execute one instruction, one halted cycle or one interrupt dispatch
    /// and return the machine cycles it took.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<u8, Fault> {
        let vector = bus.interrupts().next_vector();
        if vector != NO_INTERRUPT {
            self.halted = false;
            self.push(bus, self.regs.pc)?;
            self.regs.pc = vector;
            return Ok(INTERRUPT_CYCLES);
        }

        if self.halted {
            // With IME clear a pending request only ends the halt
            if bus.interrupts().has_pending() {
                self.halted = false;
            }
            return Ok(1);
        }

        #[cfg(feature = "cpu-trace")]
        trace!("{}", self.debug_state());

        let pc = self.regs.pc;
        let opcode = self.fetch8(bus)?;
        self.execute(bus, opcode, pc)
    }

    fn fetch8<B: Bus>(&mut self, bus: &mut B) -> Result<u8, Fault> {
        let val = bus.read_byte(self.regs.pc)?;
        self.regs.pc = self.regs.pc.wrapping_add(1);
        Ok(val)
    }

    fn fetch16<B: Bus>(&mut self, bus: &mut B) -> Result<u16, Fault> {
        let lo = self.fetch8(bus)? as u16;
        let hi = self.fetch8(bus)? as u16;
        Ok((hi << 8) | lo)
    }

    fn push<B: Bus>(&mut self, bus: &mut B, val: u16) -> Result<(), Fault> {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write_byte(self.regs.sp, (val >> 8) as u8)?;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write_byte(self.regs.sp, val as u8)
    }

    fn pop<B: Bus>(&mut self, bus: &mut B) -> Result<u16, Fault> {
        let lo = bus.read_byte(self.regs.sp)? as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = bus.read_byte(self.regs.sp)? as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        Ok((hi << 8) | lo)
    }

    fn read_reg<B: Bus>(&mut self, bus: &mut B, index: u8) -> Result<u8, Fault> {
        Ok(match index {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            REG_HL_INDIRECT => bus.read_byte(self.regs.hl())?,
            _ => self.regs.a,
        })
    }

    fn write_reg<B: Bus>(&mut self, bus: &mut B, index: u8, val: u8) -> Result<(), Fault> {
        match index {
            0 => self.regs.b = val,
            1 => self.regs.c = val,
            2 => self.regs.d = val,
            3 => self.regs.e = val,
            4 => self.regs.h = val,
            5 => self.regs.l = val,
            REG_HL_INDIRECT => bus.write_byte(self.regs.hl(), val)?,
            _ => self.regs.a = val,
        }
        Ok(())
    }

    /// BC, DE, HL, SP as encoded in bits 4-5.
    fn pair(&self, index: u8) -> u16 {
        match index {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    fn set_pair(&mut self, index: u8, val: u16) {
        match index {
            0 => self.regs.set_bc(val),
            1 => self.regs.set_de(val),
            2 => self.regs.set_hl(val),
            _ => self.regs.sp = val,
        }
    }

    /// PUSH/POP encoding, where index 3 is AF instead of SP.
    fn stack_pair(&self, index: u8) -> u16 {
        if index == 3 {
            self.regs.af()
        } else {
            self.pair(index)
        }
    }

    fn set_stack_pair(&mut self, index: u8, val: u16) {
        if index == 3 {
            self.regs.set_af(val);
        } else {
            self.set_pair(index, val);
        }
    }

    /// NZ, Z, NC, C as encoded in bits 3-4.
    fn condition(&self, cc: u8) -> bool {
        match cc & 0x03 {
            0 => !self.regs.flag(FLAG_Z),
            1 => self.regs.flag(FLAG_Z),
            2 => !self.regs.flag(FLAG_C),
            _ => self.regs.flag(FLAG_C),
        }
    }

    fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        let f = if z { FLAG_Z } else { 0 }
            | if n { FLAG_N } else { 0 }
            | if h { FLAG_H } else { 0 }
            | if c { FLAG_C } else { 0 };
        self.regs.set_f(f);
    }

    fn alu(&mut self, op: u8, val: u8) {
        let a = self.regs.a;
        let carry = self.regs.flag(FLAG_C) as u8;
        match op {
            ALU_ADD | ALU_ADC => {
                let c = if op == ALU_ADC { carry } else { 0 };
                let res = a as u16 + val as u16 + c as u16;
                self.regs.a = res as u8;
                self.set_flags(
                    res as u8 == 0,
                    false,
                    (a & 0x0F) + (val & 0x0F) + c > 0x0F,
                    res > 0xFF,
                );
            }
            ALU_SUB | ALU_SBC | ALU_CP => {
                let c = if op == ALU_SBC { carry } else { 0 };
                let res = a.wrapping_sub(val).wrapping_sub(c);
                self.set_flags(
                    res == 0,
                    true,
                    (a & 0x0F) < (val & 0x0F) + c,
                    (a as u16) < val as u16 + c as u16,
                );
                if op != ALU_CP {
                    self.regs.a = res;
                }
            }
            ALU_AND => {
                self.regs.a = a & val;
                self.set_flags(self.regs.a == 0, false, true, false);
            }
            ALU_XOR => {
                self.regs.a = a ^ val;
                self.set_flags(self.regs.a == 0, false, false, false);
            }
            _ => {
                self.regs.a = a | val;
                self.set_flags(self.regs.a == 0, false, false, false);
            }
        }
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        let c = self.regs.flag(FLAG_C);
        self.set_flags(res == 0, false, val & 0x0F == 0x0F, c);
        res
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        let c = self.regs.flag(FLAG_C);
        self.set_flags(res == 0, true, val & 0x0F == 0, c);
        res
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.regs.hl();
        let z = self.regs.flag(FLAG_Z);
        self.set_flags(
            z,
            false,
            (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF,
            hl as u32 + val as u32 > 0xFFFF,
        );
        self.regs.set_hl(hl.wrapping_add(val));
    }

    /// SP plus a signed offset, with H and C taken from the low byte add.
    fn sp_offset(&mut self, offset: u8) -> u16 {
        let sp = self.regs.sp;
        let low = offset as u16;
        self.set_flags(
            false,
            false,
            (sp & 0x0F) + (low & 0x0F) > 0x0F,
            (sp & 0xFF) + low > 0xFF,
        );
        sp.wrapping_add(offset as i8 as i16 as u16)
    }

    fn jump_relative(&mut self, offset: u8) {
        self.regs.pc = self.regs.pc.wrapping_add(offset as i8 as i16 as u16);
    }

    fn daa(&mut self) {
        let mut a = self.regs.a;
        let n = self.regs.flag(FLAG_N);
        let h = self.regs.flag(FLAG_H);
        let mut c = self.regs.flag(FLAG_C);
        if n {
            let mut adjust = 0;
            if h {
                adjust |= 0x06;
            }
            if c {
                adjust |= 0x60;
            }
            a = a.wrapping_sub(adjust);
        } else {
            let mut adjust = 0;
            if h || a & 0x0F > 0x09 {
                adjust |= 0x06;
            }
            if c || a > 0x99 {
                adjust |= 0x60;
                c = true;
            }
            a = a.wrapping_add(adjust);
        }
        self.regs.a = a;
        self.set_flags(a == 0, n, false, c);
    }

    fn stop<B: Bus>(&mut self, bus: &mut B, pc: u16) -> Result<(), Fault> {
        let key1 = if self.cgb { bus.read_byte(KEY1)? } else { 0 };
        if key1 & KEY1_PREPARE == 0 {
            debug!("STOP at {pc:#06X} without a prepared speed switch");
            return Ok(());
        }
        self.double_speed = !self.double_speed;
        debug!(
            "Speed switch to {} speed",
            if self.double_speed { "double" } else { "normal" }
        );
        bus.write_byte(
            KEY1,
            if self.double_speed {
                KEY1_DOUBLE_SPEED
            } else {
                0
            },
        )
    }

    fn execute<B: Bus>(&mut self, bus: &mut B, opcode: u8, pc: u16) -> Result<u8, Fault> {
        let cycles = match opcode {
            0x00 => 1,
            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.fetch16(bus)?;
                self.set_pair((opcode >> 4) & 0x03, val);
                3
            }
            0x02 => {
                bus.write_byte(self.regs.bc(), self.regs.a)?;
                2
            }
            0x12 => {
                bus.write_byte(self.regs.de(), self.regs.a)?;
                2
            }
            0x22 => {
                let hl = self.regs.hl();
                bus.write_byte(hl, self.regs.a)?;
                self.regs.set_hl(hl.wrapping_add(1));
                2
            }
            0x32 => {
                let hl = self.regs.hl();
                bus.write_byte(hl, self.regs.a)?;
                self.regs.set_hl(hl.wrapping_sub(1));
                2
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let index = (opcode >> 4) & 0x03;
                self.set_pair(index, self.pair(index).wrapping_add(1));
                2
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let index = (opcode >> 4) & 0x03;
                self.set_pair(index, self.pair(index).wrapping_sub(1));
                2
            }
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = (opcode >> 3) & 0x07;
                let val = self.read_reg(bus, r)?;
                let res = self.inc8(val);
                self.write_reg(bus, r, res)?;
                if r == REG_HL_INDIRECT { 3 } else { 1 }
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = (opcode >> 3) & 0x07;
                let val = self.read_reg(bus, r)?;
                let res = self.dec8(val);
                self.write_reg(bus, r, res)?;
                if r == REG_HL_INDIRECT { 3 } else { 1 }
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let r = (opcode >> 3) & 0x07;
                let val = self.fetch8(bus)?;
                self.write_reg(bus, r, val)?;
                if r == REG_HL_INDIRECT { 3 } else { 2 }
            }
            0x07 => {
                let a = self.regs.a;
                self.regs.a = a.rotate_left(1);
                self.set_flags(false, false, false, a & 0x80 != 0);
                1
            }
            0x0F => {
                let a = self.regs.a;
                self.regs.a = a.rotate_right(1);
                self.set_flags(false, false, false, a & 0x01 != 0);
                1
            }
            0x17 => {
                let a = self.regs.a;
                let carry_in = self.regs.flag(FLAG_C) as u8;
                self.regs.a = (a << 1) | carry_in;
                self.set_flags(false, false, false, a & 0x80 != 0);
                1
            }
            0x1F => {
                let a = self.regs.a;
                let carry_in = if self.regs.flag(FLAG_C) { 0x80 } else { 0 };
                self.regs.a = (a >> 1) | carry_in;
                self.set_flags(false, false, false, a & 0x01 != 0);
                1
            }
            0x08 => {
                let addr = self.fetch16(bus)?;
                bus.write_byte(addr, self.regs.sp as u8)?;
                bus.write_byte(addr.wrapping_add(1), (self.regs.sp >> 8) as u8)?;
                5
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                self.add_hl(self.pair((opcode >> 4) & 0x03));
                2
            }
            0x0A => {
                self.regs.a = bus.read_byte(self.regs.bc())?;
                2
            }
            0x1A => {
                self.regs.a = bus.read_byte(self.regs.de())?;
                2
            }
            0x2A => {
                let hl = self.regs.hl();
                self.regs.a = bus.read_byte(hl)?;
                self.regs.set_hl(hl.wrapping_add(1));
                2
            }
            0x3A => {
                let hl = self.regs.hl();
                self.regs.a = bus.read_byte(hl)?;
                self.regs.set_hl(hl.wrapping_sub(1));
                2
            }
            0x10 => {
                self.stop(bus, pc)?;
                1
            }
            0x18 => {
                let offset = self.fetch8(bus)?;
                self.jump_relative(offset);
                3
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch8(bus)?;
                if self.condition(opcode >> 3) {
                    self.jump_relative(offset);
                    3
                } else {
                    2
                }
            }
            0x27 => {
                self.daa();
                1
            }
            0x2F => {
                self.regs.a = !self.regs.a;
                let f = self.regs.f();
                self.regs.set_f(f | FLAG_N | FLAG_H);
                1
            }
            0x37 => {
                let z = self.regs.flag(FLAG_Z);
                self.set_flags(z, false, false, true);
                1
            }
            0x3F => {
                let z = self.regs.flag(FLAG_Z);
                let c = self.regs.flag(FLAG_C);
                self.set_flags(z, false, false, !c);
                1
            }
            0x76 => {
                self.halted = true;
                1
            }
            0x40..=0x7F => {
                let dst = (opcode >> 3) & 0x07;
                let src = opcode & 0x07;
                let val = self.read_reg(bus, src)?;
                self.write_reg(bus, dst, val)?;
                if dst == REG_HL_INDIRECT || src == REG_HL_INDIRECT {
                    2
                } else {
                    1
                }
            }
            0x80..=0xBF => {
                let src = opcode & 0x07;
                let val = self.read_reg(bus, src)?;
                self.alu((opcode >> 3) & 0x07, val);
                if src == REG_HL_INDIRECT { 2 } else { 1 }
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.fetch8(bus)?;
                self.alu((opcode >> 3) & 0x07, val);
                2
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if self.condition(opcode >> 3) {
                    self.regs.pc = self.pop(bus)?;
                    5
                } else {
                    2
                }
            }
            0xC9 => {
                self.regs.pc = self.pop(bus)?;
                4
            }
            0xD9 => {
                self.regs.pc = self.pop(bus)?;
                bus.interrupts().enable_master();
                4
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let addr = self.fetch16(bus)?;
                if self.condition(opcode >> 3) {
                    self.regs.pc = addr;
                    4
                } else {
                    3
                }
            }
            0xC3 => {
                self.regs.pc = self.fetch16(bus)?;
                4
            }
            0xE9 => {
                self.regs.pc = self.regs.hl();
                1
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let addr = self.fetch16(bus)?;
                if self.condition(opcode >> 3) {
                    self.push(bus, self.regs.pc)?;
                    self.regs.pc = addr;
                    6
                } else {
                    3
                }
            }
            0xCD => {
                let addr = self.fetch16(bus)?;
                self.push(bus, self.regs.pc)?;
                self.regs.pc = addr;
                6
            }
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let val = self.pop(bus)?;
                self.set_stack_pair((opcode >> 4) & 0x03, val);
                3
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let val = self.stack_pair((opcode >> 4) & 0x03);
                self.push(bus, val)?;
                4
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.push(bus, self.regs.pc)?;
                self.regs.pc = (opcode & 0x38) as u16;
                4
            }
            0xCB => {
                let cb = self.fetch8(bus)?;
                self.execute_cb(bus, cb)?
            }
            0xE0 => {
                let offset = self.fetch8(bus)?;
                bus.write_byte(0xFF00 | offset as u16, self.regs.a)?;
                3
            }
            0xF0 => {
                let offset = self.fetch8(bus)?;
                self.regs.a = bus.read_byte(0xFF00 | offset as u16)?;
                3
            }
            0xE2 => {
                bus.write_byte(0xFF00 | self.regs.c as u16, self.regs.a)?;
                2
            }
            0xF2 => {
                self.regs.a = bus.read_byte(0xFF00 | self.regs.c as u16)?;
                2
            }
            0xEA => {
                let addr = self.fetch16(bus)?;
                bus.write_byte(addr, self.regs.a)?;
                4
            }
            0xFA => {
                let addr = self.fetch16(bus)?;
                self.regs.a = bus.read_byte(addr)?;
                4
            }
            0xE8 => {
                let offset = self.fetch8(bus)?;
                self.regs.sp = self.sp_offset(offset);
                4
            }
            0xF8 => {
                let offset = self.fetch8(bus)?;
                let val = self.sp_offset(offset);
                self.regs.set_hl(val);
                3
            }
            0xF9 => {
                self.regs.sp = self.regs.hl();
                2
            }
            0xF3 => {
                bus.interrupts().disable_master();
                1
            }
            0xFB => {
                bus.interrupts().enable_master();
                1
            }
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                return Err(Fault::UnknownOpcode {
                    opcode,
                    prefixed: false,
                    pc,
                });
            }
        };
        Ok(cycles)
    }

    /// Extended table. Cycle counts include the prefix fetch.
    fn execute_cb<B: Bus>(&mut self, bus: &mut B, opcode: u8) -> Result<u8, Fault> {
        let r = opcode & 0x07;
        let bit = (opcode >> 3) & 0x07;
        let val = self.read_reg(bus, r)?;
        match opcode >> 6 {
            0 => {
                let carry_in = self.regs.flag(FLAG_C) as u8;
                let (res, carry) = match bit {
                    0 => (val.rotate_left(1), val & 0x80 != 0),
                    1 => (val.rotate_right(1), val & 0x01 != 0),
                    2 => ((val << 1) | carry_in, val & 0x80 != 0),
                    3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
                    4 => (val << 1, val & 0x80 != 0),
                    5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
                    6 => (val.rotate_left(4), false),
                    _ => (val >> 1, val & 0x01 != 0),
                };
                self.write_reg(bus, r, res)?;
                self.set_flags(res == 0, false, false, carry);
            }
            1 => {
                let c = self.regs.flag(FLAG_C);
                self.set_flags(val & (1 << bit) == 0, false, true, c);
                return Ok(if r == REG_HL_INDIRECT { 3 } else { 2 });
            }
            2 => self.write_reg(bus, r, val & !(1 << bit))?,
            _ => self.write_reg(bus, r, val | (1 << bit))?,
        }
        Ok(if r == REG_HL_INDIRECT { 4 } else { 2 })
    }
}
