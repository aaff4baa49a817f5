// Interrupt vectors (gbdev.io/pandocs/Interrupts.html)
const INTERRUPT_VBLANK: u16 = 0x40;
const INTERRUPT_STAT: u16 = 0x48;
const INTERRUPT_TIMER: u16 = 0x50;
const INTERRUPT_SERIAL: u16 = 0x58;
const INTERRUPT_JOYPAD: u16 = 0x60;

/// Returned by [`InterruptController::next_vector`] when nothing is dispatched.
pub const NO_INTERRUPT: u16 = 0x0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    /// Highest priority first.
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::Stat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub fn bit(self) -> u8 {
        match self {
            Interrupt::VBlank => 0x01,
            Interrupt::Stat => 0x02,
            Interrupt::Timer => 0x04,
            Interrupt::Serial => 0x08,
            Interrupt::Joypad => 0x10,
        }
    }

    pub fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => INTERRUPT_VBLANK,
            Interrupt::Stat => INTERRUPT_STAT,
            Interrupt::Timer => INTERRUPT_TIMER,
            Interrupt::Serial => INTERRUPT_SERIAL,
            Interrupt::Joypad => INTERRUPT_JOYPAD,
        }
    }
}

/// IME plus the IE (0xFFFF) and IF (0xFF0F) registers.
///
/// Peripherals raise requests by OR-ing bits into [`InterruptController::flags`].
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    pub ime: bool,
    /// IE
    pub enable: u8,
    /// IF
    pub flags: u8,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, interrupt: Interrupt) {
        self.flags |= interrupt.bit();
    }

    /// Any enabled request, regardless of IME.
    pub fn has_pending(&self) -> bool {
        self.enable & self.flags & 0x1F != 0
    }

    /// Dispatch the highest priority pending interrupt.
    ///
    /// Clears its request bit and IME and returns its vector, or
    /// [`NO_INTERRUPT`] when IME is off or nothing enabled is pending.
    pub fn next_vector(&mut self) -> u16 {
        if !self.ime {
            return NO_INTERRUPT;
        }
        let pending = self.enable & self.flags & 0x1F;
        if pending == 0 {
            return NO_INTERRUPT;
        }
        for interrupt in Interrupt::ALL {
            if pending & interrupt.bit() != 0 {
                self.flags &= !interrupt.bit();
                self.ime = false;
                return interrupt.vector();
            }
        }
        NO_INTERRUPT
    }

    pub fn enable_master(&mut self) {
        self.ime = true;
    }

    pub fn disable_master(&mut self) {
        self.ime = false;
    }

    pub fn read_flags(&self) -> u8 {
        self.flags | 0xE0
    }

    pub fn write_flags(&mut self, val: u8) {
        self.flags = val & 0x1F;
    }
}
