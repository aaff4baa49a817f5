// Clock cycles per DIV increment (16384 Hz)
const DIV_PERIOD: u32 = 256;

// Clock cycles per TIMA increment, indexed by TAC & 3
const TIMA_PERIODS: [u32; 4] = [1024, 16, 64, 256];

const TAC_ENABLE: u8 = 0x04;

pub struct Timer {
    /// Divider (0xFF04)
    pub div: u8,
    /// Timer counter (0xFF05)
    pub tima: u8,
    /// Timer modulo (0xFF06)
    pub tma: u8,
    /// Timer control (0xFF07)
    pub tac: u8,
    div_clock: u32,
    tima_clock: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            div_clock: 0,
            tima_clock: 0,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => self.div,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.reset_div(),
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val & 0x07,
            _ => {}
        }
    }

    /// Any write to DIV clears it together with the sub-increment remainder.
    pub fn reset_div(&mut self) {
        self.div = 0;
        self.div_clock = 0;
    }

    /// Advance by `cycles` clock cycles, raising the timer request in
    /// `if_reg` on each TIMA overflow.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        self.div_clock += cycles;
        while self.div_clock >= DIV_PERIOD {
            self.div_clock -= DIV_PERIOD;
            self.div = self.div.wrapping_add(1);
        }

        if self.tac & TAC_ENABLE == 0 {
            return;
        }

        let period = TIMA_PERIODS[(self.tac & 0x03) as usize];
        self.tima_clock += cycles;
        while self.tima_clock >= period {
            self.tima_clock -= period;
            let (next, overflow) = self.tima.overflowing_add(1);
            if overflow {
                self.tima = self.tma;
                *if_reg |= 0x04;
            } else {
                self.tima = next;
            }
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_accumulates_partial_steps() {
        let mut timer = Timer::new();
        let mut if_reg = 0;
        for _ in 0..63 {
            timer.step(4, &mut if_reg);
        }
        assert_eq!(timer.div, 0);
        timer.step(4, &mut if_reg);
        assert_eq!(timer.div, 1);
    }

    #[test]
    fn tima_runs_only_when_enabled() {
        let mut timer = Timer::new();
        let mut if_reg = 0;
        timer.write(0xFF07, 0x01);
        timer.step(64, &mut if_reg);
        assert_eq!(timer.tima, 0);

        timer.write(0xFF07, 0x05);
        timer.step(12, &mut if_reg);
        assert_eq!(timer.tima, 0);
        timer.step(4, &mut if_reg);
        assert_eq!(timer.tima, 1);
        timer.step(40, &mut if_reg);
        assert_eq!(timer.tima, 3);
    }

    #[test]
    fn overflow_reloads_and_requests() {
        let mut timer = Timer::new();
        let mut if_reg = 0;
        timer.write(0xFF06, 0xAB);
        timer.write(0xFF05, 0xFF);
        timer.write(0xFF07, 0x05);
        timer.step(16, &mut if_reg);
        assert_eq!(timer.tima, 0xAB);
        assert_eq!(if_reg & 0x04, 0x04);
    }

    #[test]
    fn large_step_does_not_drop_increments() {
        let mut timer = Timer::new();
        let mut if_reg = 0;
        timer.write(0xFF07, 0x04);
        timer.step(1000, &mut if_reg);
        timer.step(1000, &mut if_reg);
        assert_eq!(timer.tima, 1);
        assert_eq!(timer.div, 7);
        timer.step(48, &mut if_reg);
        assert_eq!(timer.tima, 2);
    }

    #[test]
    fn div_write_resets_remainder() {
        let mut timer = Timer::new();
        let mut if_reg = 0;
        timer.step(255, &mut if_reg);
        timer.write(0xFF04, 0x12);
        timer.step(1, &mut if_reg);
        assert_eq!(timer.read(0xFF04), 0);
        timer.step(255, &mut if_reg);
        assert_eq!(timer.read(0xFF04), 1);
    }
}
