/// Host input bits, set while the key is held.
pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;
pub const BUTTON_RIGHT: u8 = 0x10;
pub const BUTTON_LEFT: u8 = 0x20;
pub const BUTTON_UP: u8 = 0x40;
pub const BUTTON_DOWN: u8 = 0x80;

// P1 select lines, active low
const SELECT_ARROWS: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;

/// P1/JOYP (0xFF00).
pub struct Joypad {
    select: u8,
    /// Active-low action buttons in the low nibble.
    buttons: u8,
    /// Active-low directions in the low nibble.
    arrows: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0xFF,
            buttons: 0xFF,
            arrows: 0xFF,
        }
    }

    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & SELECT_BUTTONS == 0 {
            low &= self.buttons;
        }
        if self.select & SELECT_ARROWS == 0 {
            low &= self.arrows;
        }
        0xC0 | (self.select & 0x30) | (low & 0x0F)
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    /// Latch a new host snapshot.
    ///
    /// The joypad request is raised only when some line goes from released
    /// to pressed; holding a key does not retrigger it.
    pub fn update(&mut self, input: u8, if_reg: &mut u8) {
        let buttons = !(input & 0x0F);
        let arrows = !(input >> 4);
        let pressed =
            (self.buttons & buttons) != self.buttons || (self.arrows & arrows) != self.arrows;
        self.buttons = buttons;
        self.arrows = arrows;
        if pressed {
            *if_reg |= 0x10;
        }
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_edge_raises_once() {
        let mut joypad = Joypad::new();
        let mut if_reg = 0;
        joypad.update(BUTTON_A, &mut if_reg);
        assert_eq!(if_reg, 0x10);

        if_reg = 0;
        joypad.update(BUTTON_A, &mut if_reg);
        assert_eq!(if_reg, 0);
    }

    #[test]
    fn release_does_not_raise() {
        let mut joypad = Joypad::new();
        let mut if_reg = 0;
        joypad.update(BUTTON_DOWN, &mut if_reg);
        if_reg = 0;
        joypad.update(0, &mut if_reg);
        assert_eq!(if_reg, 0);
        joypad.update(BUTTON_UP, &mut if_reg);
        assert_eq!(if_reg, 0x10);
    }

    #[test]
    fn read_respects_select_lines() {
        let mut joypad = Joypad::new();
        let mut if_reg = 0;
        joypad.update(BUTTON_START | BUTTON_LEFT, &mut if_reg);

        joypad.write(SELECT_ARROWS);
        assert_eq!(joypad.read(), 0xC0 | 0x10 | 0x07);

        joypad.write(SELECT_BUTTONS);
        assert_eq!(joypad.read(), 0xC0 | 0x20 | 0x0D);

        joypad.write(0x30);
        assert_eq!(joypad.read(), 0xFF);
    }
}
