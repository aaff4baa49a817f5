use crate::sink::{AudioSink, SampleBlock, new_sample_block};

pub const SAMPLE_RATE: u32 = 44_100;

const CPU_CLOCK_HZ: u32 = 4_194_304;
// 512 Hz frame sequencer tick (not doubled in CGB mode)
const FRAME_SEQUENCER_PERIOD: u32 = 8192;
const VOLUME_FACTOR: i16 = 64;

const NR52_ENABLE: u8 = 0x80;

// FF10-FF3F after the boot ROM
const POWER_ON_REGS: [u8; 0x30] = [
    0x80, 0xBF, 0xF3, 0xFF, 0xBF, 0xFF, 0x3F, 0x00, 0xFF, 0xBF, 0x7F, 0xFF, 0x9F, 0xFF, 0xBF, 0xFF,
    0xFF, 0x00, 0x00, 0xBF, 0x77, 0xF3, 0xF1, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

// Duty table for pulse channels. Index (0..3) is the duty selector in NRx1.
const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1], // 12.5%
    [1, 0, 0, 0, 0, 0, 0, 1], // 25%
    [1, 0, 0, 0, 0, 1, 1, 1], // 50%
    [0, 1, 1, 1, 1, 1, 1, 0], // 75%
];

fn read_mask(addr: u16) -> u8 {
    match addr {
        0xFF10 => 0x80,
        0xFF11 | 0xFF16 => 0x3F,
        0xFF13 | 0xFF18 | 0xFF1B | 0xFF1D | 0xFF20 => 0xFF,
        0xFF14 | 0xFF19 | 0xFF1E | 0xFF23 => 0xBF,
        0xFF1A => 0x7F,
        0xFF1C => 0x9F,
        0xFF26 => 0x70,
        0xFF15 | 0xFF1F | 0xFF27..=0xFF2F => 0xFF,
        _ => 0x00,
    }
}

#[derive(Default, Clone, Copy)]
struct Envelope {
    initial: u8,
    add: bool,
    period: u8,
    timer: u8,
    volume: u8,
}

impl Envelope {
    fn write(&mut self, val: u8) {
        self.initial = val >> 4;
        self.add = val & 0x08 != 0;
        self.period = val & 0x07;
    }

    fn trigger(&mut self) {
        self.volume = self.initial;
        self.timer = self.period;
    }

    fn clock(&mut self) {
        if self.period == 0 {
            return;
        }
        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer == 0 {
            self.timer = self.period;
            if self.add && self.volume < 15 {
                self.volume += 1;
            } else if !self.add && self.volume > 0 {
                self.volume -= 1;
            }
        }
    }
}

#[derive(Default, Clone, Copy)]
struct SquareChannel {
    enabled: bool,
    dac_enabled: bool,
    duty: u8,
    duty_pos: u8,
    length: u16,
    length_enable: bool,
    frequency: u16,
    timer: i32,
    envelope: Envelope,
}

impl SquareChannel {
    fn period(&self) -> i32 {
        (2048 - self.frequency as i32) * 4
    }

    fn write_length(&mut self, val: u8) {
        self.duty = val >> 6;
        self.length = 64 - (val & 0x3F) as u16;
    }

    fn write_envelope(&mut self, val: u8) {
        self.envelope.write(val);
        self.dac_enabled = val & 0xF8 != 0;
        if !self.dac_enabled {
            self.enabled = false;
        }
    }

    fn write_frequency_low(&mut self, val: u8) {
        self.frequency = (self.frequency & 0x700) | val as u16;
    }

    fn write_frequency_high(&mut self, val: u8) {
        self.frequency = (self.frequency & 0x0FF) | (((val & 0x07) as u16) << 8);
        self.length_enable = val & 0x40 != 0;
        if val & 0x80 != 0 {
            self.trigger();
        }
    }

    fn trigger(&mut self) {
        self.enabled = self.dac_enabled;
        if self.length == 0 {
            self.length = 64;
        }
        self.timer = self.period();
        self.envelope.trigger();
    }

    fn step(&mut self, cycles: u32) {
        if !self.enabled {
            return;
        }
        self.timer -= cycles as i32;
        while self.timer <= 0 {
            self.timer += self.period();
            self.duty_pos = (self.duty_pos + 1) & 7;
        }
    }

    fn clock_length(&mut self) {
        if self.length_enable && self.length > 0 {
            self.length -= 1;
            if self.length == 0 {
                self.enabled = false;
            }
        }
    }

    fn output(&self) -> i16 {
        if self.enabled && DUTY_TABLE[self.duty as usize][self.duty_pos as usize] != 0 {
            self.envelope.volume as i16
        } else {
            0
        }
    }
}

/// Sound registers plus the two pulse channels.
///
/// Wave and noise registers are kept so software reads back what it wrote,
/// but those channels stay silent.
pub struct Apu {
    regs: [u8; 0x30],
    ch1: SquareChannel,
    ch2: SquareChannel,
    sequencer_clock: u32,
    sequencer_step: u8,
    sample_clock: u32,
    samples: Box<SampleBlock>,
    sample_pos: usize,
}

impl Apu {
    pub fn new() -> Self {
        let mut apu = Self {
            regs: POWER_ON_REGS,
            ch1: SquareChannel::default(),
            ch2: SquareChannel::default(),
            sequencer_clock: 0,
            sequencer_step: 0,
            sample_clock: 0,
            samples: new_sample_block(),
            sample_pos: 0,
        };
        // Channel 1 is left running by the boot sound
        apu.ch1.write_length(POWER_ON_REGS[0x01]);
        apu.ch1.write_envelope(POWER_ON_REGS[0x02]);
        apu.ch1.write_frequency_low(POWER_ON_REGS[0x03]);
        apu.ch1.write_frequency_high(POWER_ON_REGS[0x04] & 0x7F);
        apu.ch1.trigger();
        apu.ch2.write_length(POWER_ON_REGS[0x06]);
        apu
    }

    fn enabled(&self) -> bool {
        self.regs[0x16] & NR52_ENABLE != 0
    }

    pub fn read(&self, addr: u16) -> u8 {
        let index = (addr - 0xFF10) as usize;
        if addr == 0xFF26 {
            return (self.regs[index] & NR52_ENABLE)
                | read_mask(addr)
                | self.ch1.enabled as u8
                | ((self.ch2.enabled as u8) << 1);
        }
        self.regs[index] | read_mask(addr)
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        let index = (addr - 0xFF10) as usize;
        let wave_ram = (0xFF30..=0xFF3F).contains(&addr);
        if !self.enabled() && addr != 0xFF26 && !wave_ram {
            return;
        }
        match addr {
            0xFF11 => self.ch1.write_length(val),
            0xFF12 => self.ch1.write_envelope(val),
            0xFF13 => self.ch1.write_frequency_low(val),
            0xFF14 => self.ch1.write_frequency_high(val),
            0xFF16 => self.ch2.write_length(val),
            0xFF17 => self.ch2.write_envelope(val),
            0xFF18 => self.ch2.write_frequency_low(val),
            0xFF19 => self.ch2.write_frequency_high(val),
            0xFF26 => {
                if val & NR52_ENABLE == 0 {
                    self.power_off();
                } else if !self.enabled() {
                    self.sequencer_step = 0;
                }
                self.regs[index] = val & NR52_ENABLE;
                return;
            }
            _ => {}
        }
        self.regs[index] = val;
    }

    fn power_off(&mut self) {
        self.regs[..0x16].fill(0);
        self.ch1 = SquareChannel::default();
        self.ch2 = SquareChannel::default();
    }

    fn clock_frame_sequencer(&mut self) {
        let step = self.sequencer_step;
        self.sequencer_step = (self.sequencer_step + 1) & 7;
        if step % 2 == 0 {
            self.ch1.clock_length();
            self.ch2.clock_length();
        }
        if step == 7 {
            self.ch1.envelope.clock();
            self.ch2.envelope.clock();
        }
    }

    fn mix(&self) -> (i16, i16) {
        let nr50 = self.regs[0x14];
        let nr51 = self.regs[0x15];
        let ch1 = self.ch1.output();
        let ch2 = self.ch2.output();

        let mut left = 0i16;
        let mut right = 0i16;
        if nr51 & 0x10 != 0 {
            left += ch1;
        }
        if nr51 & 0x01 != 0 {
            right += ch1;
        }
        if nr51 & 0x20 != 0 {
            left += ch2;
        }
        if nr51 & 0x02 != 0 {
            right += ch2;
        }

        let left_vol = ((nr50 >> 4) & 0x07) as i16 + 1;
        let right_vol = (nr50 & 0x07) as i16 + 1;
        (
            left * left_vol * VOLUME_FACTOR,
            right * right_vol * VOLUME_FACTOR,
        )
    }

    /// Advance by `cycles` clock cycles, handing the sample block to `sink`
    /// each time it fills.
    pub fn step(&mut self, cycles: u32, sink: &mut dyn AudioSink) {
        if self.enabled() {
            self.ch1.step(cycles);
            self.ch2.step(cycles);
            self.sequencer_clock += cycles;
            while self.sequencer_clock >= FRAME_SEQUENCER_PERIOD {
                self.sequencer_clock -= FRAME_SEQUENCER_PERIOD;
                self.clock_frame_sequencer();
            }
        }

        self.sample_clock += cycles * SAMPLE_RATE;
        while self.sample_clock >= CPU_CLOCK_HZ {
            self.sample_clock -= CPU_CLOCK_HZ;
            let (left, right) = if self.enabled() { self.mix() } else { (0, 0) };
            self.samples[self.sample_pos] = left;
            self.samples[self.sample_pos + 1] = right;
            self.sample_pos += 2;
            if self.sample_pos == self.samples.len() {
                sink.swap(&mut self.samples);
                self.sample_pos = 0;
            }
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
