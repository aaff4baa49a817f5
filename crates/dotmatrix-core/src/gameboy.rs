use crate::{
    cartridge::Cartridge,
    cpu::Cpu,
    error::Fault,
    mmu::Mmu,
    sink::{AudioSink, FrameSink, NullAudioSink, NullFrameSink},
};

// Clock cycles per machine cycle at normal speed
const CLOCKS_PER_M_CYCLE: u32 = 4;
const CLOCKS_PER_M_CYCLE_DOUBLE: u32 = 2;

/// Hardware variant to emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Dmg,
    Cgb,
}

impl Model {
    /// CGB for cartridges that declare color support, DMG otherwise.
    pub fn for_cartridge(cart: &Cartridge) -> Self {
        if cart.header().cgb_supported() {
            Model::Cgb
        } else {
            Model::Dmg
        }
    }

    pub fn is_cgb(self) -> bool {
        self == Model::Cgb
    }
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    pub cgb: bool,
    frame_sink: Box<dyn FrameSink>,
    audio_sink: Box<dyn AudioSink>,
}

impl GameBoy {
    /// Machine in its post-boot state with `cart` inserted and null sinks.
    pub fn new(cart: Cartridge, model: Model) -> Self {
        let cgb = model.is_cgb();
        Self {
            cpu: Cpu::new(cgb),
            mmu: Mmu::new(cart, cgb),
            cgb,
            frame_sink: Box::new(NullFrameSink),
            audio_sink: Box::new(NullAudioSink),
        }
    }

    pub fn set_frame_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.frame_sink = sink;
    }

    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.audio_sink = sink;
    }

    /// Run one CPU step and clock every peripheral for the cycles it took.
    ///
    /// Returns the machine cycles consumed.
    pub fn step(&mut self) -> Result<u8, Fault> {
        let m_cycles = self.cpu.step(&mut self.mmu)?;
        let mul = if self.cpu.double_speed {
            CLOCKS_PER_M_CYCLE_DOUBLE
        } else {
            CLOCKS_PER_M_CYCLE
        };
        let clocks = m_cycles as u32 * mul;
        let dots = m_cycles as u32 * CLOCKS_PER_M_CYCLE;

        self.mmu.tick_ppu(dots, self.frame_sink.as_mut());
        self.mmu.tick_timer(clocks);
        self.mmu.tick_oam_dma(clocks)?;
        self.mmu.tick_vram_dma(dots)?;
        self.mmu.tick_apu(clocks, self.audio_sink.as_mut());
        Ok(m_cycles)
    }

    pub fn update_input(&mut self, input: u8) {
        self.mmu.update_input(input);
    }

    /// Frames presented since power-on.
    pub fn frames(&self) -> u64 {
        self.mmu.ppu.frames()
    }

    /// Reset to the post-boot state while preserving the inserted cartridge.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.mmu.reset();
    }
}
