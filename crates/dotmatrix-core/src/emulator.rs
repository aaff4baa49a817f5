use std::{
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    error::Fault,
    gameboy::GameBoy,
    ppu::{FRAME_CYCLES, LINE_CYCLES},
    sink::{InputSource, NullInput},
};

/// Native refresh rate of the LCD.
pub const FRAME_RATE: f64 = 59.7275;

const LINES_PER_FRAME: u32 = FRAME_CYCLES / LINE_CYCLES;
const DOTS_PER_M_CYCLE: u32 = 4;

// Resynchronise instead of catching up when this far behind real time
const MAX_LAG: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Input polls per frame. The line spacing is `154 / N`.
    pub input_samples_per_frame: u32,
    /// Throttle to [`FRAME_RATE`] when running on a thread.
    pub pacing: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            input_samples_per_frame: 4,
            pacing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Running = 0,
    Paused = 1,
    Stopped = 2,
}

impl RunState {
    fn from_u8(val: u8) -> Self {
        match val {
            0 => RunState::Running,
            1 => RunState::Paused,
            _ => RunState::Stopped,
        }
    }
}

/// Run state shared between the loop thread and its handle.
struct Control {
    state: AtomicU8,
    lock: Mutex<()>,
    wake: Condvar,
}

impl Control {
    fn new(state: RunState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set(&self, state: RunState) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.state.store(state as u8, Ordering::Release);
        self.wake.notify_all();
    }

    /// Move from `from` to `to`, leaving any other state untouched.
    fn transition(&self, from: RunState, to: RunState) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if changed {
            self.wake.notify_all();
        }
        changed
    }

    /// Block while paused and return the state that ended the wait.
    fn wait_while_paused(&self) -> RunState {
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while self.state() == RunState::Paused {
            guard = self
                .wake
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.state()
    }
}

/// Drives a [`GameBoy`] instruction by instruction, polls input at a fixed
/// line cadence and optionally paces itself against wall-clock time.
pub struct Emulator {
    pub gb: GameBoy,
    input: Box<dyn InputSource>,
    config: LoopConfig,
    /// Dot position within the current frame, counted from CPU cycles so it
    /// keeps running while the LCD is off.
    frame_dots: u32,
}

impl Emulator {
    pub fn new(gb: GameBoy, config: LoopConfig) -> Self {
        Self {
            gb,
            input: Box::new(NullInput),
            config,
            frame_dots: 0,
        }
    }

    pub fn set_input(&mut self, input: Box<dyn InputSource>) {
        self.input = input;
    }

    pub fn config(&self) -> LoopConfig {
        self.config
    }

    fn lines_per_sample(&self) -> u32 {
        LINES_PER_FRAME / self.config.input_samples_per_frame.clamp(1, LINES_PER_FRAME)
    }

    /// One instruction plus its peripheral ticks.
    ///
    /// Returns the dots elapsed and whether input was sampled.
    fn step(&mut self) -> Result<(u32, bool), Fault> {
        let prev_line = self.frame_dots / LINE_CYCLES;
        let dots = self.gb.step()? as u32 * DOTS_PER_M_CYCLE;
        self.frame_dots = (self.frame_dots + dots) % FRAME_CYCLES;
        let line = self.frame_dots / LINE_CYCLES;

        let spacing = self.lines_per_sample();
        let sampled = line != prev_line && line % spacing == 0;
        if sampled {
            let input = self.input.poll();
            self.gb.update_input(input);
        }
        Ok((dots, sampled))
    }

    /// Run `frames` frames worth of machine time as fast as possible.
    pub fn run_frames(&mut self, frames: u64) -> Result<(), Fault> {
        let target = frames * FRAME_CYCLES as u64;
        let mut elapsed = 0u64;
        while elapsed < target {
            let (dots, _) = self.step()?;
            elapsed += dots as u64;
        }
        Ok(())
    }

    /// Move the emulator onto its own thread and start running.
    pub fn start(self) -> EmulatorHandle {
        let control = Arc::new(Control::new(RunState::Running));
        let loop_control = Arc::clone(&control);
        info!(
            "Starting emulation thread ({} input samples per frame, pacing {})",
            self.config.input_samples_per_frame,
            if self.config.pacing { "on" } else { "off" }
        );
        let thread = thread::spawn(move || self.run_loop(&loop_control));
        EmulatorHandle { control, thread }
    }

    fn run_loop(mut self, control: &Control) -> (Self, Result<(), Fault>) {
        let dot_rate = FRAME_RATE * FRAME_CYCLES as f64;
        let mut epoch = Instant::now();
        let mut paced_dots = 0u64;

        loop {
            match control.state() {
                RunState::Running => {}
                RunState::Paused => {
                    debug!("Emulation paused");
                    if control.wait_while_paused() == RunState::Stopped {
                        break;
                    }
                    debug!("Emulation resumed");
                    epoch = Instant::now();
                    paced_dots = 0;
                    continue;
                }
                RunState::Stopped => break,
            }

            let (dots, sampled) = match self.step() {
                Ok(step) => step,
                Err(fault) => {
                    warn!("Emulation stopped: {fault}");
                    control.set(RunState::Stopped);
                    return (self, Err(fault));
                }
            };
            paced_dots += dots as u64;

            if sampled && self.config.pacing {
                let deadline = epoch + Duration::from_secs_f64(paced_dots as f64 / dot_rate);
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else if now - deadline > MAX_LAG {
                    debug!("Emulation fell behind by {:?}, resynchronising", now - deadline);
                    epoch = now;
                    paced_dots = 0;
                }
            }
        }
        (self, Ok(()))
    }
}

/// Owner-side control of a running [`Emulator`].
pub struct EmulatorHandle {
    control: Arc<Control>,
    thread: JoinHandle<(Emulator, Result<(), Fault>)>,
}

impl EmulatorHandle {
    pub fn state(&self) -> RunState {
        self.control.state()
    }

    /// Suspend after the current instruction.
    pub fn pause(&self) {
        self.control.transition(RunState::Running, RunState::Paused);
    }

    pub fn resume(&self) {
        self.control.transition(RunState::Paused, RunState::Running);
    }

    /// True once the loop has exited, either stopped or on a fault.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop the loop, wait for it and reset the machine to its post-boot
    /// state. Returns the emulator with any fault that ended the run.
    pub fn stop(self) -> (Emulator, Result<(), Fault>) {
        self.control.set(RunState::Stopped);
        match self.thread.join() {
            Ok((mut emulator, result)) => {
                emulator.gb.reset();
                emulator.frame_dots = 0;
                info!("Emulation thread stopped");
                (emulator, result)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;
    use crate::gameboy::Model;
    use std::sync::atomic::AtomicU32;

    struct CountingInput(Arc<AtomicU32>);

    impl InputSource for CountingInput {
        fn poll(&mut self) -> u8 {
            self.0.fetch_add(1, Ordering::Relaxed);
            0
        }
    }

    fn idle_emulator(config: LoopConfig) -> Emulator {
        // JR -2
        let mut rom = vec![0; 0x8000];
        rom[0x0100] = 0x18;
        rom[0x0101] = 0xFE;
        let gb = GameBoy::new(Cartridge::new(rom).unwrap(), Model::Dmg);
        Emulator::new(gb, config)
    }

    fn polls_over_frames(samples: u32, frames: u64) -> u32 {
        let polls = Arc::new(AtomicU32::new(0));
        let mut emulator = idle_emulator(LoopConfig {
            input_samples_per_frame: samples,
            pacing: false,
        });
        emulator.set_input(Box::new(CountingInput(Arc::clone(&polls))));
        emulator.run_frames(frames).unwrap();
        polls.load(Ordering::Relaxed)
    }

    #[test]
    fn input_sampling_cadence() {
        assert_eq!(polls_over_frames(1, 3), 3);
        assert_eq!(polls_over_frames(2, 3), 6);
        // 154 / 4 = 38 lines apart: lines 0, 38, 76, 114 and 152
        assert_eq!(polls_over_frames(4, 2), 10);
    }

    #[test]
    fn sample_count_is_clamped() {
        assert_eq!(polls_over_frames(0, 1), 1);
        assert_eq!(polls_over_frames(1000, 1), 154);
    }

    #[test]
    fn run_state_transitions() {
        let control = Control::new(RunState::Running);
        assert!(!control.transition(RunState::Paused, RunState::Running));
        assert!(control.transition(RunState::Running, RunState::Paused));
        control.set(RunState::Stopped);
        assert_eq!(control.wait_while_paused(), RunState::Stopped);
    }
}
