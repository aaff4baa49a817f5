//! Host-facing boundaries: presentation, audio and input.
//!
//! Buffers cross the boundary by swapping boxes. The emulation side owns
//! exactly one frame buffer and one sample block at a time and hands the
//! finished one over in exchange for a buffer to reuse, so nothing is
//! allocated once the machine is running.

use std::time::Duration;

use crossbeam_channel as cb;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// Palette entries: 32 object colors then 32 background colors.
pub const PALETTE_ENTRIES: usize = 64;

/// One byte per pixel: bits 0-1 color id, bits 2-4 palette, bit 5 set for
/// background and window pixels. Indexes [`FrameColors`] directly.
pub type FrameBuffer = [u8; SCREEN_WIDTH * SCREEN_HEIGHT];

/// RGB triple per palette entry.
pub type FrameColors = [u8; PALETTE_ENTRIES * 3];

/// Stereo frames per audio block.
pub const AUDIO_BLOCK_FRAMES: usize = 1024;

/// Interleaved left/right samples.
pub type SampleBlock = [i16; AUDIO_BLOCK_FRAMES * 2];

pub fn new_frame_buffer() -> Box<FrameBuffer> {
    Box::new([0; SCREEN_WIDTH * SCREEN_HEIGHT])
}

pub fn new_frame_colors() -> Box<FrameColors> {
    Box::new([0; PALETTE_ENTRIES * 3])
}

pub fn new_sample_block() -> Box<SampleBlock> {
    Box::new([0; AUDIO_BLOCK_FRAMES * 2])
}

/// Receives each completed frame.
///
/// On return `pixels` and `colors` must hold buffers the PPU may overwrite.
/// A sink that keeps the finished frame swaps in one of its own.
pub trait FrameSink: Send {
    fn swap(&mut self, pixels: &mut Box<FrameBuffer>, colors: &mut Box<FrameColors>);
}

/// Receives each full block of samples, same contract as [`FrameSink`].
pub trait AudioSink: Send {
    fn swap(&mut self, samples: &mut Box<SampleBlock>);
}

/// Polled joypad state, one bit per key as in [`crate::joypad`].
pub trait InputSource: Send {
    fn poll(&mut self) -> u8;
}

#[derive(Debug, Default)]
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn swap(&mut self, _pixels: &mut Box<FrameBuffer>, _colors: &mut Box<FrameColors>) {}
}

#[derive(Debug, Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn swap(&mut self, _samples: &mut Box<SampleBlock>) {}
}

#[derive(Debug, Default)]
pub struct NullInput;

impl InputSource for NullInput {
    fn poll(&mut self) -> u8 {
        0
    }
}

/// A completed frame in flight between threads.
pub struct Frame {
    pub pixels: Box<FrameBuffer>,
    pub colors: Box<FrameColors>,
}

impl Frame {
    fn new() -> Self {
        Self {
            pixels: new_frame_buffer(),
            colors: new_frame_colors(),
        }
    }

    /// Expand to packed RGB, three bytes per pixel.
    pub fn to_rgb(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.pixels.len() * 3);
        for &px in self.pixels.iter() {
            let base = (px as usize & 0x3F) * 3;
            out.extend_from_slice(&self.colors[base..base + 3]);
        }
    }
}

/// Frame sink that publishes frames on a channel.
///
/// Never blocks: if the consumer has not taken the previous frame, or holds
/// every spare buffer, the new frame is dropped and its buffers reused.
pub struct ChannelFrameSink {
    frames: cb::Sender<Frame>,
    recycled: cb::Receiver<Frame>,
    spare: Option<Frame>,
}

/// Consumer side of [`frame_channel`].
pub struct FrameReceiver {
    frames: cb::Receiver<Frame>,
    recycle: cb::Sender<Frame>,
}

/// Create a connected sink/receiver pair with all buffers preallocated.
pub fn frame_channel() -> (ChannelFrameSink, FrameReceiver) {
    let (frame_tx, frame_rx) = cb::bounded(1);
    let (recycle_tx, recycle_rx) = cb::bounded(2);
    (
        ChannelFrameSink {
            frames: frame_tx,
            recycled: recycle_rx,
            spare: Some(Frame::new()),
        },
        FrameReceiver {
            frames: frame_rx,
            recycle: recycle_tx,
        },
    )
}

impl FrameSink for ChannelFrameSink {
    fn swap(&mut self, pixels: &mut Box<FrameBuffer>, colors: &mut Box<FrameColors>) {
        let Some(mut frame) = self.spare.take().or_else(|| self.recycled.try_recv().ok()) else {
            return;
        };
        std::mem::swap(pixels, &mut frame.pixels);
        std::mem::swap(colors, &mut frame.colors);
        match self.frames.try_send(frame) {
            Ok(()) => {}
            Err(cb::TrySendError::Full(mut frame) | cb::TrySendError::Disconnected(mut frame)) => {
                std::mem::swap(pixels, &mut frame.pixels);
                std::mem::swap(colors, &mut frame.colors);
                self.spare = Some(frame);
            }
        }
    }
}

impl FrameReceiver {
    pub fn recv(&self) -> Result<Frame, cb::RecvError> {
        self.frames.recv()
    }

    pub fn try_recv(&self) -> Result<Frame, cb::TryRecvError> {
        self.frames.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Frame, cb::RecvTimeoutError> {
        self.frames.recv_timeout(timeout)
    }

    /// Hand a frame's buffers back for reuse.
    pub fn recycle(&self, frame: Frame) {
        let _ = self.recycle.try_send(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_hands_over_frames() {
        let (mut sink, receiver) = frame_channel();
        let mut pixels = new_frame_buffer();
        let mut colors = new_frame_colors();

        pixels[0] = 0x21;
        colors[0] = 0xAA;
        sink.swap(&mut pixels, &mut colors);
        assert_eq!(pixels[0], 0);

        let frame = receiver.try_recv().unwrap();
        assert_eq!(frame.pixels[0], 0x21);
        assert_eq!(frame.colors[0], 0xAA);
        receiver.recycle(frame);
    }

    #[test]
    fn full_channel_drops_frame_without_blocking() {
        let (mut sink, receiver) = frame_channel();
        let mut pixels = new_frame_buffer();
        let mut colors = new_frame_colors();

        pixels[0] = 1;
        sink.swap(&mut pixels, &mut colors);
        pixels[0] = 2;
        sink.swap(&mut pixels, &mut colors);
        // second frame stays with the producer
        assert_eq!(pixels[0], 2);

        let frame = receiver.try_recv().unwrap();
        assert_eq!(frame.pixels[0], 1);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn recycled_buffers_are_reused() {
        let (mut sink, receiver) = frame_channel();
        let mut pixels = new_frame_buffer();
        let mut colors = new_frame_colors();

        for n in 1..=5u8 {
            pixels[0] = n;
            sink.swap(&mut pixels, &mut colors);
            let frame = receiver.try_recv().unwrap();
            assert_eq!(frame.pixels[0], n);
            receiver.recycle(frame);
        }
    }

    #[test]
    fn rgb_expansion_uses_palette_entry() {
        let mut frame = Frame::new();
        frame.pixels[1] = 0x21;
        frame.colors[0x21 * 3..0x21 * 3 + 3].copy_from_slice(&[1, 2, 3]);
        let mut rgb = Vec::new();
        frame.to_rgb(&mut rgb);
        assert_eq!(rgb.len(), SCREEN_WIDTH * SCREEN_HEIGHT * 3);
        assert_eq!(&rgb[3..6], &[1, 2, 3]);
    }
}
