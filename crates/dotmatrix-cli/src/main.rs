use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use log::{info, warn};

use dotmatrix_core::header::{HEADER_END, Header};
use dotmatrix_core::sink::{Frame, FrameReceiver, SCREEN_HEIGHT, SCREEN_WIDTH, frame_channel};
use dotmatrix_core::{Cartridge, CartridgeError, Emulator, GameBoy, Model};

mod config;

use config::EmulationMode;

// Give up on a running loop that has produced nothing for this long.
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "dotmatrix", version, about = "Game Boy / Game Boy Color emulator")]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the cartridge header of a ROM
    Header {
        /// Path to ROM file
        rom: PathBuf,
    },
    /// Run a ROM without a window
    Run(RunArgs),
    /// Write a config file holding the default settings
    InitConfig {
        /// Destination; defaults to the user config path
        path: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to ROM file
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u64,

    /// Force DMG mode
    #[arg(long, conflicts_with = "cgb")]
    dmg: bool,

    /// Force CGB mode
    #[arg(long, conflicts_with = "dmg")]
    cgb: bool,

    /// Path to the config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run as fast as possible instead of at 59.7 Hz
    #[arg(long)]
    no_pacing: bool,

    /// Write the last frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match args.command {
        Command::Header { rom } => print_header(&rom),
        Command::Run(run) => run_rom(run),
        Command::InitConfig { path } => {
            let path = path.unwrap_or_else(config::default_config_path);
            config::save_to_file(&path, &config::Config::default())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn cart_type_name(code: u8) -> &'static str {
    match code {
        0x00 => "ROM ONLY",
        0x01 => "MBC1",
        0x02 => "MBC1+RAM",
        0x03 => "MBC1+RAM+BATTERY",
        0x05 => "MBC2",
        0x06 => "MBC2+BATTERY",
        0x0F => "MBC3+TIMER+BATTERY",
        0x10 => "MBC3+TIMER+RAM+BATTERY",
        0x11 => "MBC3",
        0x12 => "MBC3+RAM",
        0x13 => "MBC3+RAM+BATTERY",
        0x19 => "MBC5",
        0x1A => "MBC5+RAM",
        0x1B => "MBC5+RAM+BATTERY",
        0x1C => "MBC5+RUMBLE",
        0x1D => "MBC5+RUMBLE+RAM",
        0x1E => "MBC5+RUMBLE+RAM+BATTERY",
        _ => "unknown",
    }
}

fn print_header(path: &Path) -> Result<(), Box<dyn Error>> {
    // The header is readable even for controllers the core cannot run.
    let data = std::fs::read(path)?;
    if data.len() < HEADER_END {
        return Err(CartridgeError::TooSmall { len: data.len() }.into());
    }
    let header = Header::parse(&data);

    println!("Title:            {}", header.title());
    println!(
        "Manufacturer:     {}",
        String::from_utf8_lossy(header.manufacturer_code())
    );
    println!(
        "CGB flag:         {:#04X}{}",
        header.cgb_flag(),
        if header.cgb_supported() { " (CGB)" } else { "" }
    );
    println!(
        "New licensee:     {}",
        String::from_utf8_lossy(header.new_licensee_code())
    );
    println!("SGB flag:         {:#04X}", header.sgb_flag());
    println!(
        "Cartridge type:   {:#04X} ({})",
        header.cart_type(),
        cart_type_name(header.cart_type())
    );
    println!("ROM size code:    {:#04X}", header.rom_size_code());
    println!("RAM size code:    {:#04X}", header.ram_size_code());
    println!("Destination:      {:#04X}", header.destination());
    println!("Old licensee:     {:#04X}", header.old_licensee_code());
    println!("Version:          {:#04X}", header.version());
    if header.checksum_ok() {
        println!("Header checksum:  {:#04X} (ok)", header.header_checksum());
    } else {
        println!(
            "Header checksum:  {:#04X} (mismatch, computed {:#04X})",
            header.header_checksum(),
            header.computed_checksum()
        );
    }
    println!("Global checksum:  {:#06X}", header.global_checksum());
    Ok(())
}

fn run_rom(run: RunArgs) -> Result<(), Box<dyn Error>> {
    let config_path = run.config.clone().unwrap_or_else(config::default_config_path);
    let mut cfg = config::load_from_file(&config_path);
    if run.dmg {
        cfg.emulation_mode = EmulationMode::ForceDmg;
    } else if run.cgb {
        cfg.emulation_mode = EmulationMode::ForceCgb;
    }
    if run.no_pacing {
        cfg.pacing = false;
    }

    let mut cart = Cartridge::from_file(&run.rom)?;
    let save_path = Cartridge::battery_path(&run.rom);
    if cfg.save_battery {
        cart.load_battery(&save_path)?;
    }

    let model = cfg.emulation_mode.model_for(&cart);
    info!(
        "Running {} in {} mode",
        cart.header().title(),
        match model {
            Model::Dmg => "DMG",
            Model::Cgb => "CGB",
        }
    );

    let (sink, frames) = frame_channel();
    let mut gb = GameBoy::new(cart, model);
    gb.set_frame_sink(Box::new(sink));
    let mut emulator = Emulator::new(gb, cfg.loop_config());

    let mut last = None;
    let result = if cfg.pacing {
        let handle = emulator.start();
        let mut received = 0;
        while received < run.frames {
            match frames.recv_timeout(FRAME_TIMEOUT) {
                Ok(frame) => {
                    received += 1;
                    keep_latest(&frames, &mut last, frame);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !handle.is_finished() {
                        warn!("No frame presented for {FRAME_TIMEOUT:?}; is the LCD off?");
                    }
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let (stopped, result) = handle.stop();
        emulator = stopped;
        result
    } else {
        let mut result = Ok(());
        for _ in 0..run.frames {
            result = emulator.run_frames(1);
            // Drain every frame so the sink always has a spare buffer.
            while let Ok(frame) = frames.try_recv() {
                keep_latest(&frames, &mut last, frame);
            }
            if result.is_err() {
                break;
            }
        }
        result
    };

    if cfg.save_battery {
        match emulator.gb.mmu.cart.save_battery(&save_path) {
            Ok(true) => info!("Saved battery RAM to {}", save_path.display()),
            Ok(false) => {}
            Err(e) => warn!("Failed to save battery RAM to {}: {e}", save_path.display()),
        }
    }

    if let Some(path) = &run.screenshot {
        match &last {
            Some(frame) => {
                write_png(path, frame)?;
                info!("Wrote screenshot to {}", path.display());
            }
            None => warn!("No frame was presented; screenshot skipped"),
        }
    }

    result?;
    println!("Ran {} frames", run.frames);
    Ok(())
}

fn keep_latest(frames: &FrameReceiver, last: &mut Option<Frame>, frame: Frame) {
    if let Some(old) = last.replace(frame) {
        frames.recycle(old);
    }
}

fn write_png(path: &Path, frame: &Frame) -> Result<(), Box<dyn Error>> {
    let mut rgb = Vec::new();
    frame.to_rgb(&mut rgb);

    let file = File::create(path)?;
    let w = BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&rgb)?;
    Ok(())
}
