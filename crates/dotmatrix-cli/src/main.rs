mod config;
mod screenshot;
mod store;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use dotmatrix_core::display::{FrameBuffer, SharedFrameBuffer};
use dotmatrix_core::input::NoInput;
use dotmatrix_core::sound::NullSound;
use dotmatrix_core::{ConsoleError, GameConsole};
use log::{error, info, warn};
use thiserror::Error;

use screenshot::ScreenshotError;
use store::DirStore;

#[derive(Parser)]
#[command(version, about = "Run a Game Boy ROM headless")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Path to a 256-byte DMG boot ROM
    #[arg(long)]
    boot_rom: Option<PathBuf>,

    /// Directory holding battery saves and save states
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u32>,

    /// Write the last frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Restore this save-state slot before running
    #[arg(long)]
    load_state: Option<u8>,

    /// Save state into this slot after running
    #[arg(long)]
    save_state: Option<u8>,

    /// Config file to use instead of the per-user cli.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print bytes the ROM sends over the serial port
    #[arg(long)]
    serial: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("failed to read {what} {path}: {source}")]
    Read {
        what: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[error("save states need a save directory (--save-dir or save_dir in the config)")]
    NoSaveDir,
    #[error(transparent)]
    Console(#[from] ConsoleError),
    #[error(transparent)]
    Screenshot(#[from] ScreenshotError),
}

fn read_file(what: &'static str, path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Read {
        what,
        path: path.display().to_string(),
        source,
    })
}

/// Serial bytes as text, escaping anything unprintable.
fn printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' || b == b'\n' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02X}"));
        }
    }
    out
}

fn run(args: Args) -> Result<(), CliError> {
    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let cfg = config::load_from_file(&config_path);

    let fb: SharedFrameBuffer = Rc::new(RefCell::new(FrameBuffer::new()));
    let mut gc = GameConsole::new(
        Box::new(fb.clone()),
        Box::new(NullSound::new()),
        Box::new(NoInput),
    );

    if let Some(path) = args.boot_rom.as_ref().or(cfg.boot_rom.as_ref()) {
        let data = read_file("boot ROM", path)?;
        gc.load_boot_rom(&data)?;
    }
    let rom = read_file("ROM", &args.rom)?;
    gc.load_cartridge(rom)?;

    let mut store = args.save_dir.or(cfg.save_dir).map(DirStore::new);
    if let Some(store) = store.as_mut()
        && gc.load_battery(store)?
    {
        info!("Restored battery save");
    }
    if let Some(slot) = args.load_state {
        let store = store.as_mut().ok_or(CliError::NoSaveDir)?;
        gc.load_state_from(store, slot)?;
    }

    let frames = args.frames.unwrap_or(cfg.frames);
    let mut cycles = 0u64;
    for _ in 0..frames {
        cycles += gc.run_frame();
        if args.serial {
            let out = gc.take_serial_output();
            if !out.is_empty() {
                print!("{}", printable(&out));
            }
        }
    }
    if args.serial {
        println!();
    }
    info!("Ran {frames} frames ({cycles} cycles)");
    info!("{}", gc.cpu.debug_state());

    if let Some(path) = &args.screenshot {
        screenshot::save_png(path, fb.borrow().frame(), &cfg.palette)?;
        info!("Wrote {}", path.display());
    }
    if let Some(slot) = args.save_state {
        let store = store.as_mut().ok_or(CliError::NoSaveDir)?;
        gc.save_state_to(store, slot)?;
    }
    match store.as_mut() {
        Some(store) => {
            if gc.save_battery(store)? {
                info!("Saved battery RAM");
            }
        }
        None if gc.bus.cartridge.has_battery() => {
            warn!("Cartridge has a battery but no save directory is set; not saving");
        }
        None => {}
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
