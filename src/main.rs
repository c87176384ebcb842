mod automation;
mod config;
mod core;
mod error;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use crate::config::Config;

/// Automated clicking of Vortex "Download manually" dialogs and the Nexus
/// Mods "Slow download" page.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            // Startup must not proceed in an undefined state.
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    if args.check_config {
        println!("configuration OK ({:?})", args.config);
        return ExitCode::SUCCESS;
    }

    let log_path = logging::init(&config.logging);
    info!("vortex-autodl {} starting", env!("CARGO_PKG_VERSION"));
    if let Some(path) = log_path {
        info!("logging to {:?}", path);
    }
    info!(
        "polling every {} ms; stop with Ctrl+C, ESC, or pointer to the top-left corner",
        config.timing.poll_interval_ms
    );

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(windows)]
fn run(config: Config) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use anyhow::Context;
    use log::warn;
    use windows::Win32::Foundation::{BOOL, TRUE};
    use windows::Win32::System::Console::SetConsoleCtrlHandler;

    use crate::automation::context::AutomationContext;
    use crate::automation::engine::{Engine, EnginePolicy, SystemClock};
    use crate::core::input;

    static RUNNING: AtomicBool = AtomicBool::new(true);

    extern "system" fn ctrl_handler(_ctrl_type: u32) -> BOOL {
        RUNNING.store(false, Ordering::SeqCst);
        TRUE
    }

    unsafe {
        SetConsoleCtrlHandler(Some(ctrl_handler), TRUE)
            .context("failed to install console interrupt handler")?;
    }

    let policy = EnginePolicy::from_config(&config);
    let poll_interval = Duration::from_millis(config.timing.poll_interval_ms);
    let mut engine = Engine::new(policy, SystemClock);
    let mut context = AutomationContext::new(config);

    while RUNNING.load(Ordering::SeqCst) {
        if input::is_escape_key_down() {
            info!("ESC pressed, stopping");
            break;
        }
        if input::pointer_in_failsafe_corner() {
            warn!("pointer in failsafe corner, emergency stop");
            break;
        }

        engine.tick(&mut context);

        // Sleep in short slices so a stop request takes effect promptly.
        // An in-flight tick always completes; there is no mid-action cancel.
        let mut remaining = poll_interval;
        while remaining > Duration::ZERO && RUNNING.load(Ordering::SeqCst) {
            let slice = remaining.min(Duration::from_millis(100));
            thread::sleep(slice);
            remaining -= slice;
        }
    }

    info!(
        "stopped cleanly after {} completed cycle(s)",
        engine.completed_cycles()
    );
    Ok(())
}

#[cfg(not(windows))]
fn run(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("no screen-capture/input capability on this platform; a Windows host is required")
}
