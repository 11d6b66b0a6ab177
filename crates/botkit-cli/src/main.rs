//! `botkit-cli` – run a fleet of simulated robots.
//!
//! ```text
//! botkit [run] [FLEET]     start every robot, Ctrl-C to stop
//! botkit summary [FLEET]   print the fleet topology as JSON
//! botkit init [FLEET]      write the demo fleet file
//! ```
//!
//! `FLEET` defaults to `~/.botkit/fleet.toml`; a missing file runs the
//! built-in demo fleet.
//!
//! Exit codes: `0` clean shutdown, `1` configuration or start error, `2`
//! errors while halting.

mod config;
mod fleet;

use std::path::PathBuf;
use std::process::ExitCode;

use botkit_runtime::Master;
use botkit_types::util::version;
use colored::Colorize;
use tracing::{info, warn};

#[derive(Debug, PartialEq)]
enum Command {
    Run(Option<PathBuf>),
    Summary(Option<PathBuf>),
    Init(Option<PathBuf>),
    Help,
    Version,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Command {
    let first = args.next();
    let path = |arg: Option<String>| arg.map(PathBuf::from);
    match first.as_deref() {
        None => Command::Run(None),
        Some("-h" | "--help" | "help") => Command::Help,
        Some("-V" | "--version") => Command::Version,
        Some("run") => Command::Run(path(args.next())),
        Some("summary") => Command::Summary(path(args.next())),
        Some("init") => Command::Init(path(args.next())),
        Some(_) => Command::Run(path(first)),
    }
}

fn main() -> ExitCode {
    let _guard = botkit_runtime::init_tracing("botkit");

    match parse_args(std::env::args().skip(1)) {
        Command::Help => {
            print_usage();
            ExitCode::SUCCESS
        }
        Command::Version => {
            println!("botkit {}", version());
            ExitCode::SUCCESS
        }
        Command::Init(path) => init(path.unwrap_or_else(config::fleet_path)),
        Command::Summary(path) => summary(path),
        Command::Run(path) => {
            print_banner();
            run(path)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn load_master(path: Option<PathBuf>) -> Result<Master, ExitCode> {
    let cfg = config::load(path.as_deref()).map_err(|e| {
        eprintln!("{}: {e}", "Config error".red());
        ExitCode::from(1)
    })?;
    fleet::build(&cfg).map_err(|e| {
        eprintln!("{}: {e}", "Config error".red());
        ExitCode::from(1)
    })
}

fn run(path: Option<PathBuf>) -> ExitCode {
    let master = match load_master(path) {
        Ok(m) => m,
        Err(code) => return code,
    };

    // Ctrl-C is routed through the master's trap so shutdown goes through
    // the ordered halt sequence.
    master.set_trap(|tx| {
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – halting robots …".yellow().bold());
            let _ = tx.try_send(());
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    });

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start runtime".red());
            return ExitCode::from(1);
        }
    };

    let auto_run = master.auto_run();
    let outcome = runtime.block_on(async {
        for robot in master.robots() {
            println!(
                "  {} {} ({} connection(s), {} device(s))",
                "•".cyan(),
                robot.name().bold(),
                robot.connections().len(),
                robot.devices().len()
            );
        }
        if auto_run {
            println!("\n  Press {} to stop.\n", "Ctrl-C".bold());
        }
        master.start().await?;
        if !auto_run {
            info!("auto_run disabled; stopping");
            master.stop().await?;
        }
        Ok::<(), botkit_types::BotError>(())
    });

    match outcome {
        Ok(()) => {
            println!("{}", "  ✓ All robots halted.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Error".red().bold());
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn summary(path: Option<PathBuf>) -> ExitCode {
    let master = match load_master(path) {
        Ok(m) => m,
        Err(code) => return code,
    };
    match serde_json::to_string_pretty(&master.summary()) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Failed to render summary".red());
            ExitCode::from(1)
        }
    }
}

fn init(path: PathBuf) -> ExitCode {
    match config::init(&path) {
        Ok(true) => {
            println!("  {} Fleet written to {}", "✓".green().bold(), path.display().to_string().bold());
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("  Fleet already exists at {}", path.display().to_string().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Error".red());
            ExitCode::from(1)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __          __  __ __ _ __ "#.bold().cyan());
    println!("{}", r#"  / /  ___  / /_/ //_/(_) /_"#.bold().cyan());
    println!("{}", r#" / _ \/ _ \/ __/ ,<  / / __/"#.bold().cyan());
    println!("{}", r#"/_.__/\___/\__/_/|_|/_/\__/ "#.bold().cyan());
    println!();
    println!("  {} {}", "botkit".bold(), format!("v{}", version()).dimmed());
    println!("  Robots, devices and the work that drives them");
    println!();
}

fn print_usage() {
    println!("{}", "Usage:".bold());
    println!("  botkit [run] [FLEET]     start every robot, Ctrl-C to stop");
    println!("  botkit summary [FLEET]   print the fleet topology as JSON");
    println!("  botkit init [FLEET]      write the demo fleet file");
    println!();
    println!("FLEET defaults to {}", config::fleet_path().display());
}
