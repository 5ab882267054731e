mod demo;

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::*;
use log::LevelFilter;
use sim_kernel::{Board, BoardConfig, SimLogger};

/// Binds the drivers of a board description against the host kernel.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "app/bindemo/board.toml")]
    board: PathBuf,
    /// Overrides the board's `log_level`.
    #[arg(short, long)]
    log: Option<LevelFilter>,
    #[command(subcommand)]
    command: Option<SubCommands>,
}

#[derive(Subcommand, Debug)]
enum SubCommands {
    /// Bind everything, exercise each device, print stats, unbind.
    Run(RunArgs),
    /// Print the parsed board and which driver each device would get.
    Show,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Button presses per push-button.
    #[arg(short, long, default_value_t = 3)]
    presses: u32,
    /// Interrupts raised per PCI function.
    #[arg(short, long, default_value_t = 2)]
    interrupts: u32,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            presses: 3,
            interrupts: 2,
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let text = fs::read_to_string(&args.board)
        .with_context(|| format!("reading {}", args.board.display()))?;
    let cfg: BoardConfig = text.parse()?;
    SimLogger::init(args.log.unwrap_or(cfg.log_level.into()))?;

    let board = Board::new(&cfg, &bus_drivers::registers())?;

    match args.command.unwrap_or(SubCommands::Run(RunArgs::default())) {
        SubCommands::Run(a) => demo::run(&board, &cfg, a.presses, a.interrupts),
        SubCommands::Show => {
            print!("{cfg}");
            for desc in board.bus().devices() {
                let driver = board.engine().matches(&desc).unwrap_or("-");
                println!("[{}] {:<20} {:<24} {driver}", desc.device_id, desc.name, desc.key);
            }
            Ok(())
        }
    }
}
