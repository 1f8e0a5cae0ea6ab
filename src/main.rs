mod app;
mod config;
mod container;
mod hotkey;
mod model;
mod outside;
mod palette;
mod scroll_lock;

use std::env;
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "cmdpal", version, about = "Keyboard-driven terminal command palette")]
struct Cli {
    /// Override config path. If omitted, cmdpal checks ./cmdpal.toml, ./.cmdpal.toml, and then ~/.config/cmdpal/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra items to load: a JSON array (`.json`) or a TOML file with `[[items]]`
    #[arg(short, long)]
    items: Option<PathBuf>,

    /// Open the palette immediately, print the accepted key, and exit
    #[arg(long)]
    once: bool,

    /// Write an example config to the global config path and exit
    #[arg(long)]
    init: bool,

    /// Overwrite an existing config with --init
    #[arg(long, requires = "init")]
    force: bool,
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    if cli.init {
        let path = config::global_config_path()?;
        config::write_example_config(&path, cli.force)?;
        println!("Wrote example config: {}", path.display());
        return Ok(0);
    }

    let runtime = app::RuntimeContext {
        cwd: env::current_dir()?,
        explicit_config_path: cli.config,
        items_path: cli.items,
        once: cli.once,
    };
    let catalog = app::load_catalog(&runtime)?;
    let once = runtime.once;

    match app::run_tui(catalog, runtime)? {
        Some(item) => {
            println!("{}", item.key);
            Ok(0)
        }
        None if once => Ok(1),
        None => Ok(0),
    }
}
