use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

use mbsc::{
    config::{self, MenuNode},
    dispatch::Dispatcher,
};

#[derive(Parser, Debug)]
#[command(name = "mbsc", version, about = "Menu-bar shell command launcher")]
struct Cli {
    /// Config file to use instead of ~/.mbsc.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the configured menu tree.
    List,
    /// Sends a configured action to the terminal, as a menu click would.
    Run {
        /// Action name, or `Section/Action` for an action inside a section.
        name: String,
        /// Overrides the terminal named in the config.
        #[arg(long)]
        terminal: Option<String>,
        /// Print the generated AppleScript instead of running it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Parses the config file and reports the first problem.
    Check,
    /// Creates the config file from the bundled template if it is missing.
    Init,
    /// Prints the config path that would be used.
    ConfigPath,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = TermLogger::init(
        level,
        ConfigBuilder::new().build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let path = match cli.config {
        Some(path) => path,
        None => config::resolve_config_path()
            .ok_or_else(|| anyhow!("No config path available (set HOME or pass --config)"))?,
    };

    match cli.command {
        Command::List => {
            let cfg = config::load(&path)?;
            println!("terminal: {}", cfg.terminal);
            for node in &cfg.data {
                match node {
                    MenuNode::Actions(actions) => {
                        for a in actions {
                            println!("- {}: {}", a.name, a.command);
                        }
                    }
                    MenuNode::Sections(sections) => {
                        for s in sections {
                            println!("[{}]", s.name);
                            for a in &s.actions {
                                println!("  - {}: {}", a.name, a.command);
                            }
                        }
                    }
                }
            }
        }
        Command::Run {
            name,
            terminal,
            dry_run,
        } => {
            let cfg = config::load(&path)?;
            let action = cfg
                .find_action(&name)
                .ok_or_else(|| anyhow!("No action named '{name}' in {}", path.display()))?;
            let terminal = terminal.unwrap_or_else(|| cfg.terminal.clone());
            let dispatcher = Dispatcher::new();

            if dry_run {
                let plan = dispatcher.plan(&action.command, &terminal);
                println!("{}", plan.script);
            } else {
                dispatcher
                    .run_blocking(&action.command, &terminal)
                    .with_context(|| format!("run '{name}'"))?;
            }
        }
        Command::Check => {
            let report = config::check(&path)?;
            let cfg = &report.config;
            println!(
                "{}: OK ({} entries, {} actions, terminal {:?})",
                path.display(),
                cfg.data.len(),
                cfg.iter_actions().count(),
                cfg.terminal
            );
            for i in &report.empty_entries {
                println!("warning: data[{i}] has no actions or sections and renders nothing");
            }
        }
        Command::Init => {
            let created = config::ensure_config_file_exists(&path, Some(config::DEFAULT_TEMPLATE))?;
            if created {
                println!("created {}", path.display());
            } else {
                println!("{} already exists", path.display());
            }
        }
        Command::ConfigPath => {
            println!("{}", path.display());
        }
    }

    Ok(())
}
