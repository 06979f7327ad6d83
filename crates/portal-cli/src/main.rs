//! Portal CLI: drive the remote object bridge from a terminal.
//!
//! Every invocation serves the bundled sample service in-process, installs a
//! bridge in front of a fresh import system and runs one subcommand.

mod cli;
mod cmd;
mod ui;

use crate::cli::*;
use clap::Parser;

fn init_tracing_stderr(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let config = portal_kernel::load_config(cli.config.as_deref());
    init_tracing_stderr(&config.log_level);

    let session = cmd::session::boot(config, &cli.bridge, cli.config.is_some());
    let ok = match cli.command {
        Commands::Import { modules, json } => cmd::inspect::cmd_import(&session, &modules, json),
        Commands::Get { module, name } => cmd::inspect::cmd_get(&session, &module, &name),
        Commands::Call { module, name, args } => {
            cmd::inspect::cmd_call(&session, &module, &name, &args)
        }
        Commands::New {
            module,
            class,
            args,
            attrs,
        } => cmd::inspect::cmd_new(&session, &module, &class, &args, &attrs),
        Commands::Roots { json } => cmd::system::cmd_roots(&session, json),
        Commands::Ping => cmd::system::cmd_ping(&session),
        Commands::Config => cmd::system::cmd_config(&session),
    };
    if !ok {
        std::process::exit(1);
    }
}
