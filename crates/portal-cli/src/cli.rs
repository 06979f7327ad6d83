//! Clap CLI definitions for Portal.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  portal roots                                  Show what the bundled service exposes
  portal import sample_module                   Import a remote module through the bridge
  portal import nested_package.sub.deep_module  Import a nested remote module
  portal get advanced_classes BaseClass         Resolve one name from a module
  portal call sample_module simple_function 21  Call a remote function
  portal new sample_module SimpleClass 5        Construct a stand-in instance
  portal --force test_package import test_package.submodule";

/// Portal: use objects from a remote service as if they were local.
#[derive(Parser)]
#[command(
    name = "portal",
    version,
    about = "Portal \u{00b7} remote object bridge",
    after_help = AFTER_HELP,
)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub bridge: BridgeArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options layered over the config file.
#[derive(Args, Clone, Default)]
pub struct BridgeArgs {
    /// Force a top-level name to resolve remotely (repeatable).
    #[arg(long = "force", global = true, value_name = "ROOT")]
    pub force: Vec<String>,

    /// Only resolve forced roots; never probe the service for other names.
    #[arg(long, global = true)]
    pub no_discover: bool,

    /// Refuse private attribute writes instead of keeping them locally.
    #[arg(long, global = true)]
    pub strict_private: bool,

    /// Create empty package placeholders for forced roots on install.
    #[arg(long, global = true)]
    pub parent_modules: bool,

    /// Serve the bundled service without its `import_module` capability.
    #[arg(long, global = true)]
    pub no_import_capability: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import dotted module names and describe what was loaded.
    Import {
        /// Dotted module names.
        #[arg(required = true)]
        modules: Vec<String>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// `from MODULE import NAME` and describe the result.
    Get {
        /// Dotted module name.
        module: String,
        /// Attribute or submodule name.
        name: String,
    },
    /// Call `MODULE.NAME` with JSON arguments.
    Call {
        /// Dotted module name.
        module: String,
        /// Callable name.
        name: String,
        /// Positional arguments, each parsed as JSON (bare words are strings).
        args: Vec<String>,
    },
    /// Construct `MODULE.CLASS` and describe the stand-in instance.
    New {
        /// Dotted module name.
        module: String,
        /// Class name.
        class: String,
        /// Constructor arguments, each parsed as JSON (bare words are strings).
        args: Vec<String>,
        /// Attributes to read from the new instance.
        #[arg(long = "attr", value_name = "NAME")]
        attrs: Vec<String>,
    },
    /// Show the service's top-level names and the bridge's root table.
    Roots {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check that the service connection is alive.
    Ping,
    /// Print the effective configuration.
    Config,
}
