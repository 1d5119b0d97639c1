use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pool commands
#[derive(Parser, Debug)]
#[command(
    name = "zzzpool",
    version,
    about = "ZFS-style pools emulated on plain directories",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Create a pool whose content lives in <DIR>/<NAME>
    Create {
        /// property=value for the root dataset, repeatable
        #[arg(short = 'o')]
        props: Vec<String>,
        name: String,
        dir: PathBuf,
    },
    /// Destroy a pool with all its datasets and snapshots
    Destroy {
        /// Required when the pool still holds datasets or snapshots
        #[arg(short = 'r', short_alias = 'f')]
        recursive: bool,
        name: String,
    },
    /// Show pools with size and health
    List {
        #[arg(short = 'H')]
        scripted: bool,
        #[arg(short = 'p')]
        parsable: bool,
        /// Comma list of name,size,alloc,free,cap,health,altroot
        #[arg(short = 'o', default_value = "name,size,alloc,free,cap,health,altroot")]
        fields: String,
        pools: Vec<String>,
    },
    /// Show the command history of pools
    History {
        /// Long format: add user and host
        #[arg(short = 'l')]
        long: bool,
        pools: Vec<String>,
    },
}
