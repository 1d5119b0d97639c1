use clap::{Parser, Subcommand};

/// Dataset, snapshot and stream commands
#[derive(Parser, Debug)]
#[command(
    name = "zzzfs",
    version,
    about = "ZFS-style datasets emulated on plain directories",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Create a filesystem, or a volume with -V
    Create {
        /// Create missing parent datasets
        #[arg(short = 'p')]
        parents: bool,
        /// Volume size (e.g. 10M); creates a volume instead of a filesystem
        #[arg(short = 'V')]
        volsize: Option<String>,
        /// property=value, repeatable
        #[arg(short = 'o')]
        props: Vec<String>,
        name: String,
    },
    /// Destroy a dataset or snapshot
    Destroy {
        /// Also destroy children and snapshots
        #[arg(short = 'r')]
        recursive: bool,
        /// Also destroy dependent clones
        #[arg(short = 'R')]
        cascade: bool,
        target: String,
    },
    /// List datasets (and snapshots with -t)
    List {
        #[arg(short = 'r')]
        recursive: bool,
        /// Limit recursion depth
        #[arg(short = 'd')]
        depth: Option<usize>,
        /// all, or a comma list of filesystem,volume,snapshot
        #[arg(short = 't')]
        types: Option<String>,
        /// Scripted mode: no header, tab-separated
        #[arg(short = 'H')]
        scripted: bool,
        /// Exact byte counts
        #[arg(short = 'p')]
        parsable: bool,
        /// Comma list of columns; any property name is a valid column
        #[arg(short = 'o', default_value = "name,used,avail,refer,mountpoint")]
        fields: String,
        /// Sort ascending by this column, repeatable
        #[arg(short = 's')]
        sort_asc: Vec<String>,
        /// Sort descending by this column, repeatable
        #[arg(short = 'S')]
        sort_desc: Vec<String>,
        targets: Vec<String>,
    },
    /// Show properties: `get all tank/a` or `get compression,atime tank/a tank/b`
    Get {
        #[arg(short = 'H')]
        scripted: bool,
        #[arg(short = 'p')]
        parsable: bool,
        /// Also show descendants
        #[arg(short = 'r')]
        recursive: bool,
        /// Limit recursion depth
        #[arg(short = 'd')]
        depth: Option<usize>,
        /// Comma list of name,property,value,source
        #[arg(short = 'o')]
        fields: Option<String>,
        /// Only values from these sources: local,inherited,default,none
        #[arg(short = 's')]
        sources: Option<String>,
        /// all, or a comma list of filesystem,volume,snapshot
        #[arg(short = 't')]
        types: Option<String>,
        keys: String,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Set a property: `set compression=gzip tank/a`
    Set {
        assignment: String,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Drop a local override so the value is inherited again
    Inherit {
        #[arg(short = 'r')]
        recursive: bool,
        key: String,
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Take snapshots: `snapshot [-r] tank/a@label ...`
    Snapshot {
        #[arg(short = 'r')]
        recursive: bool,
        /// property=value attached to the snapshot, repeatable
        #[arg(short = 'o')]
        props: Vec<String>,
        #[arg(required = true)]
        snapshots: Vec<String>,
    },
    /// Roll a dataset back to a snapshot
    Rollback {
        /// Destroy more recent snapshots
        #[arg(short = 'r')]
        recursive: bool,
        snapshot: String,
    },
    /// Changes between a snapshot and a later snapshot or the live dataset
    Diff {
        snapshot: String,
        other: Option<String>,
    },
    /// Create a dataset from a snapshot
    Clone {
        #[arg(short = 'p')]
        parents: bool,
        #[arg(short = 'o')]
        props: Vec<String>,
        snapshot: String,
        target: String,
    },
    /// Make a clone independent of its origin
    Promote { clone: String },
    /// Rename a dataset or snapshot (`rename tank/a@old new` keeps the dataset)
    Rename {
        #[arg(short = 'p')]
        parents: bool,
        from: String,
        to: String,
    },
    /// Write a snapshot stream to stdout
    Send {
        /// Incremental from this earlier snapshot (label or full name)
        #[arg(short = 'i')]
        base: Option<String>,
        snapshot: String,
    },
    /// Create a dataset from a stream on stdin
    #[command(alias = "recv")]
    Receive {
        /// Replace the destination / discard its changes
        #[arg(short = 'F')]
        force: bool,
        dest: String,
    },
}
