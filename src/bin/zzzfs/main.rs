use anyhow::Result;
use clap::Parser;

mod cli;
mod cmd_dataset;
mod cmd_props;
mod cmd_snapshot;
mod cmd_stream;
mod util;

fn main() {
    zzzfs::cli::init_logger();

    let res = run();
    log::debug!("metrics: {:?}", zzzfs::metrics::metrics_snapshot());
    if let Err(e) = res {
        zzzfs::cli::fail(e);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Create { parents, volsize, props, name } =>
            cmd_dataset::create(&name, parents, volsize, &props),

        cli::Cmd::Destroy { recursive, cascade, target } =>
            cmd_dataset::destroy(&target, recursive, cascade),

        cli::Cmd::List { recursive, depth, types, scripted, parsable, fields, sort_asc, sort_desc, targets } =>
            cmd_dataset::list(&targets, &cmd_dataset::ListOptions {
                recursive,
                depth,
                types: types.as_deref(),
                scripted,
                parsable,
                fields: &fields,
                sort_asc: &sort_asc,
                sort_desc: &sort_desc,
            }),

        cli::Cmd::Rename { parents, from, to } =>
            cmd_dataset::rename(&from, &to, parents),

        cli::Cmd::Get { scripted, parsable, recursive, depth, fields, sources, types, keys, targets } =>
            cmd_props::get(&keys, &targets, &cmd_props::GetOptions {
                recursive,
                depth,
                fields: fields.as_deref(),
                sources: sources.as_deref(),
                types: types.as_deref(),
                scripted,
                parsable,
            }),

        cli::Cmd::Set { assignment, targets } =>
            cmd_props::set(&assignment, &targets),

        cli::Cmd::Inherit { recursive, key, targets } =>
            cmd_props::inherit(&key, &targets, recursive),

        cli::Cmd::Snapshot { recursive, props, snapshots } =>
            cmd_snapshot::snapshot(&snapshots, recursive, &props),

        cli::Cmd::Rollback { recursive, snapshot } =>
            cmd_snapshot::rollback(&snapshot, recursive),

        cli::Cmd::Diff { snapshot, other } =>
            cmd_snapshot::diff(&snapshot, other.as_deref()),

        cli::Cmd::Clone { parents, props, snapshot, target } =>
            cmd_snapshot::clone(&snapshot, &target, parents, &props),

        cli::Cmd::Promote { clone } =>
            cmd_snapshot::promote(&clone),

        cli::Cmd::Send { base, snapshot } =>
            cmd_stream::send(&snapshot, base.as_deref()),

        cli::Cmd::Receive { force, dest } =>
            cmd_stream::receive(&dest, force),
    }
}
