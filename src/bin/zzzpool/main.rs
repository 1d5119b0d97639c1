use anyhow::Result;
use clap::Parser;

mod cli;
mod cmd_pool;

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
        cli::Cmd::Create { props, name, dir } =>
            cmd_pool::create(&name, &dir, &props),

        cli::Cmd::Destroy { recursive, name } =>
            cmd_pool::destroy(&name, recursive),

        cli::Cmd::List { scripted, parsable, fields, pools } =>
            cmd_pool::list(&pools, scripted, parsable, &fields),

        cli::Cmd::History { long, pools } =>
            cmd_pool::history(&pools, long),
    }
}
