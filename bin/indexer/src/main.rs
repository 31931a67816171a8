//! The shardex indexer binary.

mod cli;
mod flags;

use clap::Parser;

fn main() {
    shardex_cli::backtrace::enable();

    if let Err(err) = cli::Cli::parse().run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
