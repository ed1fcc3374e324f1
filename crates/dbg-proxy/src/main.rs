use clap::Parser;

fn main() -> miette::Result<()> {
    dbg_proxy::cli::Cli::parse().run()
}
