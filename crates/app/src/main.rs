mod feed;

use clap::Parser;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = feed::FeedCliArgs::parse();
    let config = feed::FeedConfig::try_from(args)?;
    feed::run(config)
}
