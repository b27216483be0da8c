use clap::Parser;
use imdedup::Opts;
use imdedup::cli::SubCommandExtend;
use imdedup::config::SubCommand;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Init(config) => config.run(&opts).await,
        SubCommand::Index(config) => config.run(&opts).await,
        SubCommand::Cluster(config) => config.run(&opts).await,
        SubCommand::Review(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
        SubCommand::Export(config) => config.run(&opts).await,
    }
}
