use anyhow::Context;
use aws_sdk_ec2::Client as Ec2Client;
use clap::Parser;
use spotscaler_migrate::aws_config::configure_aws;
use spotscaler_migrate::ec2::Ec2TagApi;
use spotscaler_migrate::migrate::Migrator;

#[derive(Parser, Debug)]
#[command(
    name = "spotscaler-migrate",
    version,
    about = "Re-tag spot-autoscaler instances and spot requests for spotscaler"
)]
struct Cli {
    /// Apply the tag changes. Without this flag the planned changes are only printed.
    #[arg(short = 'x', long)]
    execute: bool,

    /// AWS region; falls back to the SDK's default region chain.
    #[arg(long)]
    region: Option<String>,

    /// Shared config profile to load credentials from.
    #[arg(long)]
    profile: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn log_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(log_level(args.verbose))
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let config = configure_aws(args.region, args.profile).await;
    log::info!(
        "using region {}",
        config.region().map(|r| r.as_ref()).unwrap_or("<unset>")
    );

    let api = Ec2TagApi::new(Ec2Client::new(&config));
    let mut stdout = std::io::stdout().lock();
    let report = Migrator::new(&api, args.execute)
        .run(&mut stdout)
        .await
        .context("tag migration aborted")?;

    log::info!(
        "instances: {} groups, {} writes; spot requests: {} groups, {} writes",
        report.instances.groups,
        report.instances.writes,
        report.spot_requests.groups,
        report.spot_requests.writes
    );

    Ok(())
}
