mod pipelines;
mod utils;
mod config;
mod cli;

use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use env_logger::Builder;
use log::{error, info, LevelFilter};

use crate::cli::parse;
use crate::config::defs::RunConfig;
use pipelines::resequencing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n FastSeq\n-------------\n");

    let cwd = env::current_dir()?;
    info!("The current directory is {:?}\n", cwd);

    let run_config = match RunConfig::from_arguments(args, &cwd) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = resequencing::run(run_config).await {
        error!(
            "Pipeline failed: {} at {} milliseconds.",
            e,
            run_start.elapsed().as_millis()
        );
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}
