use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{error, info};

use sammvir::cli::{self, Module};
use sammvir::config::defs::{PipelineError, RunConfig};
use sammvir::pipelines::{consensus_genome, stats};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = cli::parse();
    let log_level = cli::log_level(&args);

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

    println!("\n-------------\n SAMMVir\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let module = args.module;
    let run_config = match RunConfig::new(args, dir) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid run configuration: {}", e);
            std::process::exit(2);
        }
    };
    info!("Sample {}; output directory {:?}; {} threads", run_config.sample, run_config.out_dir, run_config.threads);

    if let Err(e) = match module {
        Module::Consensus => consensus_genome_run(run_config).await,
        Module::Stats => stats_run(run_config).await,
    } {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn consensus_genome_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    consensus_genome::run(run_config).await.map(|_| ())
}

async fn stats_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    stats::run(run_config).await.map(|_| ())
}
