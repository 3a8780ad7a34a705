use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::config::defs::{PipelineError, RunConfig, SamtoolsSubcommand, SAMTOOLS_TAG};
use crate::utils::command::samtools::{self, SamtoolsConfig};
use crate::utils::command::{check_versions, expect_output, run_tool};
use crate::utils::fastx::{fasta_stats, FastaStats};
use crate::utils::file::{create_output_dir, file_exists, file_path_manipulator};
use crate::utils::plotting::plot_depths;
use crate::utils::sambam::{
    depth_breadth, parse_coverage, parse_depth, parse_flagstat_tsv, CoverageRow, FlagstatSummary,
};


/// Everything the stats module measured for one sample.
#[derive(Debug, Clone, Default)]
pub struct SampleStats {
    pub sample: String,
    pub contigs: FlagstatSummary,
    pub reads: FlagstatSummary,
    pub coverage: Vec<CoverageRow>,
    pub depth_breadth: f64,
    pub min_depth: u32,
    pub consensus: Option<FastaStats>,
}

impl SampleStats {
    /// Two-column key/value table.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "metric\tvalue");
        let _ = writeln!(out, "sample\t{}", self.sample);
        let _ = writeln!(out, "contigs_total\t{}", self.contigs.total);
        let _ = writeln!(out, "contigs_mapped\t{}", self.contigs.mapped);
        let _ = writeln!(out, "reads_total\t{}", self.reads.total);
        let _ = writeln!(out, "reads_mapped\t{}", self.reads.mapped);
        let _ = writeln!(out, "reads_mapped_fraction\t{:.4}", self.reads.mapped_fraction());
        if let Some(pp) = self.reads.properly_paired {
            let _ = writeln!(out, "reads_properly_paired\t{}", pp);
        }
        let _ = writeln!(out, "breadth_at_depth_{}\t{:.4}", self.min_depth, self.depth_breadth);
        for row in &self.coverage {
            let _ = writeln!(out, "{}_coverage_percent\t{:.2}", row.rname, row.coverage);
            let _ = writeln!(out, "{}_mean_depth\t{:.2}", row.rname, row.meandepth);
        }
        if let Some(cons) = &self.consensus {
            let _ = writeln!(out, "consensus_records\t{}", cons.records.len());
            let _ = writeln!(out, "consensus_length\t{}", cons.total_length);
            let _ = writeln!(out, "consensus_ambiguous\t{}", cons.total_ambiguous);
            let _ = writeln!(out, "consensus_completeness\t{:.4}", cons.completeness());
        }
        out
    }
}


struct StatsInputs {
    contigs_bam: PathBuf,
    reads_bam: PathBuf,
    consensus: Option<PathBuf>,
}

fn validate_inputs(config: &RunConfig) -> Result<StatsInputs, PipelineError> {
    let contigs_bam = config.args.aligned_contigs.as_deref().ok_or_else(|| {
        PipelineError::InvalidConfig("--aligned-contigs is required for the stats module".to_string())
    })?;
    let reads_bam = config.args.aligned_reads.as_deref().ok_or_else(|| {
        PipelineError::InvalidConfig("--aligned-reads is required for the stats module".to_string())
    })?;
    let inputs = StatsInputs {
        contigs_bam: config.input_path(contigs_bam),
        reads_bam: config.input_path(reads_bam),
        consensus: config.args.consensus.as_deref().map(|c| config.input_path(c)),
    };
    file_exists(&inputs.contigs_bam, false)?;
    file_exists(&inputs.reads_bam, false)?;
    if let Some(c) = &inputs.consensus {
        file_exists(c, false)?;
    }
    Ok(inputs)
}


async fn flagstat(config: &RunConfig, stage: &str, bam: &Path) -> Result<FlagstatSummary, PipelineError> {
    let flagstat_config = SamtoolsConfig::new(SamtoolsSubcommand::Flagstat, bam.to_path_buf(), None)
        .field("-O", Some("tsv"));
    let out = run_tool(config, stage, SAMTOOLS_TAG, &samtools::arg_generator(config, &flagstat_config)).await?;
    match out {
        Some(out) => parse_flagstat_tsv(&out.stdout).map_err(PipelineError::Other),
        None => Ok(FlagstatSummary::default()),
    }
}


/// Writes a samtools report to `output`, then reads it back.
async fn samtools_report(
    config: &RunConfig,
    stage: &str,
    subcommand: SamtoolsSubcommand,
    bam: &Path,
    output: &Path,
) -> Result<Option<String>, PipelineError> {
    let mut report_config = SamtoolsConfig::new(subcommand, bam.to_path_buf(), Some(output.to_path_buf()));
    if subcommand == SamtoolsSubcommand::Depth {
        report_config = report_config.field("-a", None);
    }
    run_tool(config, stage, SAMTOOLS_TAG, &samtools::arg_generator(config, &report_config)).await?;
    if config.dry_run() {
        return Ok(None);
    }
    expect_output(config, stage, output)?;
    Ok(Some(tokio::fs::read_to_string(output).await?))
}


/// Run function for the alignment statistics module
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// Result<SampleStats, PipelineError>; empty in dry-run mode.
pub async fn run(config: Arc<RunConfig>) -> Result<SampleStats, PipelineError> {
    println!("\n-------------\n Stats\n-------------\n");

    let inputs = validate_inputs(&config)?;
    check_versions(&config, &[SAMTOOLS_TAG]).await?;
    create_output_dir(&config.out_dir, config.dry_run())?;

    let sample = config.sample.as_str();
    let out_dir = config.out_dir.as_path();
    let coverage_path = file_path_manipulator(sample, Some(out_dir), None, Some("coverage.tsv"), ".");
    let depth_path = file_path_manipulator(sample, Some(out_dir), None, Some("depth.tsv"), ".");
    let plot_path = file_path_manipulator(sample, Some(out_dir), None, Some("depth.png"), ".");
    let stats_path = file_path_manipulator(sample, Some(out_dir), None, Some("stats.tsv"), ".");

    let contigs = flagstat(&config, "contigs_flagstat", &inputs.contigs_bam).await?;
    let reads = flagstat(&config, "reads_flagstat", &inputs.reads_bam).await?;

    let coverage_text = samtools_report(
        &config,
        "reads_coverage",
        SamtoolsSubcommand::Coverage,
        &inputs.reads_bam,
        &coverage_path,
    )
    .await?;
    let depth_text = samtools_report(
        &config,
        "reads_depth",
        SamtoolsSubcommand::Depth,
        &inputs.reads_bam,
        &depth_path,
    )
    .await?;

    let (Some(coverage_text), Some(depth_text)) = (coverage_text, depth_text) else {
        info!("Dry run: skipping report parsing");
        return Ok(SampleStats { sample: sample.to_string(), ..Default::default() });
    };

    let coverage = parse_coverage(&coverage_text)?;
    let depths = parse_depth(&depth_text)?;
    let min_depth = config.args.min_depth;
    let breadth = depth_breadth(&depths, min_depth);

    let consensus = match &inputs.consensus {
        Some(path) => {
            let path = path.clone();
            let stats = tokio::task::spawn_blocking(move || fasta_stats(&path))
                .await
                .map_err(|e| PipelineError::Other(e.into()))??;
            Some(stats)
        }
        None => None,
    };

    let stats = SampleStats {
        sample: sample.to_string(),
        contigs,
        reads,
        coverage,
        depth_breadth: breadth,
        min_depth,
        consensus,
    };
    tokio::fs::write(&stats_path, stats.to_tsv()).await?;
    info!("Wrote {}", stats_path.display());

    let plot_sample = sample.to_string();
    let plot_result = tokio::task::spawn_blocking(move || plot_depths(&depths, min_depth, &plot_sample, &plot_path)).await;
    match plot_result {
        Ok(Ok(())) => info!("Wrote depth plot"),
        Ok(Err(e)) => warn!("Depth plot skipped: {}", e),
        Err(e) => warn!("Depth plot task failed: {}", e),
    }

    println!(
        "{}: {} of {} reads mapped; {:.1}% of positions at depth >= {}",
        sample,
        stats.reads.mapped,
        stats.reads.total,
        stats.depth_breadth * 100.0,
        min_depth
    );
    Ok(stats)
}
