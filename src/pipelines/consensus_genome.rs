use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use log::{info, warn};

use crate::cli::{ConsensusCaller, Trimmer};
use crate::config::defs::{
    IvarSubcommand, MinimapPreset, PipelineError, RunConfig, SamtoolsSubcommand,
    CONTIG_CONSENSUS_MIN_DEPTH, FASTP_TAG, FASTQ_TAG, IVAR_TAG, MINIMAP2_TAG,
    SAMTOOLS_TAG, SPADES_SCAFFOLDS, SPADES_TAG, TRIMMOMATIC_TAG,
};
use crate::utils::command::fastp::FastpConfig;
use crate::utils::command::ivar::IvarConfig;
use crate::utils::command::minimap2::Minimap2Config;
use crate::utils::command::samtools::SamtoolsConfig;
use crate::utils::command::spades::SpadesConfig;
use crate::utils::command::trimmomatic::TrimmomaticConfig;
use crate::utils::command::{
    check_versions, expect_output, fastp, ivar, minimap2, required_tools, run_piped, run_tool,
    samtools, spades, trimmomatic,
};
use crate::utils::fastx::record_counter;
use crate::utils::file::{append_to_path, fastx_filetype, file_exists, file_path_manipulator, WorkDirs};

// SPAdes falls back to contigs only when no scaffolds were built
const SPADES_CONTIGS: &str = "contigs.fasta";


/// Validated, absolute input paths of one sample.
#[derive(Debug, Clone)]
pub struct SampleInputs {
    pub reads1: PathBuf,
    pub reads2: PathBuf,
    pub reference: PathBuf,
    pub adapters: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TrimmedReads {
    pub reads1: PathBuf,
    pub reads2: PathBuf,
}

/// Final products copied to the output directory.
#[derive(Debug, Clone)]
pub struct ConsensusOutputs {
    pub consensus: PathBuf,
    pub contigs_bam: PathBuf,
    pub reads_bam: PathBuf,
}


fn required_arg<'a>(value: &'a Option<String>, flag: &str) -> Result<&'a str, PipelineError> {
    value
        .as_deref()
        .ok_or_else(|| PipelineError::InvalidConfig(format!("{} is required for the consensus module", flag)))
}


/// Stage 1: every input named on the command line must exist.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// SampleInputs with absolute paths.
pub fn validate_inputs(config: &RunConfig) -> Result<SampleInputs, PipelineError> {
    let reads1 = config.input_path(required_arg(&config.args.reads1, "--reads1")?);
    let reads2 = config.input_path(required_arg(&config.args.reads2, "--reads2")?);
    let reference = config.input_path(required_arg(&config.args.reference, "--reference")?);

    for path in [&reads1, &reads2, &reference] {
        file_exists(path, false)?;
    }
    if reads1 == reads2 {
        return Err(PipelineError::InvalidConfig(format!(
            "--reads1 and --reads2 are the same file: {}",
            reads1.display()
        )));
    }
    for reads in [&reads1, &reads2] {
        if fastx_filetype(reads).ok() != Some(FASTQ_TAG) {
            warn!("{} does not look like a FASTQ file", reads.display());
        }
    }

    let adapters = match &config.args.adapters {
        Some(a) => {
            let path = config.input_path(a);
            file_exists(&path, false)?;
            if config.args.trimmer != Trimmer::Trimmomatic {
                warn!("--adapters is only used by trimmomatic; fastp detects adapters itself");
            }
            Some(path)
        }
        None => None,
    };

    info!("Sample {}: {} + {} against {}", config.sample, reads1.display(), reads2.display(), reference.display());
    Ok(SampleInputs { reads1, reads2, reference, adapters })
}


/// Stage 3: adapter and quality trimming with the selected trimmer.
async fn trim_reads(
    config: &RunConfig,
    inputs: &SampleInputs,
    dirs: &WorkDirs,
) -> Result<TrimmedReads, PipelineError> {
    let sample = config.sample.as_str();
    let trimmed = match config.args.trimmer {
        Trimmer::Fastp => {
            let fastp_config = FastpConfig {
                reads1: inputs.reads1.clone(),
                reads2: inputs.reads2.clone(),
                out1: file_path_manipulator(sample, Some(dirs.trimmed.as_path()), None, Some("R1.trimmed.fastq.gz"), "_"),
                out2: file_path_manipulator(sample, Some(dirs.trimmed.as_path()), None, Some("R2.trimmed.fastq.gz"), "_"),
                json_report: file_path_manipulator(sample, Some(dirs.trimmed.as_path()), None, Some("fastp.json"), "."),
                html_report: file_path_manipulator(sample, Some(dirs.trimmed.as_path()), None, Some("fastp.html"), "."),
            };
            let args = fastp::arg_generator(config, &fastp_config);
            run_tool(config, "trim", FASTP_TAG, &args).await?;
            TrimmedReads { reads1: fastp_config.out1, reads2: fastp_config.out2 }
        }
        Trimmer::Trimmomatic => {
            let trim_config = TrimmomaticConfig {
                reads1: inputs.reads1.clone(),
                reads2: inputs.reads2.clone(),
                out1_paired: file_path_manipulator(sample, Some(dirs.trimmed.as_path()), None, Some("R1.paired.fastq.gz"), "_"),
                out1_unpaired: file_path_manipulator(sample, Some(dirs.trimmed.as_path()), None, Some("R1.unpaired.fastq.gz"), "_"),
                out2_paired: file_path_manipulator(sample, Some(dirs.trimmed.as_path()), None, Some("R2.paired.fastq.gz"), "_"),
                out2_unpaired: file_path_manipulator(sample, Some(dirs.trimmed.as_path()), None, Some("R2.unpaired.fastq.gz"), "_"),
                adapters: inputs.adapters.clone(),
            };
            let args = trimmomatic::arg_generator(config, &trim_config);
            run_tool(config, "trim", TRIMMOMATIC_TAG, &args).await?;
            TrimmedReads { reads1: trim_config.out1_paired, reads2: trim_config.out2_paired }
        }
    };

    expect_output(config, "trim", &trimmed.reads1)?;
    expect_output(config, "trim", &trimmed.reads2)?;
    Ok(trimmed)
}


/// Counts records off the async runtime.
async fn count_records(path: PathBuf) -> Result<u64, PipelineError> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || record_counter(&path))
        .await
        .map_err(|e| PipelineError::Other(anyhow!("Counting task for {} failed: {}", display, e)))?
        .map_err(|e| PipelineError::InvalidFastqFormat(format!("{}: {}", display, e)))
}


/// Optional read accounting around the trimming stage.
async fn report_read_counts(
    config: &RunConfig,
    inputs: &SampleInputs,
    trimmed: &TrimmedReads,
) -> Result<(), PipelineError> {
    if !config.args.count_reads || config.dry_run() {
        return Ok(());
    }
    let (raw, kept) = tokio::try_join!(
        count_records(inputs.reads1.clone()),
        count_records(trimmed.reads1.clone()),
    )?;
    info!("Read pairs: {} raw, {} after trimming", raw, kept);
    if kept == 0 {
        return Err(PipelineError::ToolExecution {
            tool: match config.args.trimmer {
                Trimmer::Fastp => FASTP_TAG.to_string(),
                Trimmer::Trimmomatic => TRIMMOMATIC_TAG.to_string(),
            },
            error: "no read pairs survived trimming".to_string(),
        });
    }
    Ok(())
}


/// Stage 4: de novo assembly of the trimmed pairs.
///
/// # Returns
/// Path to scaffolds.fasta, or contigs.fasta when SPAdes built no scaffolds.
async fn assemble(config: &RunConfig, trimmed: &TrimmedReads, dirs: &WorkDirs) -> Result<PathBuf, PipelineError> {
    let spades_config = SpadesConfig {
        reads1: trimmed.reads1.clone(),
        reads2: trimmed.reads2.clone(),
        out_dir: dirs.assembly.clone(),
    };
    let args = spades::arg_generator(config, &spades_config);
    run_tool(config, "assemble", SPADES_TAG, &args).await?;

    let scaffolds = dirs.assembly.join(SPADES_SCAFFOLDS);
    if config.dry_run() || expect_output(config, "assemble", &scaffolds).is_ok() {
        return Ok(scaffolds);
    }
    let contigs = dirs.assembly.join(SPADES_CONTIGS);
    if expect_output(config, "assemble", &contigs).is_ok() {
        warn!("No {} from SPAdes; using {}", SPADES_SCAFFOLDS, SPADES_CONTIGS);
        return Ok(contigs);
    }
    Err(PipelineError::MissingOutput { stage: "assemble".to_string(), path: scaffolds })
}


/// SAM -> BAM -> coordinate-sorted BAM -> .bai, checking each step.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `label` - `contigs` or `reads`; names both the files and the log stages.
/// * `sam` - Alignment written by minimap2.
/// * `dir` - Directory receiving the BAM files.
///
/// # Returns
/// Path of the sorted, indexed BAM.
async fn sam_to_sorted_bam(
    config: &RunConfig,
    label: &str,
    sam: &Path,
    dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let sample = config.sample.as_str();
    let bam = file_path_manipulator(sample, Some(dir), None, Some(format!("{}.bam", label).as_str()), ".");
    let sorted = file_path_manipulator(sample, Some(dir), None, Some(format!("{}.sorted.bam", label).as_str()), ".");

    let view_stage = format!("{}_view", label);
    let view_config = SamtoolsConfig::new(SamtoolsSubcommand::View, sam.to_path_buf(), Some(bam.clone()))
        .field("-b", None);
    run_tool(config, &view_stage, SAMTOOLS_TAG, &samtools::arg_generator(config, &view_config)).await?;
    expect_output(config, &view_stage, &bam)?;

    let sort_stage = format!("{}_sort", label);
    let sort_config = SamtoolsConfig::new(SamtoolsSubcommand::Sort, bam.clone(), Some(sorted.clone()));
    run_tool(config, &sort_stage, SAMTOOLS_TAG, &samtools::arg_generator(config, &sort_config)).await?;
    expect_output(config, &sort_stage, &sorted)?;

    let index_stage = format!("{}_index", label);
    let index_config = SamtoolsConfig::new(SamtoolsSubcommand::Index, sorted.clone(), None);
    run_tool(config, &index_stage, SAMTOOLS_TAG, &samtools::arg_generator(config, &index_config)).await?;
    expect_output(config, &index_stage, &append_to_path(&sorted, ".bai"))?;

    Ok(sorted)
}


/// Stage 5: place the assembled contigs on the reference.
async fn align_contigs(
    config: &RunConfig,
    reference: &Path,
    contigs: &Path,
    dirs: &WorkDirs,
) -> Result<PathBuf, PipelineError> {
    let sam = file_path_manipulator(&config.sample, Some(dirs.contig_alignment.as_path()), None, Some("contigs.sam"), ".");
    let minimap2_config = Minimap2Config {
        preset: MinimapPreset::Asm5,
        target: reference.to_path_buf(),
        queries: vec![contigs.to_path_buf()],
        output: sam.clone(),
    };
    run_tool(config, "contig_align", MINIMAP2_TAG, &minimap2::arg_generator(config, &minimap2_config)).await?;
    expect_output(config, "contig_align", &sam)?;

    sam_to_sorted_bam(config, "contigs", &sam, &dirs.contig_alignment).await
}


/// Stage 6: consensus from the sorted contig alignment.
///
/// # Returns
/// Path of the consensus FASTA.
async fn call_consensus(config: &RunConfig, contigs_bam: &Path, dirs: &WorkDirs) -> Result<PathBuf, PipelineError> {
    let prefix = file_path_manipulator(&config.sample, Some(dirs.consensus.as_path()), None, Some("consensus"), ".");
    let consensus = append_to_path(&prefix, ".fa");
    let min_depth = CONTIG_CONSENSUS_MIN_DEPTH.to_string();
    let call_fraction = config.args.ivar_freq.to_string();

    match config.args.consensus_caller {
        ConsensusCaller::Samtools => {
            let consensus_config = SamtoolsConfig::new(
                SamtoolsSubcommand::Consensus,
                contigs_bam.to_path_buf(),
                Some(consensus.clone()),
            )
            .field("-m", Some("simple"))
            .field("-a", None)
            .field("--show-ins", Some("yes"))
            .field("--show-del", Some("no"))
            .field("-d", Some(min_depth.as_str()))
            .field("-c", Some(call_fraction.as_str()));
            let args = samtools::arg_generator(config, &consensus_config);
            run_tool(config, "consensus", SAMTOOLS_TAG, &args).await?;
        }
        ConsensusCaller::Ivar => {
            let mpileup_config = SamtoolsConfig::new(SamtoolsSubcommand::Mpileup, contigs_bam.to_path_buf(), None)
                .field("-aa", None)
                .field("-A", None)
                .field("-d", Some("0"))
                .field("-Q", Some("0"));
            let mpileup_args = samtools::arg_generator(config, &mpileup_config);
            let ivar_args = ivar::arg_generator(config, &IvarConfig {
                subcommand: IvarSubcommand::Consensus,
                prefix: prefix.clone(),
                min_qual: config.args.ivar_qual,
                min_depth: CONTIG_CONSENSUS_MIN_DEPTH,
            });
            run_piped(
                config,
                "consensus",
                (SAMTOOLS_TAG, mpileup_args.as_slice()),
                (IVAR_TAG, ivar_args.as_slice()),
            )
            .await?;
        }
    }
    expect_output(config, "consensus", &consensus)?;
    Ok(consensus)
}


/// Stage 7: index the consensus and map the untrimmed reads back onto it.
async fn realign_reads(
    config: &RunConfig,
    inputs: &SampleInputs,
    consensus: &Path,
    dirs: &WorkDirs,
) -> Result<PathBuf, PipelineError> {
    let faidx_config = SamtoolsConfig::new(SamtoolsSubcommand::Faidx, consensus.to_path_buf(), None);
    run_tool(config, "consensus_index", SAMTOOLS_TAG, &samtools::arg_generator(config, &faidx_config)).await?;
    expect_output(config, "consensus_index", &append_to_path(consensus, ".fai"))?;

    let sam = file_path_manipulator(&config.sample, Some(dirs.read_alignment.as_path()), None, Some("reads.sam"), ".");
    let minimap2_config = Minimap2Config {
        preset: MinimapPreset::Sr,
        target: consensus.to_path_buf(),
        queries: vec![inputs.reads1.clone(), inputs.reads2.clone()],
        output: sam.clone(),
    };
    run_tool(config, "read_align", MINIMAP2_TAG, &minimap2::arg_generator(config, &minimap2_config)).await?;
    expect_output(config, "read_align", &sam)?;

    sam_to_sorted_bam(config, "reads", &sam, &dirs.read_alignment).await
}


async fn publish_file(config: &RunConfig, src: &Path) -> Result<PathBuf, PipelineError> {
    let file_name = src
        .file_name()
        .ok_or_else(|| PipelineError::Other(anyhow!("No file name in {}", src.display())))?;
    let dest = config.out_dir.join(file_name);
    info!("[publish] {} -> {}", src.display(), dest.display());
    if !config.dry_run() {
        tokio::fs::copy(src, &dest).await?;
    }
    Ok(dest)
}


/// Copies the consensus and both sorted alignments (with indexes) out of tmp/.
async fn publish(
    config: &RunConfig,
    consensus: &Path,
    contigs_bam: &Path,
    reads_bam: &Path,
) -> Result<ConsensusOutputs, PipelineError> {
    let published = publish_file(config, consensus).await?;
    publish_file(config, &append_to_path(consensus, ".fai")).await?;
    let contigs = publish_file(config, contigs_bam).await?;
    publish_file(config, &append_to_path(contigs_bam, ".bai")).await?;
    let reads = publish_file(config, reads_bam).await?;
    publish_file(config, &append_to_path(reads_bam, ".bai")).await?;
    Ok(ConsensusOutputs { consensus: published, contigs_bam: contigs, reads_bam: reads })
}


/// Run function for the consensus genome pipeline
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// Result<ConsensusOutputs, PipelineError>
pub async fn run(config: Arc<RunConfig>) -> Result<ConsensusOutputs, PipelineError> {
    println!("\n-------------\n Consensus Genome\n-------------\n");
    if config.dry_run() {
        println!("Dry run: commands are logged, nothing is executed.");
    }

    let inputs = validate_inputs(&config)?;

    check_versions(&config, &required_tools(&config)).await?;

    let dirs = WorkDirs::create(&config.out_dir, config.dry_run())?;

    let trimmed = trim_reads(&config, &inputs, &dirs).await?;
    report_read_counts(&config, &inputs, &trimmed).await?;

    let scaffolds = assemble(&config, &trimmed, &dirs).await?;

    let contigs_bam = align_contigs(&config, &inputs.reference, &scaffolds, &dirs).await?;

    let consensus = call_consensus(&config, &contigs_bam, &dirs).await?;

    let reads_bam = realign_reads(&config, &inputs, &consensus, &dirs).await?;

    let outputs = publish(&config, &consensus, &contigs_bam, &reads_bam).await?;

    if config.args.clean && !config.dry_run() {
        info!("Removing {}", dirs.tmp.display());
        tokio::fs::remove_dir_all(&dirs.tmp).await?;
    }

    println!("Consensus for {}: {}", config.sample, outputs.consensus.display());
    Ok(outputs)
}
