use std::collections::HashMap;
use std::path::PathBuf;
use lazy_static::lazy_static;
use thiserror::Error;
use crate::cli::{Arguments, Module};
use crate::utils::file::{resolve_path, sample_base, setup_output_dir};
use crate::utils::system::resolve_threads;

// External software
pub const FASTP_TAG: &str = "fastp";
pub const TRIMMOMATIC_TAG: &str = "trimmomatic";
pub const SPADES_TAG: &str = "spades.py";
pub const MINIMAP2_TAG: &str = "minimap2";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const IVAR_TAG: &str = "ivar";


lazy_static! {
    /// Minimum (major, minor) versions known to support the flags we pass.
    pub static ref TOOL_VERSIONS: HashMap<&'static str, (u32, u32)> = {
        let mut m = HashMap::new();
        m.insert(FASTP_TAG, (0, 20));
        m.insert(TRIMMOMATIC_TAG, (0, 36));
        m.insert(SPADES_TAG, (3, 15));
        m.insert(MINIMAP2_TAG, (2, 17));
        m.insert(SAMTOOLS_TAG, (1, 16)); // `samtools consensus`
        m.insert(IVAR_TAG, (1, 3));
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    View,
    Sort,
    Index,
    Faidx,
    Mpileup,
    Consensus,
    Flagstat,
    Coverage,
    Depth,
}

impl SamtoolsSubcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamtoolsSubcommand::View => "view",
            SamtoolsSubcommand::Sort => "sort",
            SamtoolsSubcommand::Index => "index",
            SamtoolsSubcommand::Faidx => "faidx",
            SamtoolsSubcommand::Mpileup => "mpileup",
            SamtoolsSubcommand::Consensus => "consensus",
            SamtoolsSubcommand::Flagstat => "flagstat",
            SamtoolsSubcommand::Coverage => "coverage",
            SamtoolsSubcommand::Depth => "depth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IvarSubcommand {
    Consensus
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MinimapPreset {
    /// Contigs against a close reference
    Asm5,
    /// Short reads
    Sr,
}

impl MinimapPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            MinimapPreset::Asm5 => "asm5",
            MinimapPreset::Sr => "sr",
        }
    }
}

// Static Filenames
pub const TMP_DIR: &str = "tmp";
pub const TRIMMED_DIR: &str = "trimmed";
pub const ASSEMBLY_DIR: &str = "assembly";
pub const CONTIG_ALIGNMENT_DIR: &str = "contig_alignment";
pub const CONSENSUS_DIR: &str = "consensus";
pub const READ_ALIGNMENT_DIR: &str = "read_alignment";
pub const LOGS_DIR: &str = "logs";
pub const SPADES_SCAFFOLDS: &str = "scaffolds.fasta";


// Static Parameters
pub const TRIMMOMATIC_CLIP: &str = "2:30:10";
pub const TRIMMOMATIC_WINDOW: usize = 4;
pub const TRIMMOMATIC_EDGE_QUAL: usize = 3;
pub const STDERR_TAIL_LINES: usize = 20;
// Contigs stack roughly one deep over the reference
pub const CONTIG_CONSENSUS_MIN_DEPTH: usize = 1;

pub const FASTA_TAG : &str = "fasta";
pub const FASTQ_TAG : &str = "fastq";
pub const GZIP_EXT: &str = "gz";
pub const FASTA_EXTS: &[&'static str] = &["fasta", "fa", "fna", "fas"];
pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];


pub struct RunConfig  {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub sample: String,
    pub threads: usize,
    pub args: Arguments,
}

impl RunConfig {
    /// Resolves sample name, output directory and thread count from the arguments.
    /// Nothing is created here; pipelines create the output directory after
    /// validating their inputs.
    pub fn new(args: Arguments, cwd: PathBuf) -> Result<Self, PipelineError> {
        let sample = match (&args.sample_name, &args.reads1, args.module) {
            (Some(name), _, _) if !name.trim().is_empty() => name.trim().to_string(),
            (_, Some(r1), Module::Consensus) => sample_base(&resolve_path(r1, &cwd)),
            _ => {
                return Err(PipelineError::InvalidConfig(
                    "a sample name is required (--sample-name, or --reads1 for the consensus module)".to_string(),
                ))
            }
        };
        let out_dir = setup_output_dir(&args, &cwd, &sample);
        let threads = resolve_threads(args.threads);
        Ok(RunConfig { cwd, out_dir, sample, threads, args })
    }

    /// Makes a user-supplied path absolute against the working directory.
    pub fn input_path(&self, path: &str) -> PathBuf {
        resolve_path(path, &self.cwd)
    }

    /// Resolves an external tool to an executable path, honoring `--tool-dir`.
    pub fn tool_path(&self, tool: &str) -> PathBuf {
        match &self.args.tool_dir {
            Some(dir) => {
                let dir = PathBuf::from(dir);
                let dir = if dir.is_absolute() { dir } else { self.cwd.join(dir) };
                dir.join(tool)
            }
            None => PathBuf::from(tool),
        }
    }

    pub fn dry_run(&self) -> bool {
        self.args.dry_run
    }

    /// Per-stage tool logs land here.
    pub fn log_dir(&self) -> PathBuf {
        self.out_dir.join(TMP_DIR).join(LOGS_DIR)
    }
}


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("Stage '{stage}' did not produce expected output {path}")]
    MissingOutput { stage: String, path: PathBuf },

    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("{tool} not found: {error}")]
    ToolNotFound { tool: String, error: String },

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Invalid FASTQ: {0}")]
    InvalidFastqFormat(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}
