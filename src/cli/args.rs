use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum Module {
    #[default]
    Consensus,
    Stats,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum Trimmer {
    #[default]
    Fastp,
    Trimmomatic,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum SpadesMode {
    #[default]
    Rnaviral,
    Metaviral,
    Careful,
    Isolate,
    Default,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum ConsensusCaller {
    #[default]
    Samtools,
    Ivar,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "sammvir", version, about = "Viral consensus genome reconstruction from paired-end reads")]
pub struct Arguments {

    #[arg(short, long, value_enum, default_value = "consensus")]
    pub module: Module,

    // -d/-v/-q share one level; the last one given wins
    #[arg(short = 'd', long = "debug", overrides_with_all = ["verbose", "quiet"], help = "Print lots of debugging statements")]
    pub debug: bool,

    #[arg(short = 'v', long = "verbose", overrides_with_all = ["debug", "quiet"], help = "Be verbose")]
    pub verbose: bool,

    #[arg(short = 'q', long = "quiet", overrides_with_all = ["debug", "verbose"], help = "Be quiet: silence warnings")]
    pub quiet: bool,

    #[arg(long, help = "Print commands but do not execute them")]
    pub dry_run: bool,

    #[arg(short = '1', long = "reads1")]
    pub reads1: Option<String>,

    #[arg(short = '2', long = "reads2")]
    pub reads2: Option<String>,

    #[arg(short = 'r', long = "reference")]
    pub reference: Option<String>,

    #[arg(short = 's', long = "sample-name")]
    pub sample_name: Option<String>,

    #[arg(short = 'o', long = "out", help = "Output directory for all generated files. If not specified, a directory named '<sample_base>_YYYYMMDD' will be created in the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(long, help = "Threads handed to external tools; defaults to physical cores")]
    pub threads: Option<usize>,

    #[arg(long, help = "Directory holding the external executables; defaults to PATH lookup")]
    pub tool_dir: Option<String>,

    #[arg(long, value_enum, default_value = "fastp")]
    pub trimmer: Trimmer,

    #[arg(long, help = "Adapter FASTA for trimmomatic ILLUMINACLIP")]
    pub adapters: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub quality: u8,

    #[arg(long, default_value_t = 36)]
    pub min_length: usize,

    #[arg(long, value_enum, default_value = "rnaviral")]
    pub spades_mode: SpadesMode,

    #[arg(long, value_enum, default_value = "samtools")]
    pub consensus_caller: ConsensusCaller,

    #[arg(long, visible_alias = "call-fraction", default_value_t = 0.75, help = "Minimum allele frequency for a consensus base call (ivar -t, samtools consensus -c)")]
    pub ivar_freq: f64,

    #[arg(long, default_value_t = 20, help = "Minimum base quality counted by ivar consensus")]
    pub ivar_qual: u8,

    #[arg(long, default_value_t = 10, help = "Depth counted as covered in read-depth statistics")]
    pub min_depth: u32,

    #[arg(long, help = "Count raw and trimmed read records")]
    pub count_reads: bool,

    #[arg(long, help = "Remove tmp/ after the final outputs are published")]
    pub clean: bool,

    // stats module
    #[arg(short = 'c', long = "aligned-contigs", help = "BAM file of scaffolds aligned to a reference")]
    pub aligned_contigs: Option<String>,

    #[arg(short = 'a', long = "aligned-reads", help = "BAM file of reads aligned to the consensus")]
    pub aligned_reads: Option<String>,

    #[arg(long, help = "Consensus FASTA to summarise alongside the alignments")]
    pub consensus: Option<String>,
}
