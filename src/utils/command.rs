/// Functions and structs for building external tool command lines, running them,
/// and checking what they leave behind.

use std::path::Path;
use std::process::Stdio;

use futures::future::try_join_all;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::defs::{
    PipelineError, RunConfig, FASTP_TAG, IVAR_TAG, MINIMAP2_TAG, SAMTOOLS_TAG, SPADES_TAG,
    STDERR_TAIL_LINES, TOOL_VERSIONS, TRIMMOMATIC_TAG,
};
use crate::utils::streams::pipe_commands;


fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub mod fastp {
    use std::path::PathBuf;
    use crate::config::defs::RunConfig;
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct FastpConfig {
        pub reads1: PathBuf,
        pub reads2: PathBuf,
        pub out1: PathBuf,
        pub out2: PathBuf,
        pub json_report: PathBuf,
        pub html_report: PathBuf,
    }

    pub fn arg_generator(config: &RunConfig, fastp_config: &FastpConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-i".to_string());
        args_vec.push(path_arg(&fastp_config.reads1));
        args_vec.push("-I".to_string());
        args_vec.push(path_arg(&fastp_config.reads2));
        args_vec.push("-o".to_string());
        args_vec.push(path_arg(&fastp_config.out1));
        args_vec.push("-O".to_string());
        args_vec.push(path_arg(&fastp_config.out2));
        args_vec.push("-q".to_string());
        args_vec.push(config.args.quality.to_string());
        args_vec.push("-l".to_string());
        args_vec.push(config.args.min_length.to_string());
        args_vec.push("-w".to_string());
        // fastp caps worker threads at 16
        args_vec.push(config.threads.min(16).to_string());
        args_vec.push("-j".to_string());
        args_vec.push(path_arg(&fastp_config.json_report));
        args_vec.push("-h".to_string());
        args_vec.push(path_arg(&fastp_config.html_report));
        args_vec
    }
}

pub mod trimmomatic {
    use std::path::PathBuf;
    use crate::config::defs::{RunConfig, TRIMMOMATIC_CLIP, TRIMMOMATIC_EDGE_QUAL, TRIMMOMATIC_WINDOW};
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct TrimmomaticConfig {
        pub reads1: PathBuf,
        pub reads2: PathBuf,
        pub out1_paired: PathBuf,
        pub out1_unpaired: PathBuf,
        pub out2_paired: PathBuf,
        pub out2_unpaired: PathBuf,
        pub adapters: Option<PathBuf>,
    }

    pub fn arg_generator(config: &RunConfig, trim_config: &TrimmomaticConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = vec![
            "PE".to_string(),
            "-threads".to_string(),
            config.threads.to_string(),
            path_arg(&trim_config.reads1),
            path_arg(&trim_config.reads2),
            path_arg(&trim_config.out1_paired),
            path_arg(&trim_config.out1_unpaired),
            path_arg(&trim_config.out2_paired),
            path_arg(&trim_config.out2_unpaired),
        ];
        if let Some(adapters) = &trim_config.adapters {
            args_vec.push(format!("ILLUMINACLIP:{}:{}", path_arg(adapters), TRIMMOMATIC_CLIP));
        }
        args_vec.push(format!("LEADING:{}", TRIMMOMATIC_EDGE_QUAL));
        args_vec.push(format!("TRAILING:{}", TRIMMOMATIC_EDGE_QUAL));
        args_vec.push(format!("SLIDINGWINDOW:{}:{}", TRIMMOMATIC_WINDOW, config.args.quality));
        args_vec.push(format!("MINLEN:{}", config.args.min_length));
        args_vec
    }
}

pub mod spades {
    use std::path::PathBuf;
    use crate::cli::SpadesMode;
    use crate::config::defs::RunConfig;
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct SpadesConfig {
        pub reads1: PathBuf,
        pub reads2: PathBuf,
        pub out_dir: PathBuf,
    }

    pub fn mode_flag(mode: SpadesMode) -> Option<&'static str> {
        match mode {
            SpadesMode::Rnaviral => Some("--rnaviral"),
            SpadesMode::Metaviral => Some("--metaviral"),
            SpadesMode::Careful => Some("--careful"),
            SpadesMode::Isolate => Some("--isolate"),
            SpadesMode::Default => None,
        }
    }

    pub fn arg_generator(config: &RunConfig, spades_config: &SpadesConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        if let Some(flag) = mode_flag(config.args.spades_mode) {
            args_vec.push(flag.to_string());
        }
        args_vec.push("-1".to_string());
        args_vec.push(path_arg(&spades_config.reads1));
        args_vec.push("-2".to_string());
        args_vec.push(path_arg(&spades_config.reads2));
        args_vec.push("-o".to_string());
        args_vec.push(path_arg(&spades_config.out_dir));
        args_vec.push("-t".to_string());
        args_vec.push(config.threads.to_string());
        args_vec
    }
}

pub mod minimap2 {
    use std::path::PathBuf;
    use crate::config::defs::{MinimapPreset, RunConfig};
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct Minimap2Config {
        pub preset: MinimapPreset,
        pub target: PathBuf,
        pub queries: Vec<PathBuf>,
        pub output: PathBuf,
    }

    pub fn arg_generator(config: &RunConfig, minimap2_config: &Minimap2Config) -> Vec<String> {
        let mut args_vec: Vec<String> = vec![
            "-a".to_string(),
            "-x".to_string(),
            minimap2_config.preset.as_str().to_string(),
            "-t".to_string(),
            config.threads.to_string(),
            "-o".to_string(),
            path_arg(&minimap2_config.output),
            path_arg(&minimap2_config.target),
        ];
        args_vec.extend(minimap2_config.queries.iter().map(|q| path_arg(q)));
        args_vec
    }
}

pub mod samtools {
    use std::path::PathBuf;
    use crate::config::defs::{RunConfig, SamtoolsSubcommand};
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct SamtoolsConfig {
        pub subcommand: SamtoolsSubcommand,
        /// Flags in the order they are passed; `None` for bare switches.
        pub subcommand_fields: Vec<(String, Option<String>)>,
        pub input: PathBuf,
        /// `-o` target; `None` writes to stdout or an implicit sidecar file.
        pub output: Option<PathBuf>,
    }

    impl SamtoolsConfig {
        pub fn new(subcommand: SamtoolsSubcommand, input: PathBuf, output: Option<PathBuf>) -> Self {
            SamtoolsConfig { subcommand, subcommand_fields: Vec::new(), input, output }
        }

        pub fn field(mut self, flag: &str, value: Option<&str>) -> Self {
            self.subcommand_fields.push((flag.to_string(), value.map(str::to_string)));
            self
        }
    }

    pub fn arg_generator(config: &RunConfig, samtools_config: &SamtoolsConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = vec![samtools_config.subcommand.as_str().to_string()];

        for (flag, value) in &samtools_config.subcommand_fields {
            args_vec.push(flag.clone());
            if let Some(v) = value {
                args_vec.push(v.clone());
            }
        }

        match samtools_config.subcommand {
            SamtoolsSubcommand::View | SamtoolsSubcommand::Sort | SamtoolsSubcommand::Index => {
                args_vec.push("-@".to_string());
                args_vec.push(config.threads.to_string());
            }
            _ => {}
        }

        if let Some(output) = &samtools_config.output {
            args_vec.push("-o".to_string());
            args_vec.push(path_arg(output));
        }
        args_vec.push(path_arg(&samtools_config.input));
        args_vec
    }
}

pub mod ivar {
    use std::path::PathBuf;
    use crate::config::defs::{IvarSubcommand, RunConfig};
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct IvarConfig {
        pub subcommand: IvarSubcommand,
        /// ivar appends `.fa` to this prefix
        pub prefix: PathBuf,
        pub min_qual: u8,
        pub min_depth: usize,
    }

    pub fn arg_generator(config: &RunConfig, ivar_config: &IvarConfig) -> Vec<String> {
        match ivar_config.subcommand {
            IvarSubcommand::Consensus => vec![
                "consensus".to_string(),
                "-p".to_string(),
                path_arg(&ivar_config.prefix),
                "-q".to_string(),
                ivar_config.min_qual.to_string(),
                "-t".to_string(),
                config.args.ivar_freq.to_string(),
                "-m".to_string(),
                ivar_config.min_depth.to_string(),
            ],
        }
    }
}


/// Output captured from a finished tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}


/// Renders a command line for logs, quoting arguments a shell would split.
pub fn command_line(program: &Path, args: &[String]) -> String {
    let mut parts = vec![program.to_string_lossy().into_owned()];
    for arg in args {
        if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
            parts.push(format!("'{}'", arg.replace('\'', "'\\''")));
        } else {
            parts.push(arg.clone());
        }
    }
    parts.join(" ")
}


fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}


/// Appends the command line and both captured streams to `tmp/logs/<stage>.log`.
async fn append_stage_log(config: &RunConfig, stage: &str, cmd: &str, stdout: &str, stderr: &str) {
    let log_dir = config.log_dir();
    let log_path = log_dir.join(format!("{}.log", stage));
    let result: std::io::Result<()> = async {
        tokio::fs::create_dir_all(&log_dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;
        file.write_all(format!("$ {}\n", cmd).as_bytes()).await?;
        for (name, text) in [("stdout", stdout), ("stderr", stderr)] {
            if text.trim().is_empty() {
                continue;
            }
            file.write_all(format!("[{}]\n", name).as_bytes()).await?;
            file.write_all(text.as_bytes()).await?;
            if !text.ends_with('\n') {
                file.write_all(b"\n").await?;
            }
        }
        file.flush().await
    }
    .await;
    if let Err(e) = result {
        warn!("Could not write log {}: {}", log_path.display(), e);
    }
}


/// Runs one external tool to completion.
/// The command line is always logged. In dry-run mode nothing is executed and
/// `Ok(None)` is returned.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `stage` - Stage label, also the name of the log file under `tmp/logs/`.
/// * `tool` - Tool tag, resolved through `RunConfig::tool_path`.
/// * `args` - Argument vector from the tool's `arg_generator`.
///
/// # Returns
/// Captured stdout/stderr, or a ToolExecution error on a non-zero exit.
pub async fn run_tool(
    config: &RunConfig,
    stage: &str,
    tool: &str,
    args: &[String],
) -> Result<Option<ToolOutput>, PipelineError> {
    let program = config.tool_path(tool);
    let cmd = command_line(&program, args);
    info!("[{}] {}", stage, cmd);

    if config.dry_run() {
        return Ok(None);
    }

    let output = Command::new(&program)
        .args(args)
        .current_dir(&config.cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PipelineError::ToolNotFound {
            tool: tool.to_string(),
            error: e.to_string(),
        })?;

    let tool_output = ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    append_stage_log(config, stage, &cmd, &tool_output.stdout, &tool_output.stderr).await;

    if !output.status.success() {
        return Err(PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: format!("{} ({}): {}", stage, output.status, stderr_tail(&tool_output.stderr)),
        });
    }
    debug!("[{}] {} finished", stage, tool);
    Ok(Some(tool_output))
}


/// Runs `producer | consumer`, same contract as `run_tool`.
pub async fn run_piped(
    config: &RunConfig,
    stage: &str,
    producer: (&str, &[String]),
    consumer: (&str, &[String]),
) -> Result<Option<ToolOutput>, PipelineError> {
    let (producer_tool, producer_args) = producer;
    let (consumer_tool, consumer_args) = consumer;
    let producer_bin = config.tool_path(producer_tool);
    let consumer_bin = config.tool_path(consumer_tool);
    let cmd = format!(
        "{} | {}",
        command_line(&producer_bin, producer_args),
        command_line(&consumer_bin, consumer_args)
    );
    info!("[{}] {}", stage, cmd);

    if config.dry_run() {
        return Ok(None);
    }

    let out = pipe_commands(
        (producer_bin.as_path(), producer_args),
        (consumer_bin.as_path(), consumer_args),
        &config.cwd,
    )
    .await
    .map_err(|e| PipelineError::ToolExecution {
        tool: format!("{} | {}", producer_tool, consumer_tool),
        error: e.to_string(),
    })?;

    let stderr = format!("{}\n{}", out.producer_stderr, out.consumer_stderr);
    append_stage_log(config, stage, &cmd, &out.consumer_stdout, &stderr).await;

    if !out.producer_status.success() {
        return Err(PipelineError::ToolExecution {
            tool: producer_tool.to_string(),
            error: format!("{} ({}): {}", stage, out.producer_status, stderr_tail(&out.producer_stderr)),
        });
    }
    if !out.consumer_status.success() {
        return Err(PipelineError::ToolExecution {
            tool: consumer_tool.to_string(),
            error: format!("{} ({}): {}", stage, out.consumer_status, stderr_tail(&out.consumer_stderr)),
        });
    }
    Ok(Some(ToolOutput { stdout: out.consumer_stdout, stderr }))
}


/// Checks that a stage left its expected output behind. Missing and empty
/// files both fail. Skipped in dry-run mode.
pub fn expect_output(config: &RunConfig, stage: &str, path: &Path) -> Result<(), PipelineError> {
    if config.dry_run() {
        return Ok(());
    }
    let present = std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false);
    if present {
        debug!("[{}] found {}", stage, path.display());
        Ok(())
    } else {
        Err(PipelineError::MissingOutput {
            stage: stage.to_string(),
            path: path.to_path_buf(),
        })
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub raw: String,
}

/// Finds the first `major.minor[...]` token in a tool's version banner.
/// Leading `v` is accepted and trailing build tags (`2.26-r1175`) are ignored.
pub fn parse_version(text: &str) -> Option<ToolVersion> {
    for token in text.split_whitespace() {
        let token = token.trim_start_matches(|c: char| c == 'v' || c == 'V');
        let numeric: String = token
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.');
        let (Some(major), Some(minor)) = (parts.next(), parts.next()) else {
            continue;
        };
        if let (Ok(major), Ok(minor)) = (major.parse::<u32>(), minor.parse::<u32>()) {
            return Some(ToolVersion {
                major,
                minor,
                raw: numeric.trim_end_matches('.').to_string(),
            });
        }
    }
    None
}


fn version_flag(tool: &str) -> &'static str {
    match tool {
        TRIMMOMATIC_TAG => "-version",
        IVAR_TAG => "version",
        _ => "--version",
    }
}


async fn probe_version(config: &RunConfig, tool: &str) -> Result<(String, String), PipelineError> {
    let program = config.tool_path(tool);
    let output = Command::new(&program)
        .arg(version_flag(tool))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PipelineError::ToolNotFound {
            tool: tool.to_string(),
            error: format!("{}. Is {} installed?", e, tool),
        })?;

    // fastp and trimmomatic print their banner on stderr
    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let Some(version) = parse_version(&text) else {
        warn!("Could not parse a version for {} from: {}", tool, text.trim());
        return Ok((tool.to_string(), "unknown".to_string()));
    };

    if let Some(&(min_major, min_minor)) = TOOL_VERSIONS.get(tool) {
        if (version.major, version.minor) < (min_major, min_minor) {
            warn!(
                "{} version {} is older than the tested minimum {}.{}",
                tool, version.raw, min_major, min_minor
            );
        }
    }
    debug!("{} version {}", tool, version.raw);
    Ok((tool.to_string(), version.raw))
}


/// Probes every tool concurrently. Any missing binary fails the run.
/// Skipped in dry-run mode.
pub async fn check_versions(config: &RunConfig, tools: &[&str]) -> Result<Vec<(String, String)>, PipelineError> {
    if config.dry_run() {
        return Ok(Vec::new());
    }
    let versions = try_join_all(tools.iter().map(|tool| probe_version(config, tool))).await?;
    for (tool, version) in &versions {
        info!("Using {} {}", tool, version);
    }
    Ok(versions)
}


/// Tools a consensus run needs, given the chosen trimmer and caller.
pub fn required_tools(config: &RunConfig) -> Vec<&'static str> {
    let mut tools = vec![
        match config.args.trimmer {
            crate::cli::Trimmer::Fastp => FASTP_TAG,
            crate::cli::Trimmer::Trimmomatic => TRIMMOMATIC_TAG,
        },
        SPADES_TAG,
        MINIMAP2_TAG,
        SAMTOOLS_TAG,
    ];
    if config.args.consensus_caller == crate::cli::ConsensusCaller::Ivar {
        tools.push(IVAR_TAG);
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Arguments, ConsensusCaller, SpadesMode, Trimmer};
    use std::path::PathBuf;
    use crate::config::defs::{IvarSubcommand, MinimapPreset, SamtoolsSubcommand};
    use tempfile::tempdir;

    fn test_config(args: Arguments, out_dir: &Path) -> RunConfig {
        RunConfig {
            cwd: out_dir.to_path_buf(),
            out_dir: out_dir.to_path_buf(),
            sample: "S1".to_string(),
            threads: 4,
            args,
        }
    }

    #[test]
    fn test_fastp_args() {
        let config = test_config(Arguments { quality: 25, min_length: 50, ..Default::default() }, Path::new("/o"));
        let args = fastp::arg_generator(&config, &fastp::FastpConfig {
            reads1: PathBuf::from("r1.fq"),
            reads2: PathBuf::from("r2.fq"),
            out1: PathBuf::from("t1.fq.gz"),
            out2: PathBuf::from("t2.fq.gz"),
            json_report: PathBuf::from("f.json"),
            html_report: PathBuf::from("f.html"),
        });
        assert_eq!(
            args,
            vec!["-i", "r1.fq", "-I", "r2.fq", "-o", "t1.fq.gz", "-O", "t2.fq.gz", "-q", "25", "-l", "50", "-w", "4", "-j", "f.json", "-h", "f.html"]
        );
    }

    #[test]
    fn test_trimmomatic_args_with_adapters() {
        let config = test_config(Arguments { quality: 20, min_length: 36, ..Default::default() }, Path::new("/o"));
        let args = trimmomatic::arg_generator(&config, &trimmomatic::TrimmomaticConfig {
            reads1: PathBuf::from("r1.fq"),
            reads2: PathBuf::from("r2.fq"),
            out1_paired: PathBuf::from("p1"),
            out1_unpaired: PathBuf::from("u1"),
            out2_paired: PathBuf::from("p2"),
            out2_unpaired: PathBuf::from("u2"),
            adapters: Some(PathBuf::from("TruSeq3-PE.fa")),
        });
        assert_eq!(args[0], "PE");
        assert_eq!(&args[3..9], &["r1.fq", "r2.fq", "p1", "u1", "p2", "u2"]);
        assert!(args.contains(&"ILLUMINACLIP:TruSeq3-PE.fa:2:30:10".to_string()));
        assert_eq!(args.last().unwrap(), "MINLEN:36");
        assert!(args.contains(&"SLIDINGWINDOW:4:20".to_string()));
    }

    #[test]
    fn test_spades_modes() {
        let mut a = Arguments::default();
        a.spades_mode = SpadesMode::Default;
        let config = test_config(a, Path::new("/o"));
        let spades_config = spades::SpadesConfig {
            reads1: PathBuf::from("t1"),
            reads2: PathBuf::from("t2"),
            out_dir: PathBuf::from("asm"),
        };
        let args = spades::arg_generator(&config, &spades_config);
        assert_eq!(args[0], "-1");

        let config = test_config(Arguments::default(), Path::new("/o"));
        let args = spades::arg_generator(&config, &spades_config);
        assert_eq!(args[0], "--rnaviral");
        assert_eq!(&args[args.len() - 2..], &["-t", "4"]);
    }

    #[test]
    fn test_minimap2_args() {
        let config = test_config(Arguments::default(), Path::new("/o"));
        let args = minimap2::arg_generator(&config, &minimap2::Minimap2Config {
            preset: MinimapPreset::Sr,
            target: PathBuf::from("cons.fa"),
            queries: vec![PathBuf::from("r1.fq"), PathBuf::from("r2.fq")],
            output: PathBuf::from("reads.sam"),
        });
        assert_eq!(args, vec!["-a", "-x", "sr", "-t", "4", "-o", "reads.sam", "cons.fa", "r1.fq", "r2.fq"]);
    }

    #[test]
    fn test_samtools_args() {
        let config = test_config(Arguments::default(), Path::new("/o"));
        let sort = samtools::SamtoolsConfig::new(
            SamtoolsSubcommand::Sort,
            PathBuf::from("in.bam"),
            Some(PathBuf::from("out.bam")),
        );
        assert_eq!(
            samtools::arg_generator(&config, &sort),
            vec!["sort", "-@", "4", "-o", "out.bam", "in.bam"]
        );

        let consensus = samtools::SamtoolsConfig::new(
            SamtoolsSubcommand::Consensus,
            PathBuf::from("s.bam"),
            Some(PathBuf::from("c.fa")),
        )
        .field("-a", None)
        .field("--show-ins", Some("yes"));
        assert_eq!(
            samtools::arg_generator(&config, &consensus),
            vec!["consensus", "-a", "--show-ins", "yes", "-o", "c.fa", "s.bam"]
        );

        let faidx = samtools::SamtoolsConfig::new(SamtoolsSubcommand::Faidx, PathBuf::from("c.fa"), None);
        assert_eq!(samtools::arg_generator(&config, &faidx), vec!["faidx", "c.fa"]);
    }

    #[test]
    fn test_ivar_args() {
        let config = test_config(Arguments { ivar_freq: 0.6, ivar_qual: 20, ..Default::default() }, Path::new("/o"));
        let args = ivar::arg_generator(&config, &ivar::IvarConfig {
            subcommand: IvarSubcommand::Consensus,
            prefix: PathBuf::from("/o/S1"),
            min_qual: config.args.ivar_qual,
            min_depth: 1,
        });
        assert_eq!(args, vec!["consensus", "-p", "/o/S1", "-q", "20", "-t", "0.6", "-m", "1"]);
    }

    #[test]
    fn test_parse_version() {
        let v = parse_version("fastp 0.23.4").unwrap();
        assert_eq!((v.major, v.minor, v.raw.as_str()), (0, 23, "0.23.4"));
        let v = parse_version("2.26-r1175\n").unwrap();
        assert_eq!((v.major, v.minor), (2, 26));
        let v = parse_version("SPAdes genome assembler v3.15.5").unwrap();
        assert_eq!(v.raw, "3.15.5");
        let v = parse_version("samtools 1.17\nUsing htslib 1.17").unwrap();
        assert_eq!((v.major, v.minor), (1, 17));
        assert!(parse_version("no digits here").is_none());
        assert!(parse_version("build 12").is_none());
    }

    #[test]
    fn test_command_line_quoting() {
        let line = command_line(Path::new("samtools"), &["view".to_string(), "a b.bam".to_string()]);
        assert_eq!(line, "samtools view 'a b.bam'");
    }

    #[test]
    fn test_required_tools() {
        let config = test_config(
            Arguments { trimmer: Trimmer::Trimmomatic, consensus_caller: ConsensusCaller::Ivar, ..Default::default() },
            Path::new("/o"),
        );
        assert_eq!(
            required_tools(&config),
            vec![TRIMMOMATIC_TAG, SPADES_TAG, MINIMAP2_TAG, SAMTOOLS_TAG, IVAR_TAG]
        );
    }

    #[test]
    fn test_expect_output() {
        let dir = tempdir().unwrap();
        let config = test_config(Arguments::default(), dir.path());
        let path = dir.path().join("out.bam");
        assert!(matches!(
            expect_output(&config, "sort", &path),
            Err(PipelineError::MissingOutput { .. })
        ));
        std::fs::write(&path, b"").unwrap();
        assert!(expect_output(&config, "sort", &path).is_err());
        std::fs::write(&path, b"BAM").unwrap();
        assert!(expect_output(&config, "sort", &path).is_ok());

        let dry = test_config(Arguments { dry_run: true, ..Default::default() }, dir.path());
        assert!(expect_output(&dry, "sort", &dir.path().join("nope")).is_ok());
    }

    #[tokio::test]
    async fn test_run_tool_dry_run() {
        let dir = tempdir().unwrap();
        let config = test_config(Arguments { dry_run: true, ..Default::default() }, dir.path());
        let out = run_tool(&config, "noop", "definitely-not-a-tool", &["x".to_string()]).await.unwrap();
        assert!(out.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_failure_reports_stderr() {
        let dir = tempdir().unwrap();
        let config = test_config(Arguments::default(), dir.path());
        let args = vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()];
        let err = run_tool(&config, "fail_stage", "sh", &args).await.unwrap_err();
        match err {
            PipelineError::ToolExecution { tool, error } => {
                assert_eq!(tool, "sh");
                assert!(error.contains("broken"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(dir.path().join("tmp/logs/fail_stage.log").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_logs_both_streams() {
        let dir = tempdir().unwrap();
        let config = test_config(Arguments::default(), dir.path());
        let args = vec!["-c".to_string(), "echo to-stdout; echo to-stderr >&2".to_string()];
        let out = run_tool(&config, "log_stage", "sh", &args).await.unwrap().unwrap();
        assert_eq!(out.stdout.trim(), "to-stdout");

        let log = std::fs::read_to_string(dir.path().join("tmp/logs/log_stage.log")).unwrap();
        assert!(log.starts_with("$ sh -c"));
        assert!(log.contains("[stdout]\nto-stdout\n"));
        assert!(log.contains("[stderr]\nto-stderr\n"));
    }

    #[tokio::test]
    async fn test_run_tool_missing_binary() {
        let dir = tempdir().unwrap();
        let config = test_config(Arguments::default(), dir.path());
        let err = run_tool(&config, "x", "sammvir-no-such-binary", &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolNotFound { .. }));
    }
}
