use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tempfile::tempdir;

use sammvir::cli::Arguments;
use sammvir::config::defs::{PipelineError, RunConfig};
use sammvir::pipelines::consensus_genome;


fn write_inputs(dir: &Path) -> Result<(PathBuf, PathBuf, PathBuf)> {
    let r1 = dir.join("virus_R1.fastq");
    let r2 = dir.join("virus_R2.fastq");
    let reference = dir.join("reference.fasta");
    fs::write(&r1, "@read1/1\nACGTACGT\n+\nIIIIIIII\n")?;
    fs::write(&r2, "@read1/2\nACGTACGT\n+\nIIIIIIII\n")?;
    fs::write(&reference, ">ref\nACGTACGTACGT\n")?;
    Ok((r1, r2, reference))
}

fn config_for(cwd: &Path, out: &str, extra: &[&str]) -> Result<RunConfig, PipelineError> {
    let mut argv = vec![
        "sammvir", "-1", "virus_R1.fastq", "-2", "virus_R2.fastq", "-r", "reference.fasta", "-o", out,
        "--threads", "2",
    ];
    argv.extend_from_slice(extra);
    let args = Arguments::parse_from(argv);
    RunConfig::new(args, cwd.to_path_buf())
}


#[tokio::test]
async fn test_dry_run_touches_nothing() -> Result<()> {
    let dir = tempdir()?;
    write_inputs(dir.path())?;
    let config = config_for(dir.path(), "out", &["--dry-run", "--tool-dir", "/nonexistent/tools"])?;
    assert_eq!(config.sample, "virus");

    let outputs = consensus_genome::run(Arc::new(config)).await?;
    assert_eq!(outputs.consensus, dir.path().join("out").join("virus.consensus.fa"));
    assert_eq!(outputs.reads_bam, dir.path().join("out").join("virus.reads.sorted.bam"));
    assert!(!dir.path().join("out").exists());
    Ok(())
}


#[tokio::test]
async fn test_missing_read2_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let (_, r2, _) = write_inputs(dir.path())?;
    fs::remove_file(&r2)?;
    let config = config_for(dir.path(), "out", &["--dry-run"])?;

    match consensus_genome::run(Arc::new(config)).await {
        Err(PipelineError::MissingInput(path)) => assert_eq!(path, r2),
        other => panic!("expected MissingInput, got {:?}", other.map(|o| o.consensus)),
    }
    Ok(())
}


#[tokio::test]
async fn test_missing_reference_flag() -> Result<()> {
    let dir = tempdir()?;
    write_inputs(dir.path())?;
    let args = Arguments::parse_from(["sammvir", "-1", "virus_R1.fastq", "-2", "virus_R2.fastq", "--dry-run"]);
    let config = RunConfig::new(args, dir.path().to_path_buf())?;
    let result = consensus_genome::run(Arc::new(config)).await;
    assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    Ok(())
}


#[tokio::test]
async fn test_failed_validation_leaves_no_output_dir() -> Result<()> {
    let dir = tempdir()?;
    let (r1, _, _) = write_inputs(dir.path())?;
    fs::remove_file(&r1)?;
    let config = config_for(dir.path(), "out", &[])?;
    let out_dir = config.out_dir.clone();

    let result = consensus_genome::run(Arc::new(config)).await;
    assert!(matches!(result, Err(PipelineError::MissingInput(_))));
    assert!(!out_dir.exists());
    Ok(())
}


#[cfg(unix)]
mod fake_tools {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    // Writes every file named after -o/-O/-j/-h, plus .bai/.fai sidecars.
    const GENERIC_TOOL: &str = r#"#!/bin/sh
case "$1" in --version|-version|version) echo "fake 9.9"; exit 0;; esac
prev=""
for a in "$@"; do
  case "$prev" in -o|-O|-j|-h) printf 'fake\n' > "$a";; esac
  prev="$a"
done
if [ "$1" = "index" ]; then printf 'fake\n' > "$prev.bai"; fi
if [ "$1" = "faidx" ]; then printf 'fake\n' > "$prev.fai"; fi
exit 0
"#;

    const SPADES_OK: &str = r#"#!/bin/sh
case "$1" in --version) echo "SPAdes genome assembler v3.15.5"; exit 0;; esac
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then mkdir -p "$a"; printf '>NODE_1\nACGT\n' > "$a/scaffolds.fasta"; fi
  prev="$a"
done
exit 0
"#;

    const SPADES_SILENT: &str = r#"#!/bin/sh
case "$1" in --version) echo "SPAdes genome assembler v3.15.5"; exit 0;; esac
exit 0
"#;

    const SPADES_CONTIGS_ONLY: &str = r#"#!/bin/sh
case "$1" in --version) echo "SPAdes genome assembler v3.15.5"; exit 0;; esac
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then mkdir -p "$a"; printf '>NODE_1\nACGT\n' > "$a/contigs.fasta"; fi
  prev="$a"
done
exit 0
"#;

    // PE -threads N R1 R2 P1 U1 P2 U2 ...
    const TRIMMOMATIC: &str = r#"#!/bin/sh
case "$1" in -version) echo "0.39"; exit 0;; esac
for out in "$6" "$7" "$8" "$9"; do printf 'fake\n' > "$out"; done
exit 0
"#;

    const IVAR: &str = r#"#!/bin/sh
case "$1" in version) echo "iVar version 1.4.2"; exit 0;; esac
cat > /dev/null
prev=""
for a in "$@"; do
  if [ "$prev" = "-p" ]; then printf '>consensus\nACGT\n' > "$a.fa"; fi
  prev="$a"
done
exit 0
"#;

    // Copies @TEMPLATE@ to the -o/-O read outputs so the records can be counted.
    const FASTP_FROM_TEMPLATE: &str = r#"#!/bin/sh
case "$1" in --version) echo "fastp 0.23.4"; exit 0;; esac
prev=""
for a in "$@"; do
  case "$prev" in
    -o|-O) cp "@TEMPLATE@" "$a";;
    -j|-h) printf 'fake\n' > "$a";;
  esac
  prev="$a"
done
exit 0
"#;

    fn install(dir: &Path, name: &str, body: &str) -> Result<()> {
        let path = dir.join(name);
        fs::write(&path, body)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    fn write_gzipped_fastq(path: &Path, text: &str) -> Result<()> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(fs::File::create(path)?, Compression::default());
        encoder.write_all(text.as_bytes())?;
        encoder.finish()?;
        Ok(())
    }

    fn install_set(tools: &Path, fastp: &str, spades: &str) -> Result<()> {
        fs::create_dir_all(tools)?;
        install(tools, "fastp", fastp)?;
        install(tools, "trimmomatic", TRIMMOMATIC)?;
        install(tools, "ivar", IVAR)?;
        install(tools, "minimap2", GENERIC_TOOL)?;
        install(tools, "samtools", GENERIC_TOOL)?;
        install(tools, "spades.py", spades)?;
        Ok(())
    }

    // One test so no other thread forks while scripts are open for writing.
    #[tokio::test]
    async fn test_full_run_with_fake_tools() -> Result<()> {
        let dir = tempdir()?;
        write_inputs(dir.path())?;

        let kept_reads = dir.path().join("kept.fastq.gz");
        let no_reads = dir.path().join("none.fastq.gz");
        write_gzipped_fastq(&kept_reads, "@read1\nACGTACGT\n+\nIIIIIIII\n")?;
        write_gzipped_fastq(&no_reads, "")?;
        let fastp_kept = FASTP_FROM_TEMPLATE.replace("@TEMPLATE@", kept_reads.to_str().unwrap());
        let fastp_none = FASTP_FROM_TEMPLATE.replace("@TEMPLATE@", no_reads.to_str().unwrap());

        let good_tools = dir.path().join("good_tools");
        let bad_tools = dir.path().join("bad_tools");
        let alt_tools = dir.path().join("alt_tools");
        let counting_tools = dir.path().join("counting_tools");
        let empty_tools = dir.path().join("empty_tools");
        install_set(&good_tools, GENERIC_TOOL, SPADES_OK)?;
        install_set(&bad_tools, GENERIC_TOOL, SPADES_SILENT)?;
        install_set(&alt_tools, GENERIC_TOOL, SPADES_CONTIGS_ONLY)?;
        install_set(&counting_tools, &fastp_kept, SPADES_OK)?;
        install_set(&empty_tools, &fastp_none, SPADES_OK)?;

        let config = config_for(dir.path(), "out", &["--tool-dir", good_tools.to_str().unwrap()])?;
        let out_dir = config.out_dir.clone();
        let outputs = consensus_genome::run(Arc::new(config)).await?;

        assert!(outputs.consensus.is_file());
        assert!(out_dir.join("virus.consensus.fa.fai").is_file());
        assert!(out_dir.join("virus.contigs.sorted.bam").is_file());
        assert!(out_dir.join("virus.contigs.sorted.bam.bai").is_file());
        assert!(outputs.reads_bam.is_file());
        assert!(out_dir.join("virus.reads.sorted.bam.bai").is_file());
        assert!(out_dir.join("tmp/trimmed/virus_R1.trimmed.fastq.gz").is_file());
        assert!(out_dir.join("tmp/assembly/scaffolds.fasta").is_file());

        let trim_log = fs::read_to_string(out_dir.join("tmp/logs/trim.log"))?;
        assert!(trim_log.contains("fastp -i"));

        let config = config_for(dir.path(), "out_bad", &["--tool-dir", bad_tools.to_str().unwrap()])?;
        match consensus_genome::run(Arc::new(config)).await {
            Err(PipelineError::MissingOutput { stage, path }) => {
                assert_eq!(stage, "assemble");
                assert!(path.ends_with("scaffolds.fasta"));
            }
            other => panic!("expected MissingOutput, got {:?}", other.map(|o| o.consensus)),
        }

        // trimmomatic, contigs-only assembly, mpileup piped into ivar, then --clean
        let config = config_for(
            dir.path(),
            "out_alt",
            &[
                "--tool-dir", alt_tools.to_str().unwrap(),
                "--trimmer", "trimmomatic",
                "--consensus-caller", "ivar",
                "--clean",
            ],
        )?;
        let out_dir = config.out_dir.clone();
        let outputs = consensus_genome::run(Arc::new(config)).await?;
        assert_eq!(outputs.consensus, out_dir.join("virus.consensus.fa"));
        assert_eq!(fs::read_to_string(&outputs.consensus)?, ">consensus\nACGT\n");
        assert!(out_dir.join("virus.consensus.fa.fai").is_file());
        assert!(outputs.contigs_bam.is_file());
        assert!(outputs.reads_bam.is_file());
        assert!(!out_dir.join("tmp").exists());

        let config = config_for(
            dir.path(),
            "out_counted",
            &["--tool-dir", counting_tools.to_str().unwrap(), "--count-reads"],
        )?;
        let outputs = consensus_genome::run(Arc::new(config)).await?;
        assert!(outputs.consensus.is_file());

        let config = config_for(
            dir.path(),
            "out_empty",
            &["--tool-dir", empty_tools.to_str().unwrap(), "--count-reads"],
        )?;
        match consensus_genome::run(Arc::new(config)).await {
            Err(PipelineError::ToolExecution { tool, error }) => {
                assert_eq!(tool, "fastp");
                assert!(error.contains("no read pairs"));
            }
            other => panic!("expected ToolExecution, got {:?}", other.map(|o| o.consensus)),
        }
        Ok(())
    }
}
