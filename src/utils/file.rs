use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{anyhow, Result};
use chrono::DateTime;
use log::{debug, info};

use crate::cli::Arguments;
use crate::config::defs::{
    PipelineError, ASSEMBLY_DIR, CONSENSUS_DIR, CONTIG_ALIGNMENT_DIR, FASTA_EXTS, FASTA_TAG,
    FASTQ_EXTS, FASTQ_TAG, GZIP_EXT, LOGS_DIR, READ_ALIGNMENT_DIR, TMP_DIR, TRIMMED_DIR,
};

const R1_TAGS: &[&str] = &["R1", "r1", "1", "F", "f", "FWD", "fwd", "PE1", "pe1", "READ1", "read1"];


pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}


/// Checks that a file exists.
///
/// # Arguments
///
/// * `path` - File to look for.
/// * `ignore` - When true, a missing file is reported as `Ok(false)` rather than an error.
///
/// # Returns
/// Ok(true) when present.
pub fn file_exists(path: &Path, ignore: bool) -> Result<bool, PipelineError> {
    if path.exists() {
        return Ok(true);
    }
    if ignore {
        debug!("{} does not exist", path.display());
        Ok(false)
    } else {
        Err(PipelineError::MissingInput(path.to_path_buf()))
    }
}


/// Makes a path absolute against `cwd` if it is relative.
pub fn resolve_path(path: &str, cwd: &Path) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}


/// Appends a literal suffix to the full path: `x.bam` + `.bai` -> `x.bam.bai`.
pub fn append_to_path(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}


/// Builds `<dir>/<prefix><delim><base><delim><suffix>`, skipping absent parts.
///
/// # Arguments
///
/// * `base` - Base name, usually the sample name.
/// * `dir` - Optional parent directory.
/// * `prefix` - Optional leading tag.
/// * `suffix` - Optional trailing tag, usually the extension-bearing part.
/// * `delimiter` - Joins the parts.
///
/// # Returns
/// PathBuf of the constructed file.
pub fn file_path_manipulator(
    base: &str,
    dir: Option<&Path>,
    prefix: Option<&str>,
    suffix: Option<&str>,
    delimiter: &str,
) -> PathBuf {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(p) = prefix {
        parts.push(p);
    }
    parts.push(base);
    if let Some(s) = suffix {
        parts.push(s);
    }
    let file_name = parts.join(delimiter);
    match dir {
        Some(d) => d.join(file_name),
        None => PathBuf::from(file_name),
    }
}


/// Splits a file name into the stem and the known sequence-file extensions trailing it.
/// `sample_R1.fastq.gz` becomes (`sample_R1`, ["fastq", "gz"]).
pub fn extension_remover(path: &Path) -> (String, Vec<String>) {
    let mut stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut extensions = Vec::new();

    loop {
        let Some((head, ext)) = stem.rsplit_once('.') else { break };
        let known = ext == GZIP_EXT
            || FASTQ_EXTS.contains(&ext)
            || FASTA_EXTS.contains(&ext);
        if !known || head.is_empty() {
            break;
        }
        extensions.insert(0, ext.to_string());
        stem = head.to_string();
    }
    (stem, extensions)
}


/// FASTA or FASTQ by extension, looking through a trailing .gz.
pub fn fastx_filetype(path: &Path) -> io::Result<&'static str> {
    let (_, extensions) = extension_remover(path);
    for ext in extensions.iter().rev() {
        if FASTQ_EXTS.contains(&ext.as_str()) {
            return Ok(FASTQ_TAG);
        }
        if FASTA_EXTS.contains(&ext.as_str()) {
            return Ok(FASTA_TAG);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Unsupported file type for path: {:?}", path),
    ))
}


/// Derives a sample name from an R1 file by dropping extensions and the
/// rightmost R1 tag plus anything after it.
///
/// # Arguments
///
/// * `path` - R1 FASTQ path.
///
/// # Returns
/// Sample base name. Falls back to the bare stem when no tag is found.
pub fn sample_base(path: &Path) -> String {
    let (stem, _) = extension_remover(path);
    let delimiters = ['_', '.', '-'];

    for &delimiter in delimiters.iter() {
        let parts: Vec<&str> = stem.split(delimiter).collect();
        if parts.len() < 2 {
            continue;
        }
        if let Some(index) = parts.iter().rposition(|p| R1_TAGS.contains(p)) {
            if index > 0 {
                return parts[..index].join(&delimiter.to_string());
            }
        }
    }

    info!("No R1 tag found in {}. Using bare file stem as sample name.", stem);
    if stem.is_empty() {
        "sample".to_string()
    } else {
        stem
    }
}


/// Resolves the output directory without touching the filesystem.
/// If `out_dir` is specified from args, uses it;
/// otherwise, a directory named `<sample_base>_YYYYMMDD` in `cwd`.
/// Pipelines create it with `create_output_dir` once their inputs check out.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// * `sample` - Sample name for the default directory.
/// # Returns
/// path to the output directory.
pub fn setup_output_dir(args: &Arguments, cwd: &Path, sample: &str) -> PathBuf {
    match &args.out_dir {
        Some(out) => resolve_path(out, cwd),
        None => {
            let timestamp = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .ok()
                .and_then(|d| DateTime::from_timestamp(d.as_secs() as i64, 0))
                .map(|dt| dt.format("%Y%m%d").to_string())
                .unwrap_or_else(|| "19700101".to_string());
            cwd.join(format!("{}_{}", sample, timestamp))
        }
    }
}


/// Creates the output directory unless this is a dry run.
pub fn create_output_dir(out_dir: &Path, dry_run: bool) -> Result<(), PipelineError> {
    if dry_run {
        return Ok(());
    }
    fs::create_dir_all(out_dir)
        .map_err(|e| PipelineError::Other(anyhow!("Cannot create output directory {}: {}", out_dir.display(), e)))
}


/// The `tmp/` tree holding every intermediate file of a run.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    pub tmp: PathBuf,
    pub trimmed: PathBuf,
    pub assembly: PathBuf,
    pub contig_alignment: PathBuf,
    pub consensus: PathBuf,
    pub read_alignment: PathBuf,
    pub logs: PathBuf,
}

impl WorkDirs {
    pub fn new(out_dir: &Path) -> Self {
        let tmp = out_dir.join(TMP_DIR);
        WorkDirs {
            trimmed: tmp.join(TRIMMED_DIR),
            assembly: tmp.join(ASSEMBLY_DIR),
            contig_alignment: tmp.join(CONTIG_ALIGNMENT_DIR),
            consensus: tmp.join(CONSENSUS_DIR),
            read_alignment: tmp.join(READ_ALIGNMENT_DIR),
            logs: tmp.join(LOGS_DIR),
            tmp,
        }
    }

    /// Creates the output directory and the tree under it. spades.py insists on
    /// creating its own output directory contents, but an existing empty
    /// directory is accepted.
    pub fn create(out_dir: &Path, dry_run: bool) -> Result<Self, PipelineError> {
        let dirs = WorkDirs::new(out_dir);
        if dry_run {
            info!("Dry run: not creating {}", dirs.tmp.display());
            return Ok(dirs);
        }
        create_output_dir(out_dir, dry_run)?;
        for dir in [
            &dirs.trimmed,
            &dirs.assembly,
            &dirs.contig_alignment,
            &dirs.consensus,
            &dirs.read_alignment,
            &dirs.logs,
        ] {
            fs::create_dir_all(dir)?;
        }
        debug!("Created work tree under {}", dirs.tmp.display());
        Ok(dirs)
    }
}
