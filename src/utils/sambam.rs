/// Parsers for the text reports samtools writes about an alignment.
use anyhow::{anyhow, Result};


#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlagstatSummary {
    pub total: u64,
    pub primary: Option<u64>,
    pub mapped: u64,
    pub properly_paired: Option<u64>,
}

impl FlagstatSummary {
    pub fn mapped_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.mapped as f64 / self.total as f64
        }
    }
}


/// Reads `samtools flagstat -O tsv`. Only QC-passed counts (first column) are kept.
///
/// # Arguments
///
/// * `text` - stdout of flagstat.
///
/// # Returns
/// FlagstatSummary, or an error when the total line is missing.
pub fn parse_flagstat_tsv(text: &str) -> Result<FlagstatSummary> {
    let mut summary = FlagstatSummary::default();
    let mut saw_total = false;

    for line in text.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            continue;
        }
        let Ok(passed) = fields[0].trim().parse::<u64>() else {
            continue; // percentage rows
        };
        let label = fields[2].trim();
        if label.starts_with("total") {
            summary.total = passed;
            saw_total = true;
        } else if label == "primary" {
            summary.primary = Some(passed);
        } else if label == "mapped" {
            summary.mapped = passed;
        } else if label == "properly paired" {
            summary.properly_paired = Some(passed);
        }
    }

    if !saw_total {
        return Err(anyhow!("No total line in flagstat output"));
    }
    Ok(summary)
}


#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRow {
    pub rname: String,
    pub startpos: u64,
    pub endpos: u64,
    pub numreads: u64,
    pub covbases: u64,
    pub coverage: f64,
    pub meandepth: f64,
    pub meanbaseq: f64,
    pub meanmapq: f64,
}


/// Reads the table printed by `samtools coverage`.
pub fn parse_coverage(text: &str) -> Result<Vec<CoverageRow>> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            return Err(anyhow!("Coverage line {} has {} columns, expected 9", i + 1, fields.len()));
        }
        let int = |idx: usize| -> Result<u64> {
            fields[idx]
                .trim()
                .parse::<u64>()
                .map_err(|e| anyhow!("Coverage line {} column {}: {}", i + 1, idx + 1, e))
        };
        let float = |idx: usize| -> Result<f64> {
            fields[idx]
                .trim()
                .parse::<f64>()
                .map_err(|e| anyhow!("Coverage line {} column {}: {}", i + 1, idx + 1, e))
        };
        rows.push(CoverageRow {
            rname: fields[0].to_string(),
            startpos: int(1)?,
            endpos: int(2)?,
            numreads: int(3)?,
            covbases: int(4)?,
            coverage: float(5)?,
            meandepth: float(6)?,
            meanbaseq: float(7)?,
            meanmapq: float(8)?,
        });
    }
    Ok(rows)
}


/// Reads `samtools depth -a` output into per-position depths, contigs laid end
/// to end in file order.
pub fn parse_depth(text: &str) -> Result<Vec<u32>> {
    let mut depths = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let depth = line
            .split('\t')
            .nth(2)
            .ok_or_else(|| anyhow!("Depth line {} is missing the depth column", i + 1))?;
        depths.push(
            depth
                .trim()
                .parse::<u32>()
                .map_err(|e| anyhow!("Depth line {}: {}", i + 1, e))?,
        );
    }
    Ok(depths)
}


/// Positions at or above `min_depth`, as a fraction of all positions.
pub fn depth_breadth(depths: &[u32], min_depth: u32) -> f64 {
    if depths.is_empty() {
        return 0.0;
    }
    depths.iter().filter(|&&d| d >= min_depth).count() as f64 / depths.len() as f64
}
