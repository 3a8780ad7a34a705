use seq_io::fasta::{Reader as FastaReader, Record as FastaRecordTrait};
use seq_io::fastq::Reader as FastqReader;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use flate2::read::MultiGzDecoder;
use crate::config::defs::{FASTA_TAG, FASTQ_TAG};
use crate::utils::file::{fastx_filetype, is_gzipped};


/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens a file, transparently decompressing gzip.
pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let gz = is_gzipped(path)?;
    let file = BufReader::new(File::open(path)?);
    Ok(if gz {
        FileReader::Gzipped(MultiGzDecoder::new(file))
    } else {
        FileReader::Uncompressed(file)
    })
}


/// Counts the records in a FASTA or FASTQ file.
///
/// # Arguments
///
/// * `path` - Valid path to a fastx file, gzipped or not.
///
/// # Returns
/// u64: Number of records.
///
pub fn record_counter(path: &Path) -> io::Result<u64> {
    let reader = open_reader(path)?;
    let mut counter = 0;
    match fastx_filetype(path)? {
        FASTA_TAG => {
            for record in FastaReader::new(reader).into_records() {
                record.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                counter += 1;
            }
        }
        FASTQ_TAG => {
            for record in FastqReader::new(reader).into_records() {
                record.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
                counter += 1;
            }
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported file type {} for {:?}", other, path),
            ))
        }
    }
    Ok(counter)
}


#[derive(Debug, Clone, PartialEq)]
pub struct ContigStats {
    pub id: String,
    pub length: u64,
    /// Bases that are neither A, C, G nor T
    pub ambiguous: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FastaStats {
    pub records: Vec<ContigStats>,
    pub total_length: u64,
    pub total_ambiguous: u64,
}

impl FastaStats {
    /// Fraction of called (unambiguous) bases; 0 for an empty file.
    pub fn completeness(&self) -> f64 {
        if self.total_length == 0 {
            return 0.0;
        }
        (self.total_length - self.total_ambiguous) as f64 / self.total_length as f64
    }
}


/// Length and ambiguity summary for every record of a FASTA file,
/// usually the called consensus.
pub fn fasta_stats(path: &Path) -> io::Result<FastaStats> {
    let mut reader = FastaReader::new(open_reader(path)?);
    let mut stats = FastaStats::default();

    while let Some(record) = reader.next() {
        let record = record.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let id = record.id().map(str::to_string).unwrap_or_default();
        let mut length = 0u64;
        let mut ambiguous = 0u64;
        for line in record.seq_lines() {
            for &base in line {
                length += 1;
                if !matches!(base.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T') {
                    ambiguous += 1;
                }
            }
        }
        stats.total_length += length;
        stats.total_ambiguous += ambiguous;
        stats.records.push(ContigStats { id, length, ambiguous });
    }
    Ok(stats)
}


#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_record_counter_fastq_gz() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reads_R1.fastq.gz");
        let mut enc = GzEncoder::new(File::create(&path)?, Compression::default());
        enc.write_all(b"@r1\nACGT\n+\nIIII\n@r2\nTTTT\n+\nIIII\n@r3\nGG\n+\nII\n")?;
        enc.finish()?;
        assert_eq!(record_counter(&path)?, 3);
        Ok(())
    }

    #[test]
    fn test_record_counter_fasta() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("scaffolds.fasta");
        std::fs::write(&path, b">a\nACGT\nAC\n>b\nGG\n")?;
        assert_eq!(record_counter(&path)?, 2);
        Ok(())
    }

    #[test]
    fn test_record_counter_rejects_unknown_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reads.bam");
        std::fs::write(&path, b"BAM\x01").unwrap();
        assert!(record_counter(&path).is_err());
    }

    #[test]
    fn test_fasta_stats() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("consensus.fa");
        std::fs::write(&path, b">MN908947.3 consensus\nACGTN\nnnAC\n>seg2\nRYAC\n")?;
        let stats = fasta_stats(&path)?;
        assert_eq!(stats.records.len(), 2);
        assert_eq!(stats.records[0], ContigStats { id: "MN908947.3".to_string(), length: 9, ambiguous: 3 });
        assert_eq!(stats.records[1].ambiguous, 2);
        assert_eq!(stats.total_length, 13);
        assert_eq!(stats.total_ambiguous, 5);
        assert!((stats.completeness() - 8.0 / 13.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_fasta_stats_empty() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.fa");
        std::fs::write(&path, b"")?;
        let stats = fasta_stats(&path)?;
        assert!(stats.records.is_empty());
        assert_eq!(stats.completeness(), 0.0);
        Ok(())
    }
}
