pub mod consensus_genome;
pub mod stats;
