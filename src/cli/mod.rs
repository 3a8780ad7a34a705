pub mod args;

use clap::Parser;
use log::LevelFilter;

pub use args::{Arguments, ConsensusCaller, Module, SpadesMode, Trimmer};

pub fn parse() -> Arguments {
    Arguments::parse()
}

/// Maps -d/-v/-q onto a log level. The parser keeps only the last of the three.
pub fn log_level(args: &Arguments) -> LevelFilter {
    if args.debug {
        LevelFilter::Debug
    } else if args.verbose {
        LevelFilter::Info
    } else if args.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Warn
    }
}
