// src/utils/system.rs: System functions

use log::debug;


/// Determines number of threads handed to external tools.
/// An explicit `--threads` wins; otherwise the physical core count, never zero.
///
/// # Arguments
///
/// * `args_threads` - Value of `--threads`, if given.
///
/// # Returns
///
/// usize thread count
pub fn resolve_threads(args_threads: Option<usize>) -> usize {
    let physical_cores = num_cpus::get_physical();
    let threads = match args_threads {
        Some(t) if t > 0 => t,
        _ => physical_cores,
    };
    debug!("Detected {} physical cores; using {} threads", physical_cores, threads);
    threads.max(1)
}
