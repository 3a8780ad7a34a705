// src/utils/streams.rs
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{anyhow, Result};
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChildStream {
    Stdout,
    Stderr,
}


/// Collects every line a child writes to one of its output streams.
/// The stream must have been configured with `Stdio::piped()`.
///
/// # Arguments
///
/// * `child` - Spawned child process.
/// * `stream` - Which stream to drain.
///
/// # Returns
/// Vec of lines, without terminators.
pub async fn read_child_output_to_vec(child: &mut Child, stream: ChildStream) -> Result<Vec<String>> {
    let lines: Vec<std::io::Result<String>> = match stream {
        ChildStream::Stdout => {
            let out = child.stdout.take().ok_or_else(|| anyhow!("Child stdout is not piped"))?;
            LinesStream::new(BufReader::new(out).lines()).collect().await
        }
        ChildStream::Stderr => {
            let err = child.stderr.take().ok_or_else(|| anyhow!("Child stderr is not piped"))?;
            LinesStream::new(BufReader::new(err).lines()).collect().await
        }
    };
    lines.into_iter().map(|l| l.map_err(|e| anyhow!("Failed to read child output: {}", e))).collect()
}


/// Result of a `producer | consumer` pair.
#[derive(Debug)]
pub struct PipedOutput {
    pub producer_status: ExitStatus,
    pub consumer_status: ExitStatus,
    pub producer_stderr: String,
    pub consumer_stdout: String,
    pub consumer_stderr: String,
}


/// Runs `producer | consumer` with the producer's stdout wired straight into the
/// consumer's stdin. No shell is involved.
///
/// # Arguments
///
/// * `producer` - Program and arguments writing to stdout.
/// * `consumer` - Program and arguments reading stdin.
/// * `cwd` - Working directory for both children.
///
/// # Returns
/// Exit statuses and captured text of both sides.
pub async fn pipe_commands(
    producer: (&Path, &[String]),
    consumer: (&Path, &[String]),
    cwd: &Path,
) -> Result<PipedOutput> {
    let (producer_bin, producer_args) = producer;
    let (consumer_bin, consumer_args) = consumer;

    let mut producer_child = Command::new(producer_bin)
        .args(producer_args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("Failed to spawn {}: {}", producer_bin.display(), e))?;

    let producer_stdout = producer_child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("Failed to get stdout from {}", producer_bin.display()))?;
    let consumer_stdin: Stdio = producer_stdout
        .try_into()
        .map_err(|e| anyhow!("Failed to hand off stdout of {}: {}", producer_bin.display(), e))?;

    let consumer_child = Command::new(consumer_bin)
        .args(consumer_args)
        .current_dir(cwd)
        .stdin(consumer_stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("Failed to spawn {}: {}", consumer_bin.display(), e))?;
    debug!("Piped {} into {}", producer_bin.display(), consumer_bin.display());

    let producer_stderr_task = {
        let mut child = producer_child;
        tokio::spawn(async move {
            let lines = read_child_output_to_vec(&mut child, ChildStream::Stderr).await?;
            let status = child.wait().await?;
            Ok::<_, anyhow::Error>((status, lines.join("\n")))
        })
    };

    let consumer_output = consumer_child.wait_with_output().await?;
    let (producer_status, producer_stderr) = producer_stderr_task.await??;

    Ok(PipedOutput {
        producer_status,
        consumer_status: consumer_output.status,
        producer_stderr,
        consumer_stdout: String::from_utf8_lossy(&consumer_output.stdout).into_owned(),
        consumer_stderr: String::from_utf8_lossy(&consumer_output.stderr).into_owned(),
    })
}
