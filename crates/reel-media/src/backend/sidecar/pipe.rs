//! FFmpeg child processes with pumped stdio.

use crate::error::StageError;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::ChildStdin;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Stderr lines kept for error reports.
const TAIL_LINES: usize = 24;

/// Raw pictures read ahead of the consumer. Once this many are queued the
/// pump stops reading and ffmpeg blocks on its stdout.
pub(crate) const PICTURE_BACKLOG: usize = 4;

/// How stdout is cut into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chunking {
    /// Exactly `n` bytes per message (one raw picture)
    Fixed(usize),
    /// Whatever a read returns
    Stream,
}

/// A running ffmpeg process.
pub(crate) struct Sidecar {
    label: &'static str,
    child: Option<FfmpegChild>,
    stdin: Option<ChildStdin>,
    stdout: Option<Receiver<Vec<u8>>>,
    tail: Arc<Mutex<VecDeque<String>>>,
}

impl Sidecar {
    /// Start ffmpeg with `args`. Stderr is always drained; every line is
    /// also forwarded to `lines` when given.
    pub fn spawn(
        label: &'static str,
        args: &[String],
        stdout: Option<Chunking>,
        lines: Option<Sender<String>>,
    ) -> Result<Self, StageError> {
        debug!("{}: ffmpeg {}", label, args.join(" "));
        let mut child = FfmpegCommand::new()
            .hide_banner()
            .args(args)
            .spawn()
            .map_err(|e| StageError::Unavailable(format!("cannot start ffmpeg ({}): {}", label, e)))?;

        let stdin = child.take_stdin();

        let stdout = match stdout {
            Some(chunking) => {
                let out = child.take_stdout().ok_or_else(|| {
                    StageError::Unavailable(format!("{}: stdout not piped", label))
                })?;
                let (tx, rx) = stdout_channel(chunking);
                thread::Builder::new()
                    .name(format!("{}-stdout", label))
                    .spawn(move || pump(out, chunking, tx))?;
                Some(rx)
            }
            None => None,
        };

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES)));
        if let Some(err) = child.take_stderr() {
            let tail = Arc::clone(&tail);
            thread::Builder::new()
                .name(format!("{}-stderr", label))
                .spawn(move || collect_lines(err, tail, lines))?;
        }

        Ok(Self {
            label,
            child: Some(child),
            stdin,
            stdout,
            tail,
        })
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), StageError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| StageError::Unavailable(format!("{}: input closed", self.label)))?;
        stdin.write_all(bytes).map_err(|e| {
            StageError::Unavailable(format!("{}: {} ({})", self.label, e, self.tail()))
        })
    }

    /// Signal end of input.
    pub fn close_input(&mut self) {
        self.stdin = None;
    }

    /// Next stdout message if one is ready.
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.stdout.as_ref().and_then(|rx| rx.try_recv().ok())
    }

    /// Block for the next stdout message; `None` once stdout closed.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.stdout.as_ref().and_then(|rx| rx.recv().ok())
    }

    /// Close input and wait for a clean exit.
    pub fn finish(&mut self) -> Result<(), StageError> {
        self.close_input();
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(StageError::Unavailable(format!(
                "{} exited with {}: {}",
                self.label,
                status,
                self.tail()
            )))
        }
    }

    /// Stop the process now and reap it.
    pub fn kill(&mut self) {
        self.close_input();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("{}: kill failed: {}", self.label, e);
            }
            if let Err(e) = child.wait() {
                warn!("{}: wait failed: {}", self.label, e);
            }
        }
        self.stdout = None;
    }

    /// Last stderr lines, joined.
    pub fn tail(&self) -> String {
        let tail = self.tail.lock();
        tail.iter().cloned().collect::<Vec<_>>().join(" | ")
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Queue between the stdout pump and the consumer.
///
/// Raw pictures are bounded. Encoded output stays unbounded: it is small,
/// and a full queue would stall the encoder while frames are written to it.
fn stdout_channel(chunking: Chunking) -> (Sender<Vec<u8>>, Receiver<Vec<u8>>) {
    match chunking {
        Chunking::Fixed(_) => bounded(PICTURE_BACKLOG),
        Chunking::Stream => unbounded(),
    }
}

fn pump(mut out: impl Read, chunking: Chunking, tx: Sender<Vec<u8>>) {
    match chunking {
        Chunking::Fixed(size) => loop {
            let mut buf = vec![0u8; size];
            if out.read_exact(&mut buf).is_err() || tx.send(buf).is_err() {
                break;
            }
        },
        Chunking::Stream => {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match out.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn collect_lines(
    err: impl Read,
    tail: Arc<Mutex<VecDeque<String>>>,
    lines: Option<Sender<String>>,
) {
    for line in BufReader::new(err).lines() {
        let Ok(line) = line else { break };
        {
            let mut tail = tail.lock();
            if tail.len() == TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.clone());
        }
        if let Some(tx) = &lines {
            // The reader may have gone away; keep draining regardless.
            let _ = tx.send(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    #[test]
    fn test_fixed_chunks_drop_partial_tail() {
        let (tx, rx) = stdout_channel(Chunking::Fixed(4));
        pump(Cursor::new(vec![1u8; 10]), Chunking::Fixed(4), tx);
        let chunks: Vec<_> = rx.iter().collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 4));
    }

    #[test]
    fn test_unread_pictures_stall_the_pump() {
        let (tx, rx) = stdout_channel(Chunking::Fixed(1024));
        assert_eq!(rx.capacity(), Some(PICTURE_BACKLOG));
        let worker = thread::spawn(move || {
            pump(Cursor::new(vec![0u8; 1024 * 200]), Chunking::Fixed(1024), tx)
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !rx.is_full() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(rx.len(), PICTURE_BACKLOG);
        assert!(!worker.is_finished());

        // Dropping the consumer unblocks the pump.
        drop(rx);
        worker.join().unwrap();
    }

    #[test]
    fn test_stream_chunks_keep_everything() {
        let (tx, rx) = stdout_channel(Chunking::Stream);
        pump(Cursor::new(vec![7u8; 100_000]), Chunking::Stream, tx);
        let total: usize = rx.iter().map(|c| c.len()).sum();
        assert_eq!(total, 100_000);
    }

    #[test]
    fn test_tail_is_bounded() {
        let text: String = (0..40).map(|i| format!("line {}\n", i)).collect();
        let tail = Arc::new(Mutex::new(VecDeque::new()));
        let (tx, rx) = unbounded();
        collect_lines(Cursor::new(text), Arc::clone(&tail), Some(tx));
        assert_eq!(tail.lock().len(), TAIL_LINES);
        assert_eq!(tail.lock().back().map(String::as_str), Some("line 39"));
        assert_eq!(rx.iter().count(), 40);
    }
}
