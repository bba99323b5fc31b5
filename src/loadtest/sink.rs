//! Optional latency log.
//!
//! Workers append one line per completed request. A write failure is logged
//! and ignored; it never fails the request or stalls the pool.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::loadtest::error::LoadTestError;

/// Receives the latency of every completed request.
pub trait LatencySink: Send + Sync {
    /// Record one latency.
    fn append(&self, latency: Duration) -> io::Result<()>;

    /// Push buffered records to durable storage.
    fn flush(&self) -> io::Result<()>;
}

/// Buffer size of the latency log writer.
const WRITE_BUFFER: usize = 64 * 1024;

/// Appends latencies in milliseconds (three decimals), one per line.
///
/// Workers share one buffered writer. The line is formatted before the lock
/// is taken and the lock covers only a copy into the buffer; the file sees a
/// write syscall roughly once per few thousand lines.
pub struct FileLatencySink {
    writer: Mutex<BufWriter<File>>,
}

impl FileLatencySink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, LoadTestError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LoadTestError::Sink {
                source,
                path: path.display().to_string(),
            })?;
        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(WRITE_BUFFER, file)),
        })
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, BufWriter<File>>> {
        self.writer
            .lock()
            .map_err(|_| io::Error::other("latency log writer poisoned"))
    }
}

impl LatencySink for FileLatencySink {
    fn append(&self, latency: Duration) -> io::Result<()> {
        let line = format!("{:.3}\n", latency.as_secs_f64() * 1000.0);
        self.lock()?.write_all(line.as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

impl Drop for FileLatencySink {
    fn drop(&mut self) {
        if let Err(err) = LatencySink::flush(self) {
            tracing::warn!(error = %err, "failed to flush latency log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_writes_one_line_per_latency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latencies.log");

        let sink = FileLatencySink::open(&path).unwrap();
        sink.append(Duration::from_millis(50)).unwrap();
        sink.append(Duration::from_micros(1500)).unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "50.000\n1.500\n");
    }

    #[test]
    fn test_file_sink_appends_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latencies.log");

        {
            let sink = FileLatencySink::open(&path).unwrap();
            sink.append(Duration::from_millis(1)).unwrap();
        }
        {
            let sink = FileLatencySink::open(&path).unwrap();
            sink.append(Duration::from_millis(2)).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2, "got: {content:?}");
    }

    #[test]
    fn test_file_sink_concurrent_appends_keep_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latencies.log");
        let sink = std::sync::Arc::new(FileLatencySink::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for j in 0..250 {
                        sink.append(Duration::from_micros(i * 1000 + j)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2000);
        assert!(content.lines().all(|line| line.parse::<f64>().is_ok()));
    }

    #[test]
    fn test_file_sink_open_in_missing_dir_fails() {
        let result = FileLatencySink::open(Path::new("/nonexistent/dir/latencies.log"));
        assert!(matches!(result, Err(LoadTestError::Sink { .. })));
    }
}
