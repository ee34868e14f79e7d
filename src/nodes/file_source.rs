//! Memory-mapped file byte source
//!
//! Provides `FileSource` - a process node that streams the bytes of a file,
//! or a byte range of it, on a `u8` output port.
//!
//! Each broadcast destination is fed by its own reader thread over the same
//! shared mapping, so a slow consumer on one destination never holds up the
//! others.

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use memmap2::Mmap;
use tracing::{debug, info, warn};

use crate::Result;
use crate::runtime::Sender;
use crate::runtime::node::{InputPort, OutputPort, PortSchema, ProcessNode, WorkError, WorkResult};

/// Bytes per `send_all` batch; shutdown is checked between batches
const CHUNK_SIZE: usize = 64 * 1024;

/// Source node that reads a file through a read-only memory map
///
/// This is a **self-threading node** (`is_self_threading() = true`). The only
/// call to `work()` spawns one reader thread per destination of the `"out"`
/// port. The node reports `should_stop()` once every reader has sent its
/// range and closed its stream. Its item count is the number of bytes the
/// furthest reader has sent.
///
/// # Example
/// ```ignore
/// let source = FileSource::open("capture.bin")?.with_offset(16).with_limit(4096);
/// pipeline.add_process("source", source)?;
/// ```
pub struct FileSource {
    name: String,
    path: PathBuf,
    // Empty files cannot be mapped on every platform
    data: Option<Arc<Mmap>>,
    file_len: usize,
    offset: usize,
    limit: Option<usize>,

    shutdown: Arc<AtomicBool>,
    bytes_sent: Arc<AtomicUsize>,
    threads_completed: Arc<AtomicUsize>,
    thread_handles: Option<Vec<JoinHandle<()>>>,
    threads_spawned: bool,
    num_threads: usize,
}

impl FileSource {
    /// Map a file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len() as usize;

        let data = if file_len == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only; the file is expected not to be
            // truncated while the flowgraph runs.
            Some(Arc::new(unsafe { Mmap::map(&file)? }))
        };

        info!("Mapped {} ({} bytes)", path.display(), file_len);

        Ok(Self {
            name: "file_source".to_string(),
            path,
            data,
            file_len,
            offset: 0,
            limit: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            bytes_sent: Arc::new(AtomicUsize::new(0)),
            threads_completed: Arc::new(AtomicUsize::new(0)),
            thread_handles: None,
            threads_spawned: false,
            num_threads: 0,
        })
    }

    /// Skip the first `offset` bytes
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Emit at most `limit` bytes
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte range that will be emitted, clamped to the file
    pub fn range(&self) -> Range<usize> {
        let start = self.offset.min(self.file_len);
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit).min(self.file_len),
            None => self.file_len,
        };
        start..end
    }

    /// Bytes sent so far, counted on the furthest destination
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    fn reader_thread(
        data: Option<Arc<Mmap>>,
        range: Range<usize>,
        sender: Sender<u8>,
        shutdown: Arc<AtomicBool>,
        bytes_sent: Arc<AtomicUsize>,
    ) {
        let mut sent = 0usize;
        if let Some(data) = data.as_deref() {
            for chunk in data[range].chunks(CHUNK_SIZE) {
                if shutdown.load(Ordering::Relaxed) {
                    debug!("File source: shutdown after {} bytes", sent);
                    break;
                }
                match sender.send_all(chunk.iter().copied()) {
                    Ok(n) => {
                        sent += n;
                        bytes_sent.fetch_max(sent, Ordering::Relaxed);
                    }
                    Err(_) => {
                        debug!("File source: all receivers gone after {} bytes", sent);
                        break;
                    }
                }
            }
        }
        sender.close();
        debug!("File source: reader finished, {} bytes sent", sent);
    }
}

impl ProcessNode for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.threads_spawned && self.threads_completed.load(Ordering::Relaxed) >= self.num_threads
    }

    fn is_self_threading(&self) -> bool {
        true
    }

    fn items_processed(&self) -> Option<usize> {
        Some(self.bytes_sent())
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::output::<u8>("out", 0)]
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        if self.threads_spawned {
            return Err(WorkError::NodeError(
                "work() called multiple times on self-threading node".to_string(),
            ));
        }
        self.threads_spawned = true;

        let senders = outputs
            .first()
            .and_then(|port| port.split_senders::<u8>())
            .unwrap_or_default();
        if senders.is_empty() {
            warn!("[{}] Output not connected, nothing to do", self.name);
            return Ok(0);
        }

        let range = self.range();
        info!(
            "[{}] Streaming bytes {}..{} of {} to {} destination(s)",
            self.name,
            range.start,
            range.end,
            self.path.display(),
            senders.len()
        );

        let mut handles = Vec::with_capacity(senders.len());
        for (dest_idx, sender) in senders.into_iter().enumerate() {
            let data = self.data.clone();
            let range = range.clone();
            let shutdown = Arc::clone(&self.shutdown);
            let bytes_sent = Arc::clone(&self.bytes_sent);
            let completed = Arc::clone(&self.threads_completed);

            let handle = std::thread::Builder::new()
                .name(format!("file_src_dest{}", dest_idx))
                .spawn(move || {
                    Self::reader_thread(data, range, sender, shutdown, bytes_sent);
                    completed.fetch_add(1, Ordering::Relaxed);
                })
                .map_err(|e| WorkError::NodeError(format!("Failed to spawn reader thread: {}", e)))?;
            handles.push(handle);
            self.num_threads += 1;
        }
        self.thread_handles = Some(handles);

        // Bytes are counted as the readers send them
        Ok(0)
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handles) = self.thread_handles.take() {
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ChannelMessage, Watchdog};
    use crossbeam_channel::bounded;
    use std::io::Write;
    use std::time::Duration;

    fn temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn collect(rx: &crossbeam_channel::Receiver<ChannelMessage<u8>>) -> Vec<u8> {
        let mut items = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(ChannelMessage::Item(b)) => items.push(b),
                Ok(ChannelMessage::EndOfStream) | Err(_) => return items,
            }
        }
    }

    #[test]
    fn test_range_is_clamped() {
        let file = temp_file(&[1, 2, 3, 4, 5]);
        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.range(), 0..5);
        assert_eq!(source.with_offset(3).with_limit(10).range(), 3..5);

        let source = FileSource::open(file.path()).unwrap().with_offset(9);
        assert!(source.range().is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = FileSource::open("/definitely/not/here.bin").err().unwrap();
        assert!(matches!(err, crate::BinvizError::Io(_)));
    }

    #[test]
    fn test_streams_range_to_every_destination() {
        let file = temp_file(&[10, 20, 30, 40, 50]);
        let mut source = FileSource::open(file.path()).unwrap().with_offset(1).with_limit(3);

        let (tx1, rx1) = bounded(16);
        let (tx2, rx2) = bounded(16);
        let wd = Watchdog::new();
        let outputs = vec![OutputPort::new_with_watchdog(Sender::new(vec![tx1, tx2]), &wd, "src", "out")];

        assert_eq!(source.work(&[], &outputs).unwrap(), 0);
        assert_eq!(collect(&rx1), vec![20, 30, 40]);
        assert_eq!(collect(&rx2), vec![20, 30, 40]);

        for _ in 0..100 {
            if source.should_stop() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(source.should_stop());
        assert_eq!(source.items_processed(), Some(3));
        assert!(source.work(&[], &outputs).is_err());
    }

    #[test]
    fn test_count_covers_only_bytes_sent() {
        let file = temp_file(&[7u8; 64]);
        let mut source = FileSource::open(file.path()).unwrap();

        // Nobody drains the channel, so the reader blocks after 4 bytes
        let (tx, rx) = bounded::<ChannelMessage<u8>>(4);
        let wd = Watchdog::new();
        let outputs = vec![OutputPort::new_with_watchdog(Sender::new(vec![tx]), &wd, "src", "out")];

        assert_eq!(source.work(&[], &outputs).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(100));
        assert!(!source.should_stop());
        assert!(source.bytes_sent() < 64);

        drop(rx);
        for _ in 0..100 {
            if source.should_stop() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(source.should_stop());
        assert!(source.bytes_sent() < 64);
    }

    #[test]
    fn test_empty_file_closes_stream() {
        let file = temp_file(&[]);
        let mut source = FileSource::open(file.path()).unwrap();

        let (tx, rx) = bounded::<ChannelMessage<u8>>(4);
        let wd = Watchdog::new();
        let outputs = vec![OutputPort::new_with_watchdog(Sender::new(vec![tx]), &wd, "src", "out")];

        assert_eq!(source.work(&[], &outputs).unwrap(), 0);
        assert!(matches!(rx.recv_timeout(Duration::from_secs(2)), Ok(ChannelMessage::EndOfStream)));
    }
}
