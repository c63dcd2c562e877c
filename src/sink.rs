use parking_lot::Mutex;
use rdp_bridge_core::FrameSink;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts frames and optionally appends their bytes to a file.
///
/// File writes are small appends to a local file, short enough to run on
/// the transport thread for a single-window host.
pub struct FileSink {
    out: Option<Mutex<File>>,
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl FileSink {
    pub fn counting() -> Self {
        Self {
            out: None,
            frames: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn to_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            out: Some(Mutex::new(file)),
            ..Self::counting()
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl FrameSink for FileSink {
    fn on_frame(&self, payload: &[u8]) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
        if let Some(out) = &self.out {
            if let Err(e) = out.lock().write_all(payload) {
                log::warn!("Failed to write frame: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames() {
        let sink = FileSink::counting();
        sink.on_frame(&[1, 2, 3]);
        sink.on_frame(&[]);
        assert_eq!(sink.frames(), 2);
        assert_eq!(sink.bytes(), 3);
    }

    #[test]
    fn appends_payload_bytes_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.bin");
        let sink = FileSink::to_file(&path).unwrap();
        sink.on_frame(&[0x00, 0xff]);
        sink.on_frame(b"abc");
        drop(sink);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x00, 0xff, b'a', b'b', b'c']);
    }
}
