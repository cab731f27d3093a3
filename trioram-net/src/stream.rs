//! One ordered, buffered byte stream to another party.

use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::bearer::Bearer;
use crate::error::{Error, Result};

/// Queued data past this size is flushed without waiting for the round
/// boundary.
pub const FLUSH_THRESHOLD: usize = 28800;

/// Per-stream byte and segment counters, for the timing harnesses.
#[derive(Clone, Copy, Debug, Default)]
pub struct IoStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub segments_sent: u64,
}

/// A wrapped connection to one other party.
///
/// Writes are accumulated with [`queue`](SingleIo::queue) and become a
/// single segment on [`send`](SingleIo::send); segments go to a background
/// writer task so a worker's sends never block its receives. Receives are
/// exact-size; a stream that ends early is a protocol violation and
/// surfaces as [`Error::ShortRead`].
pub struct SingleIo {
    reader: ReadHalf<Bearer>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    dataqueue: Vec<u8>,
    stats: IoStats,
}

impl SingleIo {
    pub fn new(bearer: Bearer) -> Self {
        let (reader, mut writer) = tokio::io::split(bearer);
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            while let Some(segment) = rx.recv().await {
                if let Err(e) = writer.write_all(&segment).await {
                    error!("writer task failed: {e}");
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });
        SingleIo {
            reader,
            outgoing: tx,
            dataqueue: Vec::new(),
            stats: IoStats::default(),
        }
    }

    /// Append bytes to the current outgoing segment.
    pub fn queue(&mut self, data: &[u8]) {
        self.dataqueue.extend_from_slice(data);
        if self.dataqueue.len() > FLUSH_THRESHOLD {
            self.send();
        }
    }

    /// Hand the queued segment to the writer. Spurious calls are ignored.
    pub fn send(&mut self) {
        if self.dataqueue.is_empty() {
            return;
        }
        let segment = std::mem::take(&mut self.dataqueue);
        trace!(len = segment.len(), "flush segment");
        self.stats.bytes_sent += segment.len() as u64;
        self.stats.segments_sent += 1;
        // A dropped receiver means the writer task already died on an IO
        // error; the next recv will surface the failure.
        let _ = self.outgoing.send(segment);
    }

    /// Read exactly `len` bytes.
    pub async fn recv(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => Error::ShortRead { wanted: len },
                _ => Error::BearerIo(e),
            })?;
        self.stats.bytes_received += len as u64;
        Ok(buf)
    }

    pub fn stats(&self) -> IoStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = IoStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_then_send_round_trips() {
        let (a, b) = Bearer::pipe();
        let mut left = SingleIo::new(a);
        let mut right = SingleIo::new(b);
        left.queue(b"hello ");
        left.queue(b"world");
        left.send();
        let got = right.recv(11).await.unwrap();
        assert_eq!(&got, b"hello world");
        assert_eq!(left.stats().segments_sent, 1);
    }

    #[tokio::test]
    async fn short_read_is_fatal() {
        let (a, b) = Bearer::pipe();
        let mut left = SingleIo::new(a);
        left.queue(b"xy");
        left.send();
        drop(left);
        let mut right = SingleIo::new(b);
        let err = right.recv(3).await.unwrap_err();
        assert!(matches!(err, Error::ShortRead { wanted: 3 }));
    }

    #[tokio::test]
    async fn oversized_queue_autoflushes() {
        let (a, b) = Bearer::pipe();
        let mut left = SingleIo::new(a);
        let big = vec![0xabu8; FLUSH_THRESHOLD + 1];
        left.queue(&big);
        assert_eq!(left.stats().segments_sent, 1);
        let mut right = SingleIo::new(b);
        let got = right.recv(big.len()).await.unwrap();
        assert_eq!(got, big);
    }
}
