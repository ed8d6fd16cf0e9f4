//! Draining of the child's output streams.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 8 * 1024;

/// Keeps the last `capacity` bytes written to it.
#[derive(Debug)]
pub struct OutputTail {
    buffer: VecDeque<u8>,
    capacity: usize,
    total_bytes: u64,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(CHUNK_SIZE * 8)),
            capacity,
            total_bytes: 0,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.total_bytes += bytes.len() as u64;
        if self.capacity == 0 {
            return;
        }
        let bytes = if bytes.len() > self.capacity {
            &bytes[bytes.len() - self.capacity..]
        } else {
            bytes
        };
        let overflow = (self.buffer.len() + bytes.len()).saturating_sub(self.capacity);
        self.buffer.drain(..overflow);
        self.buffer.extend(bytes);
    }

    /// Total bytes seen, including those no longer retained.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn contents(&self) -> String {
        let (front, back) = self.buffer.as_slices();
        let mut bytes = Vec::with_capacity(self.buffer.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if self.total_bytes > self.buffer.len() as u64 {
            format!("...(truncated)\n{}", text)
        } else {
            text
        }
    }
}

/// Read `reader` to end-of-stream, feeding every chunk into `tail` and,
/// when `mirror` is set, to our own stderr.
pub async fn drain<R>(reader: Option<R>, tail: &Mutex<OutputTail>, mirror: bool) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(0);
    };
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        total += read as u64;
        let chunk = &buffer[..read];
        tail.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(chunk);
        if mirror {
            let _ = std::io::stderr().write_all(chunk);
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_everything_under_capacity() {
        let mut tail = OutputTail::new(100);
        tail.push(b"hello ");
        tail.push(b"world");
        assert_eq!(tail.contents(), "hello world");
        assert_eq!(tail.total_bytes(), 11);
    }

    #[test]
    fn test_tail_keeps_last_bytes() {
        let mut tail = OutputTail::new(5);
        tail.push(b"abc");
        tail.push(b"defg");
        assert_eq!(tail.contents(), "...(truncated)\ncdefg");
        assert_eq!(tail.total_bytes(), 7);
    }

    #[test]
    fn test_tail_single_oversized_chunk() {
        let mut tail = OutputTail::new(3);
        tail.push(b"0123456789");
        assert!(tail.contents().ends_with("789"));
    }

    #[test]
    fn test_tail_zero_capacity() {
        let mut tail = OutputTail::new(0);
        tail.push(b"ignored");
        assert_eq!(tail.total_bytes(), 7);
        assert!(tail.contents().starts_with("...(truncated)"));
    }

    #[test]
    fn test_tail_empty() {
        let tail = OutputTail::new(10);
        assert_eq!(tail.contents(), "");
    }

    #[tokio::test]
    async fn test_drain_reads_to_end() {
        let data = vec![b'x'; 3 * CHUNK_SIZE + 17];
        let tail = Mutex::new(OutputTail::new(16));
        let read = drain(Some(&data[..]), &tail, false).await.unwrap();

        assert_eq!(read, data.len() as u64);
        assert_eq!(tail.lock().unwrap().total_bytes(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_drain_missing_stream() {
        let tail = Mutex::new(OutputTail::new(16));
        let read = drain(None::<&[u8]>, &tail, false).await.unwrap();
        assert_eq!(read, 0);
    }
}
