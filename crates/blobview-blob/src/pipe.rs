use std::io::{self, Read, Write};

use bytes::{Buf, Bytes};
use crossbeam::channel::{bounded, Receiver, Sender};

/// Create a bounded in-process byte pipe holding at most `capacity` chunks.
///
/// The writer blocks while the pipe is full. Once the reader is dropped,
/// writes fail with [`io::ErrorKind::BrokenPipe`]; once the writer is
/// dropped, the reader sees end of stream after draining what was sent.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            current: Bytes::new(),
        },
    )
}

#[derive(Debug)]
pub struct PipeWriter {
    tx: Sender<Bytes>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Bytes>,
    current: Bytes,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while !self.current.has_remaining() {
            match self.rx.recv() {
                Ok(chunk) => self.current = chunk,
                // writer gone: end of stream
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.remaining());
        self.current.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}
