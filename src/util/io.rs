use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};

/// Chunks the writer may run ahead of the reader before it blocks.
pub const PIPE_CAPACITY: usize = 16;

/// An in-memory pipe between threads. Writes block while the reader is
/// `PIPE_CAPACITY` chunks behind; the reader sees EOF once the writer is dropped.
pub fn pipe() -> (PipeReader, PipeWriter) {
    let (sender, receiver) = mpsc::sync_channel(PIPE_CAPACITY);
    (
        PipeReader {
            receiver,
            buffer: Vec::new(),
            position: 0,
        },
        PipeWriter { sender },
    )
}

pub struct PipeReader {
    receiver: Receiver<Vec<u8>>,
    buffer: Vec<u8>,
    position: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position >= self.buffer.len() {
            match self.receiver.recv() {
                Ok(chunk) => {
                    self.buffer = chunk;
                    self.position = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let read_size = buf.len().min(self.buffer.len() - self.position);
        buf[..read_size].copy_from_slice(&self.buffer[self.position..self.position + read_size]);
        self.position += read_size;
        Ok(read_size)
    }
}

pub struct PipeWriter {
    sender: SyncSender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.sender
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
