//! Byte sources feeding insertions.

use std::io::{self, Read};

/// Read buffer size for [`ReadSource`].
const READ_CHUNK: usize = 8 * 1024;

/// Outcome of one [`ByteSource::pull`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// More bytes may follow.
    More,
    /// The source is exhausted; bytes delivered by this same call still count.
    End,
}

/// A file's raw bytes, delivered in runs and terminated by an explicit end.
pub trait ByteSource {
    /// Append zero or more bytes to `buf` and report whether more may follow.
    fn pull(&mut self, buf: &mut Vec<u8>) -> io::Result<Pull>;

    /// Drain the source completely.
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        while self.pull(&mut buf)? == Pull::More {}
        Ok(buf)
    }
}

impl ByteSource for &[u8] {
    fn pull(&mut self, buf: &mut Vec<u8>) -> io::Result<Pull> {
        buf.extend_from_slice(self);
        *self = &[];
        Ok(Pull::End)
    }
}

impl ByteSource for Vec<u8> {
    fn pull(&mut self, buf: &mut Vec<u8>) -> io::Result<Pull> {
        buf.append(self);
        Ok(Pull::End)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn pull(&mut self, buf: &mut Vec<u8>) -> io::Result<Pull> {
        (**self).pull(buf)
    }
}

/// Adapts any [`Read`] implementor; end of file maps to [`Pull::End`].
#[derive(Debug)]
pub struct ReadSource<R> {
    reader: R,
    chunk: Box<[u8]>,
}

impl<R: Read> ReadSource<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Unwrap the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn pull(&mut self, buf: &mut Vec<u8>) -> io::Result<Pull> {
        loop {
            match self.reader.read(&mut self.chunk) {
                Ok(0) => return Ok(Pull::End),
                Ok(n) => {
                    buf.extend_from_slice(&self.chunk[..n]);
                    return Ok(Pull::More);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
