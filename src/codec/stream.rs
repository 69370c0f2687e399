//! Stream helpers shared by the binary codecs.
//!
//! Underlying readers may return short reads (pipes, sockets); these helpers
//! loop until the requested count is satisfied and distinguish a clean end
//! of stream at a record boundary from truncation inside a record.

use std::io::{self, BufRead, ErrorKind, Read};

use crate::util::{Error, Result};

/// Read until `buf` is full or the stream ends. Returns bytes read.
pub fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Fill `buf` completely, or report a clean end of stream.
///
/// Returns `Ok(false)` if the stream was already at its end, `Ok(true)` if
/// `buf` was filled, and [`Error::Truncated`] if it ended part-way.
pub fn read_exact_or_eof<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let got = read_fully(reader, buf)?;
    if got == 0 && !buf.is_empty() {
        Ok(false)
    } else if got < buf.len() {
        Err(Error::Truncated {
            needed: buf.len() as u64,
            got: got as u64,
        })
    } else {
        Ok(true)
    }
}

/// Fill `buf` completely; any shortfall is truncation.
pub fn read_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let got = read_fully(reader, buf)?;
    if got < buf.len() {
        return Err(Error::Truncated {
            needed: buf.len() as u64,
            got: got as u64,
        });
    }
    Ok(())
}

/// Read exactly `len` bytes into a fresh buffer.
///
/// The buffer grows with the data actually present, so a corrupt length
/// field cannot force a huge up-front allocation.
pub fn read_vec<R: Read + ?Sized>(reader: &mut R, len: u64) -> Result<Vec<u8>> {
    const EAGER_LIMIT: u64 = 1 << 20;

    let mut buf = Vec::with_capacity(len.min(EAGER_LIMIT) as usize);
    let got = reader.take(len).read_to_end(&mut buf)? as u64;
    if got < len {
        return Err(Error::Truncated { needed: len, got });
    }
    Ok(buf)
}

/// Buffered reader that counts consumed bytes.
pub struct Tracked<R> {
    inner: R,
    pos: u64,
}

impl<R: BufRead> Tracked<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    /// Bytes consumed since construction or the last [`Tracked::set_pos`].
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn set_pos(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// True if no more bytes are available. Blocks on pipes until data or EOF.
    pub fn at_end(&mut self) -> Result<bool> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(buf.is_empty()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: BufRead> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for Tracked<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.pos += amt as u64;
        self.inner.consume(amt);
    }
}
