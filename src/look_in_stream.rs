use std::io::{self, Read, Seek, SeekFrom};

/// A look-ahead-capable, seekable byte source.
///
/// This is the external interface the folder engine's primitives consume
/// pack stream bytes through. It lets a caller peek at the next bytes
/// without committing to having consumed them (`look`), then commit to a
/// prefix of what was peeked (`skip`), in addition to the ordinary
/// destructive `read` and absolute `seek`.
///
/// Implementations must satisfy: after `look(n)` returns a slice of length
/// `k ≤ n`, a subsequent `skip(k)` is always valid.
pub trait LookInStream {
    /// Returns a slice of up to `hint_size` bytes visible without consuming
    /// them. The returned slice may be shorter than `hint_size` (including
    /// empty, at end of stream) but is never discarded until `skip` or
    /// `read` is called.
    fn look(&mut self, hint_size: usize) -> io::Result<&[u8]>;

    /// Consumes `n` bytes previously returned by `look`.
    ///
    /// # Panics
    /// Implementations may panic if `n` exceeds the length of the most
    /// recent `look` result; callers must not skip more than was peeked.
    fn skip(&mut self, n: usize) -> io::Result<()>;

    /// Reads up to `buf.len()` bytes, returning the number actually read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Seeks to an absolute/relative position, returning the new absolute
    /// position.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
}

/// Adapts any [`Read`] + [`Seek`] source into a [`LookInStream`] by keeping
/// a small internal peek buffer.
pub struct BufLookStream<R> {
    inner: R,
    peeked: Vec<u8>,
    peek_start: usize,
}

impl<R: Read + Seek> BufLookStream<R> {
    /// Wraps `inner` with an empty peek buffer.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: Vec::new(),
            peek_start: 0,
        }
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> LookInStream for BufLookStream<R> {
    fn look(&mut self, hint_size: usize) -> io::Result<&[u8]> {
        let available = self.peeked.len() - self.peek_start;
        if available < hint_size {
            let mut extra = vec![0u8; hint_size - available];
            let n = read_fill(&mut self.inner, &mut extra)?;
            extra.truncate(n);
            if self.peek_start > 0 {
                self.peeked.drain(0..self.peek_start);
                self.peek_start = 0;
            }
            self.peeked.extend_from_slice(&extra);
        }
        Ok(&self.peeked[self.peek_start..])
    }

    fn skip(&mut self, n: usize) -> io::Result<()> {
        let available = self.peeked.len() - self.peek_start;
        if n > available {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "skip past what was peeked",
            ));
        }
        self.peek_start += n;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.peeked.len() - self.peek_start;
        if available > 0 {
            let n = available.min(buf.len());
            buf[..n].copy_from_slice(&self.peeked[self.peek_start..self.peek_start + n]);
            self.peek_start += n;
            if n == buf.len() {
                return Ok(n);
            }
            let rest = self.inner.read(&mut buf[n..])?;
            return Ok(n + rest);
        }
        self.inner.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.peeked.clear();
        self.peek_start = 0;
        self.inner.seek(pos)
    }
}

fn read_fill<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
