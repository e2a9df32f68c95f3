use std::io::{self, Read};

use crate::constant::{DEFAULT_BUF_SIZE, MAX_CACHED_BUF_SIZE};
use crate::error::{Error, Result};

/// Scratch buffer shared by the read and write halves of one connection.
///
/// The protocol is strictly half-duplex, so a single object can serve both
/// directions. Reads go through two backing slices in a double-buffering
/// scheme: [`flip`](Bufio::flip) schedules a swap so the most recent
/// [`read_next`](Bufio::read_next) view stays intact across one more fill.
/// Writes borrow a single scratch `Vec` guarded by a busy latch; taking it
/// twice without an intervening [`store`](Bufio::store) is a contract
/// violation surfaced as [`Error::BusyBuffer`].
#[derive(Debug)]
pub(crate) struct Bufio {
    /// The two byte slices backing the read side.
    dbuf: [Vec<u8>; 2],
    /// Index of the slice currently holding readable data.
    active: usize,
    /// Pending delayed flips; applied on the next fill.
    flipcnt: usize,
    /// Unread window into `dbuf[active]`.
    start: usize,
    avail: usize,
    /// Write scratch, handed out by `take_*` and returned by `store`.
    wbuf: Vec<u8>,
    busy: bool,
}

impl Bufio {
    pub fn new() -> Self {
        Self {
            dbuf: [vec![0; DEFAULT_BUF_SIZE], Vec::new()],
            active: 0,
            flipcnt: 0,
            start: 0,
            avail: 0,
            wbuf: Vec::with_capacity(DEFAULT_BUF_SIZE),
            busy: false,
        }
    }

    /// Schedule a swap of the two backing slices. The swap is performed on
    /// the next fill, so the view returned by the previous `read_next`
    /// survives exactly one more read.
    pub fn flip(&mut self) {
        self.flipcnt += 1;
    }

    /// Make at least `need` unread bytes available, reading from `r`.
    fn fill<R: Read>(&mut self, r: &mut R, need: usize) -> io::Result<()> {
        if self.flipcnt > 0 {
            self.flipcnt = 0;
            let idle = 1 - self.active;
            let [b0, b1] = &mut self.dbuf;
            let (src, dst) = if self.active == 0 { (b0, b1) } else { (b1, b0) };
            if dst.len() < src.len() {
                dst.resize(src.len(), 0);
            }
            if self.avail > 0 {
                dst[..self.avail].copy_from_slice(&src[self.start..self.start + self.avail]);
            }
            self.active = idle;
            self.start = 0;
        } else if self.avail > 0 && self.start > 0 {
            let buf = &mut self.dbuf[self.active];
            buf.copy_within(self.start..self.start + self.avail, 0);
            self.start = 0;
        } else {
            self.start = 0;
        }

        let buf = &mut self.dbuf[self.active];
        let wanted = need.max(DEFAULT_BUF_SIZE);
        if buf.len() < wanted {
            buf.resize(wanted, 0);
        }

        while self.avail < need {
            match r.read(&mut buf[self.avail..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed while reading packet",
                    ))
                }
                Ok(n) => self.avail += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Buffer at least `need` unread bytes without consuming them.
    pub fn ensure<R: Read>(&mut self, r: &mut R, need: usize) -> io::Result<()> {
        if self.avail < need {
            self.fill(r, need)?;
        }
        Ok(())
    }

    /// Consume `n` previously ensured bytes. The view is valid until the
    /// next fill, or one fill longer when a `flip` is pending.
    pub fn consume(&mut self, n: usize) -> &[u8] {
        debug_assert!(self.avail >= n, "consume beyond the ensured window");
        let start = self.start;
        self.start += n;
        self.avail -= n;
        &self.dbuf[self.active][start..start + n]
    }

    /// Return the next `need` bytes, blocking until they arrive.
    pub fn read_next<R: Read>(&mut self, r: &mut R, need: usize) -> io::Result<&[u8]> {
        self.ensure(r, need)?;
        Ok(self.consume(need))
    }

    /// Take the write scratch with room for a `length`-byte packet
    /// (including the 4-byte header reserve). The returned buffer holds the
    /// header reserve as its first 4 zeroed bytes; the payload follows by
    /// indexing or extending.
    pub fn take_buffer(&mut self, length: usize) -> Result<Vec<u8>> {
        if self.busy {
            return Err(Error::BusyBuffer);
        }
        self.busy = true;
        let mut buf = std::mem::take(&mut self.wbuf);
        buf.clear();
        buf.resize(length, 0);
        Ok(buf)
    }

    /// Shortcut for packets known to fit the default buffer size.
    pub fn take_small_buffer(&mut self, length: usize) -> Result<Vec<u8>> {
        debug_assert!(length <= DEFAULT_BUF_SIZE);
        self.take_buffer(length)
    }

    /// Take the write scratch with only the 4-byte header reserve filled in,
    /// for packets whose final size is unknown. The caller appends payload.
    pub fn take_complete_buffer(&mut self) -> Result<Vec<u8>> {
        if self.busy {
            return Err(Error::BusyBuffer);
        }
        self.busy = true;
        let mut buf = std::mem::take(&mut self.wbuf);
        buf.clear();
        buf.extend_from_slice(&[0u8; 4]);
        Ok(buf)
    }

    /// Return a previously taken buffer, releasing the busy latch. A grown
    /// buffer is adopted as the new scratch while it stays under the cached
    /// cap.
    pub fn store(&mut self, buf: Vec<u8>) {
        self.busy = false;
        if buf.capacity() > self.wbuf.capacity() && buf.capacity() <= MAX_CACHED_BUF_SIZE {
            self.wbuf = buf;
        }
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.busy
    }
}
