//! Doubling byte buffer, grounded on the source's `dbuf` discipline: start
//! small, double on demand up to `2^max_power * init_size`, then refuse to
//! grow further. Used for both per-connection read and write buffers.

/// Failure growing a [`DoublingBuffer`] past its configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("buffer exceeds configured maximum size")]
pub struct BufferOversized;

pub struct DoublingBuffer {
    data: Vec<u8>,
    init_size: usize,
    max_size: usize,
    /// Bytes filled so far (the "high water mark" of valid data).
    wpos: usize,
    /// Bytes already consumed by the parser.
    rpos: usize,
}

impl DoublingBuffer {
    /// `max_power` mirrors `DBUF_DEFAULT_MAX`: the buffer may double this
    /// many times past `init_size` before growth is refused.
    pub fn new(init_size: usize, max_power: u32) -> Self {
        let max_size = init_size.saturating_shl(max_power);
        Self {
            data: vec![0u8; init_size],
            init_size,
            max_size,
            wpos: 0,
            rpos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes available for the parser to read (already filled, not yet
    /// consumed).
    pub fn unread(&self) -> &[u8] {
        &self.data[self.rpos..self.wpos]
    }

    /// Mark `n` bytes at the front of [`unread`] as consumed.
    pub fn consume(&mut self, n: usize) {
        self.rpos += n;
        debug_assert!(self.rpos <= self.wpos);
    }

    /// Shift unread bytes to the front, reclaiming space consumed by the
    /// parser so far. Call before growing or before a fresh socket read.
    pub fn compact(&mut self) {
        if self.rpos == 0 {
            return;
        }
        self.data.copy_within(self.rpos..self.wpos, 0);
        self.wpos -= self.rpos;
        self.rpos = 0;
    }

    /// The writable tail socket reads should fill.
    pub fn write_slot(&mut self) -> &mut [u8] {
        &mut self.data[self.wpos..]
    }

    /// Record that `n` bytes were written into [`write_slot`].
    pub fn advance_write(&mut self, n: usize) {
        self.wpos += n;
        debug_assert!(self.wpos <= self.data.len());
    }

    /// Double capacity at most once. Returns `Ok(true)` if it grew,
    /// `Ok(false)` if already at `max_size`, `Err` if doubling would exceed
    /// it (caller should fail the connection with `OVERSIZED`).
    pub fn double(&mut self) -> Result<bool, BufferOversized> {
        if self.data.len() >= self.max_size {
            return Ok(false);
        }
        let next = (self.data.len() * 2).min(self.max_size);
        self.data.resize(next, 0);
        Ok(true)
    }

    /// Grow (doubling repeatedly) until capacity is at least `cap`, or fail
    /// if `cap` exceeds `max_size`.
    pub fn fit(&mut self, cap: usize) -> Result<(), BufferOversized> {
        if cap > self.max_size {
            return Err(BufferOversized);
        }
        while self.data.len() < cap {
            self.double()?;
        }
        Ok(())
    }

    /// Append bytes directly to the output tail, growing as needed.
    /// Used by the response composer.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), BufferOversized> {
        self.fit(self.wpos + bytes.len())?;
        self.data[self.wpos..self.wpos + bytes.len()].copy_from_slice(bytes);
        self.wpos += bytes.len();
        Ok(())
    }

    /// Reset to the initial size once fully drained, releasing any memory
    /// acquired by doubling.
    pub fn shrink(&mut self) {
        if self.rpos == self.wpos {
            self.data.truncate(self.init_size);
            self.data.shrink_to_fit();
            self.rpos = 0;
            self.wpos = 0;
        }
    }
}
