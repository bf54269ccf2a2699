//! Resumable, time-bounded transfer of the two-plane buffer.
//!
//! The buffer goes out as two sub-transfers (B/W then red), each split into
//! framed chunks of at most `max_chunk` bytes. After every full chunk the
//! elapsed time is checked; once the budget is spent the engine returns and
//! the next call picks up at the same byte. Progress lives in a single
//! cursor over the whole buffer, the phase is derived from it.

use super::inkplate2::{cmd, DisplayError};
use super::planes::FrameBuffer;
use super::transport::{Clock, Transport};

/// Default transport burst size in bytes
pub const MAX_TRANSFER_SIZE: usize = 128;

/// Default time budget per call in milliseconds
pub const MAX_TRANSFER_TIME_MS: u32 = 10;

/// Chunking and deadline limits for [`TransferEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_chunk: usize,
    pub budget_ms: u32,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_chunk: MAX_TRANSFER_SIZE,
            budget_ms: MAX_TRANSFER_TIME_MS,
        }
    }
}

/// Where the cursor sits in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `[0, L/2)`, cursor 0 means the B/W start command is still due
    BlackWhite,
    /// `L/2`, the red start command is due
    Boundary,
    /// `(L/2, L]`
    Red,
}

#[derive(Debug)]
pub struct TransferEngine {
    limits: TransferLimits,
    cursor: usize,
    chunk: Vec<u8>,
    started_at: u32,
}

impl TransferEngine {
    pub fn new(limits: TransferLimits) -> Result<Self, DisplayError> {
        if limits.max_chunk == 0 {
            return Err(DisplayError::InvalidChunkSize(limits.max_chunk));
        }

        Ok(Self {
            limits,
            cursor: 0,
            chunk: Vec::with_capacity(limits.max_chunk),
            started_at: 0,
        })
    }

    /// Byte offset of the next byte to send
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self, buffer_len: usize) -> Phase {
        let half = buffer_len / 2;
        match self.cursor {
            c if c < half => Phase::BlackWhite,
            c if c == half => Phase::Boundary,
            _ => Phase::Red,
        }
    }

    /// Send as much of `buffer` as the time budget allows.
    ///
    /// Returns `Ok(true)` once the last byte is out (the cursor is then back
    /// at 0), `Ok(false)` if the caller has to come back on a later loop.
    pub fn step<T, C>(
        &mut self,
        buffer: &FrameBuffer,
        transport: &mut T,
        clock: &C,
    ) -> Result<bool, DisplayError>
    where
        T: Transport + ?Sized,
        C: Clock + ?Sized,
    {
        let start = clock.now_ms();
        let data = buffer.as_bytes();
        let half = buffer.half_len();
        self.chunk.clear();

        if self.cursor == 0 {
            self.started_at = start;
            tracing::trace!("Start sending B/W data at {}ms", start);
            transport.command(cmd::DATA_START_BW)?;
        }

        if !self.pump(data, half, transport, clock, start)? {
            tracing::trace!("Transfer paused at byte {} ({:?})", self.cursor, self.phase(data.len()));
            return Ok(false);
        }
        self.flush(transport)?;

        // Only reached when the B/W plane went out without a deadline return
        if self.cursor == half {
            tracing::trace!("Start sending Red data at byte {}", self.cursor);
            transport.command(cmd::DATA_START_RED)?;
        }

        if !self.pump(data, data.len(), transport, clock, start)? {
            tracing::trace!("Transfer paused at byte {} ({:?})", self.cursor, self.phase(data.len()));
            return Ok(false);
        }
        self.flush(transport)?;

        self.cursor = 0;
        tracing::debug!(
            "Sent all {} bytes in {} ms",
            data.len(),
            clock.now_ms().wrapping_sub(self.started_at)
        );
        Ok(true)
    }

    /// Move bytes up to `end` through the chunk buffer, flushing each full
    /// chunk. Returns `false` when the budget ran out after a flush.
    fn pump<T, C>(
        &mut self,
        data: &[u8],
        end: usize,
        transport: &mut T,
        clock: &C,
        start: u32,
    ) -> Result<bool, DisplayError>
    where
        T: Transport + ?Sized,
        C: Clock + ?Sized,
    {
        while self.cursor < end {
            let room = self.limits.max_chunk - self.chunk.len();
            let take = room.min(end - self.cursor);
            self.chunk
                .extend_from_slice(&data[self.cursor..self.cursor + take]);
            self.cursor += take;

            if self.chunk.len() == self.limits.max_chunk {
                self.flush(transport)?;

                if clock.now_ms().wrapping_sub(start) > self.limits.budget_ms {
                    // Come back next loop
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Send the buffered chunk. On failure the cursor is moved back over
    /// the chunk so none of its bytes count as sent.
    fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), DisplayError> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        let result = transport.write_frame(&self.chunk);
        if result.is_err() {
            self.cursor -= self.chunk.len();
        }
        self.chunk.clear();
        result
    }

    /// Drop any progress so the next step starts with the B/W start command
    pub fn reset(&mut self) {
        if self.cursor != 0 {
            tracing::debug!("Transfer abandoned at byte {}", self.cursor);
        }
        self.cursor = 0;
        self.chunk.clear();
    }
}
