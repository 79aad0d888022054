//! Scripted in-memory transport for exercising the driver without hardware.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use super::Transport;
use crate::error::{Error, Result};

/// Test double for the FIFO link: serves a pre-scripted byte stream to
/// reads and records every write.
///
/// An exhausted script behaves like a stalled device: reads return zero
/// bytes, which is exactly what the engine's watchdog exists to catch.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    read_limit: Option<usize>,
    write_limit: Option<usize>,
    read_delay: Duration,
    fail_reads: Option<String>,
    reads_issued: usize,
    bit_mode: Option<(u8, u8)>,
    timeouts: Option<(Duration, Duration)>,
    closed: bool,
}

impl MockTransport {
    /// Create a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the read script.
    pub fn push_read(&mut self, bytes: &[u8]) {
        self.script.extend(bytes);
    }

    /// Cap the bytes served per `read` call, forcing the caller to
    /// accumulate across several reads.
    pub fn set_read_limit(&mut self, limit: usize) {
        self.read_limit = Some(limit);
    }

    /// Cap the bytes accepted per `write` call, simulating a short write.
    pub fn set_write_limit(&mut self, limit: usize) {
        self.write_limit = Some(limit);
    }

    /// Sleep this long inside every `read` call, simulating a slow link.
    pub fn set_read_delay(&mut self, delay: Duration) {
        self.read_delay = delay;
    }

    /// Make every subsequent read fail at the transport level.
    pub fn fail_reads(&mut self, reason: &str) {
        self.fail_reads = Some(reason.to_string());
    }

    /// Every write issued so far, one entry per call.
    #[must_use]
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Number of `read` calls issued so far.
    #[must_use]
    pub fn reads_issued(&self) -> usize {
        self.reads_issued
    }

    /// Bit-mode configured by the engine, if any.
    #[must_use]
    pub fn bit_mode(&self) -> Option<(u8, u8)> {
        self.bit_mode
    }

    /// Transfer timeouts configured by the engine, if any.
    #[must_use]
    pub fn timeouts(&self) -> Option<(Duration, Duration)> {
        self.timeouts
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Transport("handle closed".to_string()));
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn set_bit_mode(&mut self, mask: u8, enable: u8) -> Result<()> {
        self.ensure_open()?;
        self.bit_mode = Some((mask, enable));
        Ok(())
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        self.ensure_open()?;
        self.timeouts = Some((read, write));
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        self.reads_issued += 1;

        if let Some(reason) = &self.fail_reads {
            return Err(Error::Transport(reason.clone()));
        }
        if !self.read_delay.is_zero() {
            thread::sleep(self.read_delay);
        }

        if self.script.is_empty() {
            // stalled device: the transport timeout expires with nothing
            thread::sleep(Duration::from_millis(1));
            return Ok(0);
        }

        let mut limit = buf.len().min(self.script.len());
        if let Some(cap) = self.read_limit {
            limit = limit.min(cap);
        }
        for slot in &mut buf[..limit] {
            *slot = self.script.pop_front().unwrap();
        }
        Ok(limit)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;

        let accepted = match self.write_limit {
            Some(cap) => buf.len().min(cap),
            None => buf.len(),
        };
        self.writes.push(buf[..accepted].to_vec());
        Ok(accepted)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_served_in_order() {
        let mut t = MockTransport::new();
        t.push_read(&[1, 2, 3]);
        t.push_read(&[4]);

        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).unwrap(), 4);
        assert_eq!(buf[..4], [1, 2, 3, 4]);
        assert_eq!(t.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_limit_fragments_stream() {
        let mut t = MockTransport::new();
        t.push_read(&[1, 2, 3, 4]);
        t.set_read_limit(3);

        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).unwrap(), 3);
        assert_eq!(t.read(&mut buf).unwrap(), 1);
    }

    #[test]
    fn test_closed_handle_rejects_io() {
        let mut t = MockTransport::new();
        t.close().unwrap();

        let mut buf = [0u8; 1];
        assert!(matches!(t.read(&mut buf), Err(Error::Transport(_))));
        assert!(matches!(t.write(&[0]), Err(Error::Transport(_))));
    }
}
