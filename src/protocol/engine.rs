//! Command/reply exchange and chunked-data reassembly
//!
//! The engine owns one transport handle and the wire sequence counter. It is
//! fully synchronous: one exchange at a time, no pipelining, no cancellation
//! beyond closing the transport underneath it.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::frame::{ChunkHeader, CommandFrame, ReplyFrame};
use super::types::CommandCode;
use super::{CHUNK_HEADER_SIZE, REPLY_SIZE};
use crate::error::{Error, Result};
use crate::transport::{BIT_MODE_SYNC_FIFO, TRANSPORT_TIMEOUT, Transport};

/// Protocol engine over one exclusively-owned transport.
///
/// Not shareable between callers: the transport handle and the sequence
/// counter belong to exactly one engine, and access must be externally
/// serialized (one engine per device, one logical owner at a time).
pub struct ProtocolEngine<T: Transport> {
    transport: T,
    sequence: u16,
    read_timeout: Duration,
}

impl<T: Transport> ProtocolEngine<T> {
    /// Take ownership of a transport and configure the link for the device:
    /// synchronous FIFO bit-mode and the fixed 300 ms transfer timeouts.
    ///
    /// `read_timeout` is the engine's own accumulation watchdog. It spans
    /// the whole read-exact loop and is independent of how many individual
    /// transport reads are needed, so it must cover the device's exposure
    /// time when frames are being read.
    pub fn new(mut transport: T, read_timeout: Duration) -> Result<Self> {
        transport.set_bit_mode(BIT_MODE_SYNC_FIFO, BIT_MODE_SYNC_FIFO)?;
        transport.set_timeouts(TRANSPORT_TIMEOUT, TRANSPORT_TIMEOUT)?;

        Ok(Self {
            transport,
            sequence: 1,
            read_timeout,
        })
    }

    /// Exchange one command for one reply.
    ///
    /// The frame carries the next sequence number (post-incrementing,
    /// wrapping silently at 65535). The reply's own sequence number is
    /// informational only and is deliberately not matched against the
    /// request's, so a late or duplicated reply passes undetected.
    pub fn send_command(&mut self, code: CommandCode, data: u32) -> Result<ReplyFrame> {
        let frame = CommandFrame::new(code, self.next_sequence(), data);
        let bytes = frame.to_bytes();

        let written = self.transport.write(&bytes)?;
        if written != bytes.len() {
            return Err(Error::Transport(format!(
                "short write: {written} of {} bytes",
                bytes.len()
            )));
        }

        let mut reply = [0u8; REPLY_SIZE];
        self.read_exactly(&mut reply)?;
        let reply = ReplyFrame::from_bytes(reply)?;

        trace!(
            code = %code,
            sequence = frame.sequence,
            reply_code = reply.code,
            reply_data = reply.data,
            "command exchanged"
        );
        Ok(reply)
    }

    /// Reassemble `total` bytes of chunked payload into `dest`.
    ///
    /// Chunks arrive as a `"#DAT"` header followed by the declared payload;
    /// their lengths must sum exactly to `total`. A header declaring more
    /// than the outstanding remainder is rejected before any payload byte is
    /// read, bounding a desynchronized header at the destination size.
    pub fn read_data(&mut self, dest: &mut [u8], total: usize) -> Result<()> {
        debug_assert!(dest.len() >= total);

        let mut filled = 0usize;
        while filled < total {
            let mut header = [0u8; CHUNK_HEADER_SIZE];
            self.read_exactly(&mut header)?;
            let header = ChunkHeader::from_bytes(header)?;

            let declared = usize::from(header.length);
            let outstanding = total - filled;
            if declared > outstanding {
                debug!(declared, outstanding, "chunk overruns destination");
                return Err(Error::FramingOverflow {
                    declared,
                    outstanding,
                });
            }

            self.read_exactly(&mut dest[filled..filled + declared])?;
            filled += declared;
            trace!(len = declared, filled, total, "chunk reassembled");
        }

        Ok(())
    }

    /// Close the underlying transport. In-flight reads on the handle abort;
    /// the engine is unusable afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }

    /// Shared access to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fill `buf` from repeated transport reads.
    ///
    /// The watchdog tracks the instant of the last read that made progress;
    /// a zero-byte read does not reset it. Once the stall outlives the
    /// configured read timeout, the accumulation fails rather than spinning
    /// on a dead link.
    fn read_exactly(&mut self, buf: &mut [u8]) -> Result<()> {
        let needed = buf.len();
        let mut got = 0usize;
        let mut last_progress = Instant::now();

        while got < needed {
            let n = self.transport.read(&mut buf[got..])?;
            if n > 0 {
                got += n;
                last_progress = Instant::now();
            } else {
                let elapsed = last_progress.elapsed();
                if elapsed > self.read_timeout {
                    debug!(?elapsed, got, needed, "link stalled");
                    return Err(Error::ReadTimeout {
                        elapsed,
                        needed,
                        got,
                    });
                }
            }
        }

        Ok(())
    }

    fn next_sequence(&mut self) -> u16 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    #[cfg(test)]
    pub(crate) fn force_sequence(&mut self, sequence: u16) {
        self.sequence = sequence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::COMMAND_SIZE;
    use crate::transport::MockTransport;

    fn engine(transport: MockTransport) -> ProtocolEngine<MockTransport> {
        ProtocolEngine::new(transport, Duration::from_millis(40)).unwrap()
    }

    fn ack(sequence: u16) -> [u8; REPLY_SIZE] {
        ReplyFrame {
            code: 0,
            length: 2,
            sequence,
            data: 0,
        }
        .to_bytes()
    }

    #[test]
    fn test_new_configures_link() {
        let e = engine(MockTransport::new());
        let t = e.transport;

        assert_eq!(t.bit_mode(), Some((0x40, 0x40)));
        assert_eq!(
            t.timeouts(),
            Some((Duration::from_millis(300), Duration::from_millis(300)))
        );
    }

    #[test]
    fn test_send_command_frames_request() {
        let mut transport = MockTransport::new();
        transport.push_read(&ack(1));
        let mut e = engine(transport);

        let reply = e.send_command(CommandCode::WriteControl, 0).unwrap();
        assert_eq!(reply.sequence, 1);

        let writes = e.transport.writes();
        assert_eq!(writes.len(), 1);
        let sent =
            CommandFrame::from_bytes(<[u8; COMMAND_SIZE]>::try_from(writes[0].as_slice()).unwrap())
                .unwrap();
        assert_eq!(sent.code, 0x01);
        assert_eq!(sent.length, 4);
        assert_eq!(sent.sequence, 1);
        assert_eq!(sent.data, 0);
    }

    #[test]
    fn test_sequence_increments_per_command() {
        let mut transport = MockTransport::new();
        transport.push_read(&ack(1));
        transport.push_read(&ack(2));
        transport.push_read(&ack(3));
        let mut e = engine(transport);

        for expected in 1u16..=3 {
            e.send_command(CommandCode::WriteControl, 0).unwrap();
            let frame = CommandFrame::from_bytes(
                <[u8; COMMAND_SIZE]>::try_from(e.transport.writes().last().unwrap().as_slice())
                    .unwrap(),
            )
            .unwrap();
            assert_eq!(frame.sequence, expected);
        }
    }

    #[test]
    fn test_sequence_wraps_silently() {
        let mut transport = MockTransport::new();
        transport.push_read(&ack(0));
        transport.push_read(&ack(0));
        let mut e = engine(transport);
        e.force_sequence(65535);

        e.send_command(CommandCode::WriteControl, 0).unwrap();
        e.send_command(CommandCode::WriteControl, 0).unwrap();

        let sequences: Vec<u16> = e
            .transport
            .writes()
            .iter()
            .map(|w| {
                CommandFrame::from_bytes(<[u8; COMMAND_SIZE]>::try_from(w.as_slice()).unwrap())
                    .unwrap()
                    .sequence
            })
            .collect();
        assert_eq!(sequences, [65535, 0]);
    }

    #[test]
    fn test_send_command_rejects_bad_reply_magic() {
        let mut transport = MockTransport::new();
        let mut bad = ack(1);
        bad[0..4].copy_from_slice(b"#DAT");
        transport.push_read(&bad);
        let mut e = engine(transport);

        let result = e.send_command(CommandCode::WriteControl, 0);
        assert!(matches!(
            result,
            Err(Error::ProtocolDesync { expected: "#ANS", .. })
        ));
    }

    #[test]
    fn test_reply_sequence_not_validated() {
        let mut transport = MockTransport::new();
        // device answers with an unrelated sequence number
        transport.push_read(&ack(4242));
        let mut e = engine(transport);

        let reply = e.send_command(CommandCode::WriteControl, 0).unwrap();
        assert_eq!(reply.sequence, 4242);
    }

    #[test]
    fn test_read_exactly_accumulates_partial_reads() {
        let mut transport = MockTransport::new();
        transport.push_read(&ack(1));
        transport.set_read_limit(3);
        let mut e = engine(transport);

        let reply = e.send_command(CommandCode::ReadVersion, 0).unwrap();
        assert_eq!(reply.sequence, 1);
    }

    #[test]
    fn test_read_data_reassembles_chunks_in_order() {
        let mut transport = MockTransport::new();
        transport.push_read(&ChunkHeader { length: 3 }.to_bytes());
        transport.push_read(&[1, 2, 3]);
        transport.push_read(&ChunkHeader { length: 1 }.to_bytes());
        transport.push_read(&[4]);
        transport.push_read(&ChunkHeader { length: 4 }.to_bytes());
        transport.push_read(&[5, 6, 7, 8]);
        let mut e = engine(transport);

        let mut dest = [0u8; 8];
        e.read_data(&mut dest, 8).unwrap();
        assert_eq!(dest, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_read_data_zero_total_reads_nothing() {
        let mut e = engine(MockTransport::new());

        let mut dest = [0u8; 0];
        e.read_data(&mut dest, 0).unwrap();
        assert!(e.transport.reads_issued() == 0);
    }

    #[test]
    fn test_read_data_rejects_overlong_chunk() {
        let mut transport = MockTransport::new();
        transport.push_read(&ChunkHeader { length: 6 }.to_bytes());
        transport.push_read(&[1, 2, 3, 4, 5, 6]);
        transport.push_read(&ChunkHeader { length: 5 }.to_bytes());
        let mut e = engine(transport);

        let mut dest = [0u8; 8];
        let result = e.read_data(&mut dest, 8);
        assert!(matches!(
            result,
            Err(Error::FramingOverflow {
                declared: 5,
                outstanding: 2,
            })
        ));
        // the first chunk landed, nothing was read past the bound
        assert_eq!(dest[0..6], [1, 2, 3, 4, 5, 6]);
        assert_eq!(dest[6..8], [0, 0]);
    }

    #[test]
    fn test_read_data_rejects_bad_chunk_magic() {
        let mut transport = MockTransport::new();
        transport.push_read(b"#ANS\x02\x00");
        let mut e = engine(transport);

        let mut dest = [0u8; 2];
        let result = e.read_data(&mut dest, 2);
        assert!(matches!(
            result,
            Err(Error::ProtocolDesync { expected: "#DAT", .. })
        ));
    }

    #[test]
    fn test_stalled_link_times_out() {
        // nothing queued: every read returns zero bytes
        let mut e = engine(MockTransport::new());

        let mut dest = [0u8; 4];
        let result = e.read_data(&mut dest, 4);
        match result {
            Err(Error::ReadTimeout { needed, got, .. }) => {
                assert_eq!(needed, CHUNK_HEADER_SIZE);
                assert_eq!(got, 0);
            }
            other => panic!("expected ReadTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_watchdog_resets_on_progress() {
        // a trickling link is slow but alive; the watchdog must not fire
        let mut transport = MockTransport::new();
        transport.push_read(&ack(1));
        transport.set_read_limit(1);
        transport.set_read_delay(Duration::from_millis(15));
        let mut e = engine(transport);

        // 10 single-byte reads at 15 ms each exceed the 40 ms watchdog
        // in total, but every read makes progress
        assert!(e.send_command(CommandCode::ReadVersion, 0).is_ok());
    }

    #[test]
    fn test_short_write_is_transport_error() {
        let mut transport = MockTransport::new();
        transport.set_write_limit(7);
        let mut e = engine(transport);

        let result = e.send_command(CommandCode::WriteControl, 0);
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[test]
    fn test_transport_error_propagates() {
        let mut transport = MockTransport::new();
        transport.fail_reads("unplugged");
        let mut e = engine(transport);

        let result = e.send_command(CommandCode::WriteControl, 0);
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Any chunking whose lengths sum to the total reassembles the
            /// payload intact, regardless of how the transport fragments
            /// the individual reads.
            #[test]
            fn prop_chunking_preserves_payload(
                chunk_lens in prop::collection::vec(1usize..=64, 1..=12),
                read_limit in 1usize..=16,
            ) {
                let total: usize = chunk_lens.iter().sum();
                let payload: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();

                let mut transport = MockTransport::new();
                let mut offset = 0;
                for len in &chunk_lens {
                    let header = ChunkHeader { length: *len as u16 };
                    transport.push_read(&header.to_bytes());
                    transport.push_read(&payload[offset..offset + len]);
                    offset += len;
                }
                transport.set_read_limit(read_limit);

                let mut e = ProtocolEngine::new(transport, Duration::from_millis(40)).unwrap();
                let mut dest = vec![0u8; total];
                e.read_data(&mut dest, total).unwrap();

                prop_assert_eq!(dest, payload);
            }
        }
    }
}
