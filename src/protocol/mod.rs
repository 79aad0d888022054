//! Spectrometer wire protocol implementation
//!
//! This module provides the frame layouts, the command code table, and the
//! exchange engine that drives them over a [`crate::transport::Transport`].

mod engine;
mod frame;
mod types;

pub use engine::ProtocolEngine;
pub use frame::{ChunkHeader, CommandFrame, ReplyFrame};
pub use types::CommandCode;

/// Command frame magic: `"#CMD"` in ASCII, not null-terminated.
pub const COMMAND_MAGIC: [u8; 4] = *b"#CMD";

/// Reply frame magic: `"#ANS"`.
pub const REPLY_MAGIC: [u8; 4] = *b"#ANS";

/// Data chunk header magic: `"#DAT"`.
pub const CHUNK_MAGIC: [u8; 4] = *b"#DAT";

/// Command frame size in bytes.
pub const COMMAND_SIZE: usize = 12;

/// Reply frame size in bytes.
pub const REPLY_SIZE: usize = 10;

/// Chunk header size in bytes; the declared payload follows immediately.
pub const CHUNK_HEADER_SIZE: usize = 6;

/// Byte length of a command payload. The device accepts nothing else.
pub const COMMAND_DATA_LEN: u8 = 4;
