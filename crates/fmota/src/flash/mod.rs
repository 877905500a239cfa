//! Flash writer
//!
//! Erase, program and verify a single contiguous flash region:
//!
//! ```text
//! erase(addr, len) ──► write(addr, chunk₀) ──► … ──► write(addrₙ, chunkₙ) ──► verify(addr, len)
//!       │                      │                                                 │
//!    60 only              60 + status                                     60 + crc16 == local
//! ```
//!
//! No phase is retried; the first failure is returned.

mod error;
mod writer;

pub use error::FlashError;
pub use writer::{plan_chunks, Chunk, FlashProgress, FlashWriter, RegionReport};

/// Largest payload accepted by one write command
pub const MAX_CHUNK_LEN: usize = 128;
