//! Chunked streaming over a decoded buffer.
//!
//! ```text
//! AudioBuffer ─► ChunkScheduler ─► AudioChunk (span + native samples + 16 kHz mono)
//!                                        │
//!                              removal / detection
//!                                        │
//!                OutputAssembler ◄───────┘  (overlap trimmed or cross-faded)
//! ```
//!
//! Boundary handling lives here, behind `ChunkSpan`, so the per-chunk loop in
//! the pipeline never does index arithmetic on overlaps itself.

pub mod assemble;
pub mod chunk;
pub mod scheduler;

pub use assemble::{OutputAssembler, OverlapMode};
pub use chunk::{AudioChunk, ChunkSpan};
pub use scheduler::{ChunkConfig, ChunkScheduler, Chunks};
