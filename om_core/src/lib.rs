//! Core of the OM format: chunked, compressed, random-access storage for
//! multi-dimensional f32 arrays.
//!
//! [`OmWriter`] streams chunks into any append-only [`WriteBackend`];
//! [`OmReader`] serves hyper-rectangular windows from any random-access
//! [`ReadBackend`], decompressing only the chunks the window touches.

pub mod backend;
pub mod error;
pub mod format;
pub mod geometry;
pub mod lut;
pub mod reader;
pub mod writer;

pub use backend::{FileBackend, ReadBackend, WriteBackend};
pub use error::{OmError, Result};
pub use format::{Compression, TrailerMeta, FORMAT_VERSION, MAGIC};
pub use geometry::ChunkGrid;
pub use reader::OmReader;
pub use writer::OmWriter;
