//! Low-level primitives beneath the tree engine.
//!
//! Byte encoders, positioned file I/O and the page store adapters.

/// Byte-level utilities and encoding/decoding.
pub mod bytes;

/// Positioned file I/O used by the file-backed page store.
pub mod io;

/// Page store trait and the in-memory and file-backed adapters.
pub mod pager;
