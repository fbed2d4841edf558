//! Transport-level session protocol.
//!
//! This module defines the byte-level contract between the session engine
//! and a worker process:
//! - section markers ([`sentinel`]) that delimit data, exceptions and
//!   end-of-stream events
//! - length-prefixed string encoding ([`envelope`]) for textual payloads
//!
//! What the bytes inside a command or data section mean is owned by the
//! [`RecordCodec`](crate::codec::RecordCodec); this module only carries
//! them reliably.

pub mod envelope;
pub mod sentinel;

pub use envelope::{read_envelope, write_envelope, MAX_ENVELOPE_LEN};
