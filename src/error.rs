//! Error types for the packet-to-block assembler.

use thiserror::Error;

/// Errors the assembler can report.
///
/// Most fault conditions named in the design (late packets, discontinuities,
/// invalid obs info, bad `feng_id`) are not represented here: they are
/// expected, handled outcomes of routing a packet, not failures. Only
/// conditions that stop the thread or reject a configuration change surface
/// as `Err`.
#[derive(Debug, Error)]
pub enum AssemblerError {
    /// Observation geometry or ring layout is invalid at initialization time.
    #[error("configuration error: {0}")]
    Config(String),

    /// A `DESTIP` value could not be parsed, or an in-progress subscription
    /// was asked to switch to another non-zero address directly.
    #[error("invalid DESTIP: {0}")]
    InvalidDestIp(String),

    /// A ring wait returned something other than a timeout. Fatal: the run
    /// loop aborts rather than retrying.
    #[error("ring error: {0}")]
    RingFatal(String),
}
