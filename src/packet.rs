//! Packet parser (C1).
//!
//! Decodes a raw input-ring slot into a [`PacketHeader`] plus a payload
//! slice. Parsing follows the same shape as the teacher's
//! `RtpHeader::parse`/`RtpPacket::parse` (`input/rtp.rs`): fixed-width
//! big-endian fields read out of a byte slice with `Option` returned on a
//! too-short or malformed slice.

/// Fixed-size packet header, as decoded from a raw F-engine voltage packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Antenna id this packet came from.
    pub feng_id: u64,
    /// Absolute base channel of this packet's channel chunk.
    pub feng_chan: u64,
    /// Monotone time index, in units of `pkt_ntime` samples.
    pub pktidx: u64,
}

/// Header size, in bytes, of an F-engine voltage packet preceding its payload.
pub const HEADER_SIZE: usize = 24;

/// Required alignment, in bytes, of the payload offset within an input ring
/// slot. Chosen to match typical NIC DMA alignment.
pub const PACKET_ALIGNMENT: usize = 64;

impl PacketHeader {
    /// Parse a header out of the front of `data`. Returns `None` if `data`
    /// is too short to contain a full header.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }
        let feng_id = u64::from_be_bytes(data[0..8].try_into().ok()?);
        let feng_chan = u64::from_be_bytes(data[8..16].try_into().ok()?);
        let pktidx = u64::from_be_bytes(data[16..24].try_into().ok()?);
        Some(Self {
            feng_id,
            feng_chan,
            pktidx,
        })
    }
}

/// A parsed packet: header plus a borrowed view of its payload.
#[derive(Debug)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Parse a complete packet (header + payload) from a raw slot.
    ///
    /// `expected_payload_len` is `pkt_nchan * pkt_ntime * 2` bytes (one
    /// packed dual-pol `u16` per (channel, time) cell); a slot whose payload
    /// is shorter than that is rejected.
    pub fn parse(data: &'a [u8], expected_payload_len: usize) -> Option<Self> {
        let header = PacketHeader::parse(data)?;
        let payload = &data[HEADER_SIZE..];
        if payload.len() < expected_payload_len {
            return None;
        }
        Some(Self {
            header,
            payload: &payload[..expected_payload_len],
        })
    }
}

/// Verify that `payload_offset` (the byte offset of the payload within a
/// ring slot) satisfies the platform packet-alignment requirement.
///
/// This is a property of the ring's slot layout, checked once at
/// initialization — not a per-packet check.
pub fn check_payload_alignment(payload_offset: usize) -> Result<(), crate::AssemblerError> {
    if payload_offset % PACKET_ALIGNMENT != 0 {
        return Err(crate::AssemblerError::Config(format!(
            "payload offset {payload_offset} is not a multiple of the packet alignment unit ({PACKET_ALIGNMENT})"
        )));
    }
    Ok(())
}
