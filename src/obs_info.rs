//! Observation-info cache (C2).
//!
//! `ObsInfo` is a typed, validated configuration record parsed once from
//! the status dictionary, the same way the teacher parses a connection
//! string once into `Aes67Url` (`input/url.rs`) rather than re-reading loose
//! fields throughout the hot path. `ObsInfoCache` re-reads and revalidates
//! it on the ~1 Hz tick described in the design.

use crate::status::StatusDictionary;

/// Bytes per dual-pol sample cell (one packed `u16`: two 8-bit polarizations).
pub const BYTES_PER_CELL: u64 = 2;

/// Observation geometry, as read from the status dictionary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObsInfo {
    pub fenchan: u64,
    pub nants: u64,
    pub nstrm: u64,
    pub pkt_ntime: u64,
    pub pkt_nchan: u64,
    pub schan: u64,
}

impl ObsInfo {
    /// Read geometry fields from the dictionary. Missing fields are left
    /// as zero, which `is_valid` will then reject.
    pub fn read(dict: &dyn StatusDictionary) -> Self {
        Self {
            fenchan: dict.get_u64("FENCHAN").unwrap_or(0),
            nants: dict.get_u64("NANTS").unwrap_or(0),
            nstrm: dict.get_u64("NSTRM").unwrap_or(0),
            pkt_ntime: dict.get_u64("PKTNTIME").unwrap_or(0),
            pkt_nchan: dict.get_u64("PKTNCHAN").unwrap_or(0),
            schan: dict.get_u64("SCHAN").unwrap_or(0),
        }
    }

    /// Valid iff every field is nonzero and `pkt_nchan * nstrm` divides the
    /// total channel count `fenchan`. `schan` may legitimately be zero, so
    /// it is exempt from the nonzero check.
    pub fn is_valid(&self) -> bool {
        if self.fenchan == 0
            || self.nants == 0
            || self.nstrm == 0
            || self.pkt_ntime == 0
            || self.pkt_nchan == 0
        {
            return false;
        }
        let stream_width = self.pkt_nchan * self.nstrm;
        stream_width != 0 && self.fenchan % stream_width == 0
    }

    pub fn obsnchan(&self) -> u64 {
        self.nants * self.nstrm * self.pkt_nchan
    }

    pub fn pkt_payload_bytes(&self) -> u64 {
        self.pkt_nchan * self.pkt_ntime * BYTES_PER_CELL
    }

    /// `floor(max_block_bytes / (pkt_payload_bytes * nants * nstrm)) *
    /// pkt_payload_bytes * nants * nstrm`.
    pub fn effective_block_size(&self, max_block_bytes: u64) -> u64 {
        let unit = self.pkt_payload_bytes() * self.nants * self.nstrm;
        if unit == 0 {
            return 0;
        }
        (max_block_bytes / unit) * unit
    }

    pub fn pkt_per_block(&self, max_block_bytes: u64) -> u64 {
        let payload_bytes = self.pkt_payload_bytes();
        if payload_bytes == 0 {
            return 0;
        }
        self.effective_block_size(max_block_bytes) / payload_bytes
    }

    pub fn pktidx_per_block(&self, max_block_bytes: u64) -> u64 {
        let per_fid_stream = self.nants * self.nstrm;
        if per_fid_stream == 0 {
            return 0;
        }
        self.pkt_per_block(max_block_bytes) / per_fid_stream
    }
}

/// Caches `ObsInfo` and the derived quantities, republishing them to the
/// status dictionary whenever a re-read changes validity or values.
pub struct ObsInfoCache {
    max_block_bytes: u64,
    current: ObsInfo,
    valid: bool,
}

impl ObsInfoCache {
    pub fn new(max_block_bytes: u64) -> Self {
        Self {
            max_block_bytes,
            current: ObsInfo::default(),
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn current(&self) -> ObsInfo {
        self.current
    }

    pub fn pktidx_per_block(&self) -> u64 {
        self.current.pktidx_per_block(self.max_block_bytes)
    }

    pub fn effective_block_size(&self) -> u64 {
        self.current.effective_block_size(self.max_block_bytes)
    }

    /// Re-read from the dictionary. Call once at startup and on every ~1 Hz
    /// tick. Publishes `OBSINFO=VALID|INVALID` and, when valid, `OBSNCHAN`,
    /// `PIPERBLK`, and `BLOCSIZE`.
    pub fn refresh(&mut self, dict: &dyn StatusDictionary) {
        self.current = ObsInfo::read(dict);
        self.valid = self.current.is_valid();

        if self.valid {
            dict.set_u64("OBSNCHAN", self.current.obsnchan());
            dict.set_u32("PIPERBLK", self.pktidx_per_block() as u32);
            dict.set_i32("BLOCSIZE", self.effective_block_size() as i32);
            dict.set("OBSINFO", "VALID");
        } else {
            dict.set("OBSINFO", "INVALID");
        }
    }
}
