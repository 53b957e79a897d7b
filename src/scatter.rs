//! Strided per-packet scatter kernel (C4).
//!
//! Transposes a packet's time-major payload into the output block's
//! antenna/stream/channel-major layout. The copy loop mirrors the plain
//! (non-SIMD) per-sample loop the teacher uses in
//! `input/rtp.rs::convert_24bit_be_to_float` — a `for` over input samples
//! writing one at a time into the destination — generalized to the strided
//! destination addressing from the GUPPI RAW layout.

/// Parameters needed to compute scatter offsets for one packet.
#[derive(Debug, Clone, Copy)]
pub struct ScatterGeometry {
    pub nstrm: u64,
    pub pkt_nchan: u64,
    pub pkt_ntime: u64,
    pub pktidx_per_block: u64,
}

impl ScatterGeometry {
    /// Spacing, in dual-pol samples, from one channel to the next for a
    /// given (F-engine, stream, pktidx). Equal to the block's time extent.
    pub fn ostride(&self) -> u64 {
        self.pktidx_per_block * self.pkt_ntime
    }

    /// Size, in samples, of a single stream for a single F-engine across the
    /// whole block.
    pub fn stream_stride(&self) -> u64 {
        self.pkt_nchan as u64 * self.ostride()
    }

    /// Size, in samples, of all streams for a single F-engine.
    pub fn fid_stride(&self) -> u64 {
        self.stream_stride() * self.nstrm
    }

    /// Compute the destination offset, in dual-pol samples, of
    /// `(feng_id, stream, channel_in_packet, time_in_packet)` within the
    /// block.
    pub fn offset(&self, feng_id: u64, stream: u64, channel_in_packet: u64, time_in_packet: u64) -> u64 {
        feng_id * self.fid_stride()
            + stream * self.stream_stride()
            + channel_in_packet * self.ostride()
            + time_in_packet
    }

    /// Which stream chunk a packet's absolute channel base belongs to.
    pub fn stream_of(&self, feng_chan: u64, schan: u64) -> u64 {
        (feng_chan - schan) / self.pkt_nchan
    }

    /// A packet's time origin within its block, in samples.
    pub fn time_origin(&self, pktidx: u64) -> u64 {
        (pktidx % self.pktidx_per_block) * self.pkt_ntime
    }
}

/// Scatter one packet's payload (`pkt_nchan * pkt_ntime` dual-pol `u16`
/// cells, time-major then channel) into `block`, a flat `[F, S, C, T]`
/// buffer of dual-pol samples.
///
/// `block` must be large enough to hold `fid_stride() * nants` samples;
/// callers are expected to have validated this via [`ObsInfo`] before the
/// packet stream starts.
///
/// [`ObsInfo`]: crate::obs_info::ObsInfo
pub fn scatter_packet(
    geometry: &ScatterGeometry,
    block: &mut [u16],
    feng_id: u64,
    feng_chan: u64,
    schan: u64,
    pktidx: u64,
    payload: &[u16],
) {
    let stream = geometry.stream_of(feng_chan, schan);
    let time_origin = geometry.time_origin(pktidx);
    let base = geometry.offset(feng_id, stream, 0, time_origin);
    let ostride = geometry.ostride();
    let pkt_nchan = geometry.pkt_nchan;

    // TODO: use a non-temporal store for this loop once a safe-Rust path
    // exists; block data is never re-read by this stage so it need not
    // pollute cache.
    for t in 0..geometry.pkt_ntime {
        let row_base = base + t;
        let src_row = (t * pkt_nchan) as usize;
        for c in 0..pkt_nchan {
            let dst = (row_base + c * ostride) as usize;
            block[dst] = payload[src_row + c as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> ScatterGeometry {
        ScatterGeometry {
            nstrm: 1,
            pkt_nchan: 4,
            pkt_ntime: 2,
            pktidx_per_block: 4,
        }
    }

    #[test]
    fn offsets_are_disjoint_across_time_and_channel() {
        let g = geometry();
        let mut seen = std::collections::HashSet::new();
        for t in 0..g.pkt_ntime {
            for c in 0..g.pkt_nchan {
                assert!(seen.insert(g.offset(0, 0, c, t)));
            }
        }
    }

    #[test]
    fn scatter_inverse_roundtrip() {
        let g = geometry();
        let nants = 2u64;
        let block_len = (g.fid_stride() * nants) as usize;
        let mut block = vec![0xFFFFu16; block_len];

        // feng_id=1, stream=0 (schan=0), pktidx=0 -> time_origin=0.
        let payload: Vec<u16> = (0..(g.pkt_nchan * g.pkt_ntime) as u16).collect();
        scatter_packet(&g, &mut block, 1, 0, 0, 0, &payload);

        for t in 0..g.pkt_ntime {
            for c in 0..g.pkt_nchan {
                let off = g.offset(1, 0, c, t) as usize;
                let expected = (t * g.pkt_nchan + c) as u16;
                assert_eq!(block[off], expected, "mismatch at t={t} c={c}");
            }
        }
    }

    #[test]
    fn stream_is_derived_from_channel_chunk() {
        let g = geometry();
        assert_eq!(g.stream_of(0, 0), 0);
        assert_eq!(g.stream_of(4, 0), 1);
        assert_eq!(g.stream_of(12, 8), 1);
    }

    #[test]
    fn time_origin_wraps_within_block() {
        let g = geometry();
        // pktidx_per_block=4, pkt_ntime=2: pktidx=5 -> (5 % 4) * 2 = 2.
        assert_eq!(g.time_origin(5), 2);
    }
}
