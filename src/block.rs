//! Block descriptor and header stamping (part of C3).

use std::collections::HashMap;

/// State of one working block owned by the assembler.
#[derive(Debug, Clone)]
pub struct WorkingBlock {
    /// Position in the output ring.
    pub block_idx: usize,
    /// Absolute output block number (`pktidx / pktidx_per_block`).
    pub block_num: u64,
    /// Packets scattered into this block so far.
    pub npacket: u32,
    /// Packets expected for a full block.
    pub pkts_per_block: u32,
    /// Packet-index granularity of one block.
    pub pktidx_per_block: u64,
}

impl WorkingBlock {
    pub fn new(block_idx: usize, block_num: u64, pkts_per_block: u32, pktidx_per_block: u64) -> Self {
        Self {
            block_idx,
            block_num,
            npacket: 0,
            pkts_per_block,
            pktidx_per_block,
        }
    }

    /// `NDROP = max(0, pkts_per_block - npacket)`, saturating to zero when
    /// duplicates push `npacket` above `pkts_per_block`.
    pub fn ndrop(&self) -> u32 {
        self.pkts_per_block.saturating_sub(self.npacket)
    }

    pub fn pktidx(&self) -> u64 {
        self.block_num * self.pktidx_per_block
    }

    /// Header fields written at finalize time, per §6.
    pub fn header_fields(&self, effective_block_size: i32) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("PKTIDX".to_string(), self.pktidx().to_string());
        fields.insert("NPKT".to_string(), self.npacket.to_string());
        fields.insert("NDROP".to_string(), self.ndrop().to_string());
        fields.insert(
            "DROPSTAT".to_string(),
            format!("{}/{}", self.ndrop(), self.pkts_per_block),
        );
        fields.insert("BLOCSIZE".to_string(), effective_block_size.to_string());
        fields.insert("PIPERBLK".to_string(), self.pktidx_per_block.to_string());
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndrop_is_zero_when_full() {
        let block = WorkingBlock {
            npacket: 32,
            pkts_per_block: 32,
            ..WorkingBlock::new(0, 0, 32, 4)
        };
        assert_eq!(block.ndrop(), 0);
    }

    #[test]
    fn ndrop_saturates_on_duplicates() {
        let block = WorkingBlock {
            npacket: 40,
            pkts_per_block: 32,
            ..WorkingBlock::new(0, 0, 32, 4)
        };
        assert_eq!(block.ndrop(), 0);
    }

    #[test]
    fn header_fields_match_scenario_s2() {
        let block = WorkingBlock {
            npacket: 31,
            pkts_per_block: 32,
            ..WorkingBlock::new(0, 0, 32, 4)
        };
        let fields = block.header_fields(16384);
        assert_eq!(fields["NPKT"], "31");
        assert_eq!(fields["NDROP"], "1");
        assert_eq!(fields["DROPSTAT"], "1/32");
        assert_eq!(fields["PKTIDX"], "0");
    }
}
