//! Observation state controller (C5).
//!
//! Drives `IDLE -> LISTEN -> RECORD` transitions from status-dictionary
//! fields, checked once per block advance rather than per packet, using
//! [`crate::mjd`] to decompose the RECORD start instant. Structured as a
//! small explicit state enum the way the teacher keeps plugin lifecycle
//! state (`running`/`ended` flags in `Aes67Stream`) rather than a generic
//! state-machine crate.

use log::warn;

use crate::flow::{DestIp, FlowController};
use crate::mjd;
use crate::status::StatusDictionary;
use crate::AssemblerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Listen,
    Record,
}

pub struct StateController {
    state: RunState,
    current_dest: DestIp,
    port: u16,
}

impl StateController {
    pub fn new(port: u16) -> Self {
        Self {
            state: RunState::Idle,
            current_dest: DestIp::ZERO,
            port,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run one check, called once per block advance with the new current
    /// block's first `pktidx` (`block_num * pktidx_per_block`).
    pub fn check_start_stop(
        &mut self,
        pktidx: u64,
        pktidx_per_block: u64,
        pkt_per_block: u64,
        dict: &dyn StatusDictionary,
        flow: &mut dyn FlowController,
        maxflows: u32,
    ) -> Result<(), AssemblerError> {
        self.sync_destip(dict, flow, maxflows)?;

        // Property 6 is a universal invariant, not a LISTEN-only one: run the
        // round-down on every tick, regardless of state, matching the
        // original C's unconditional per-block-boundary recompute.
        let pktstart = Self::round_down(dict.get_u64("PKTSTART").unwrap_or(0), pktidx_per_block);
        dict.set_u64("PKTSTART", pktstart);

        match self.state {
            RunState::Idle => {}
            RunState::Listen => {
                let pktstop = dict.get_u64("PKTSTOP").unwrap_or(u64::MAX);
                if pktidx >= pktstart && pktidx < pktstop {
                    self.enter_record(pktidx, dict);
                }
            }
            RunState::Record => {
                let pktstop = dict.get_u64("PKTSTOP").unwrap_or(u64::MAX);
                if pktidx >= pktstop {
                    self.state = RunState::Listen;
                    dict.set_u32("STTVALID", 0);
                    dict.set("DAQSTATE", "LISTEN");
                }
            }
        }

        // PKTSTOP derivation from DWELL is only meaningful once listening;
        // recompute it whenever DWELL/CHAN_BW are present so a later LISTEN
        // observation picks up a freshly supplied dwell time.
        if self.state != RunState::Idle {
            if let (Some(dwell), Some(chan_bw)) = (dict.get_f64("DWELL"), dict.get_f64("CHAN_BW")) {
                if chan_bw != 0.0 && pkt_per_block != 0 {
                    let tbin = 1e-6 / chan_bw.abs();
                    let n_blocks = (dwell / (tbin * pkt_per_block as f64)).floor() as u64;
                    dict.set_u64("PKTSTOP", pktstart + pktidx_per_block * n_blocks);
                }
            }
        }

        Ok(())
    }

    fn enter_record(&mut self, pktidx: u64, dict: &dyn StatusDictionary) {
        let sttvalid = dict.get_u32("STTVALID").unwrap_or(0);
        if sttvalid == 0 {
            let synctime = dict.get_u64("SYNCTIME").unwrap_or(0);
            let chan_bw = dict.get_f64("CHAN_BW").unwrap_or(0.0);
            let pktntime = dict.get_u64("PKTNTIME").unwrap_or(0);
            let realtime_secs = mjd::realtime_secs_since_sync(pktidx, pktntime, chan_bw);
            let (unix_seconds, nanos) = mjd::instant_from_dwell(synctime, realtime_secs);
            let decomposed = mjd::mjd_from_unix(unix_seconds, nanos);
            dict.set_u32("STT_IMJD", decomposed.imjd);
            dict.set_u32("STT_SMJD", decomposed.smjd);
            dict.set_f64("STT_OFFS", decomposed.offs);
        }
        self.state = RunState::Record;
        dict.set_u32("STTVALID", 1);
        dict.set("DAQSTATE", "RECORD");
    }

    /// React to a `DESTIP` change: `0.0.0.0` <-> non-zero drives
    /// `IDLE`/`LISTEN`. A direct non-zero -> non-zero change while listening
    /// is illegal and ignored (scenario S7).
    fn sync_destip(
        &mut self,
        dict: &dyn StatusDictionary,
        flow: &mut dyn FlowController,
        maxflows: u32,
    ) -> Result<(), AssemblerError> {
        let raw = dict.get("DESTIP").unwrap_or_else(|| "0.0.0.0".to_string());
        let parsed = DestIp::parse(&raw)?;

        if parsed == self.current_dest {
            return Ok(());
        }

        if self.current_dest.is_active() && parsed.is_active() {
            warn!("illegal DESTIP change from {} to {} while listening", self.current_dest, parsed);
            dict.set("DESTIP", &self.current_dest.to_string());
            return Ok(());
        }

        if parsed.is_active() {
            parsed.install(flow, self.port, maxflows)?;
            self.current_dest = parsed;
            self.state = RunState::Listen;
            dict.set("DAQSTATE", "LISTEN");
        } else {
            self.current_dest.remove(flow, self.port, maxflows)?;
            self.current_dest = DestIp::ZERO;
            self.state = RunState::Idle;
            dict.set_u32("STTVALID", 0);
            dict.set("DAQSTATE", "IDLE");
        }

        Ok(())
    }

    fn round_down(value: u64, unit: u64) -> u64 {
        if unit == 0 {
            value
        } else {
            (value / unit) * unit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::NullFlowController;
    use crate::status::InMemoryStatusDictionary;

    #[test]
    fn pktstart_rounds_down_to_block_boundary() {
        let dict = InMemoryStatusDictionary::seeded([("DESTIP", "10.0.0.1"), ("PKTSTART", "65")]);
        let mut flow = NullFlowController::new();
        let mut controller = StateController::new(4015);

        controller
            .check_start_stop(0, 4, 8, &dict, &mut flow, 4)
            .unwrap();

        assert_eq!(dict.get_u64("PKTSTART"), Some(64));
    }

    #[test]
    fn enters_record_within_pktstart_pktstop_window() {
        let dict = InMemoryStatusDictionary::seeded([
            ("DESTIP", "10.0.0.1"),
            ("PKTSTART", "64"),
            ("PKTSTOP", "128"),
            ("SYNCTIME", "1700000000"),
            ("CHAN_BW", "0.25"),
            ("PKTNTIME", "16"),
        ]);
        let mut flow = NullFlowController::new();
        let mut controller = StateController::new(4015);

        controller.check_start_stop(64, 4, 8, &dict, &mut flow, 4).unwrap();

        assert_eq!(controller.state(), RunState::Record);
        assert_eq!(dict.get_u32("STTVALID"), Some(1));
        assert_eq!(dict.get("DAQSTATE"), Some("RECORD".to_string()));
    }

    #[test]
    fn leaves_record_at_pktstop() {
        let dict = InMemoryStatusDictionary::seeded([
            ("DESTIP", "10.0.0.1"),
            ("PKTSTART", "0"),
            ("PKTSTOP", "128"),
            ("SYNCTIME", "1700000000"),
            ("CHAN_BW", "0.25"),
            ("PKTNTIME", "16"),
        ]);
        let mut flow = NullFlowController::new();
        let mut controller = StateController::new(4015);
        controller.check_start_stop(0, 4, 8, &dict, &mut flow, 4).unwrap();
        assert_eq!(controller.state(), RunState::Record);

        controller.check_start_stop(128, 4, 8, &dict, &mut flow, 4).unwrap();
        assert_eq!(controller.state(), RunState::Listen);
        assert_eq!(dict.get_u32("STTVALID"), Some(0));
    }

    #[test]
    fn idle_to_listen_installs_flows() {
        let dict = InMemoryStatusDictionary::seeded([("DESTIP", "10.0.0.1+1")]);
        let mut flow = NullFlowController::new();
        let mut controller = StateController::new(4015);

        controller.check_start_stop(0, 4, 8, &dict, &mut flow, 4).unwrap();

        assert_eq!(controller.state(), RunState::Listen);
        assert_eq!(flow.installed().len(), 2);
    }
}
