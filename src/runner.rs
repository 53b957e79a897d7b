//! Orchestration loop (C11).
//!
//! Ties C1-C8 into the single-thread, blocking-wait model from §5: one
//! `thread::spawn`-style loop with three suspension points, following the
//! teacher's `Aes67Stream::receiver_loop` shape (blocking read with a
//! timeout, checked against a shutdown flag each iteration) rather than an
//! async task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::assembler::{BlockAssembler, Route};
use crate::flow::FlowController;
use crate::obs_info::ObsInfoCache;
use crate::packet::{check_payload_alignment, Packet};
use crate::ring::{InputRing, OutputRing, WaitOutcome};
use crate::scatter::{scatter_packet, ScatterGeometry};
use crate::state::StateController;
use crate::stats::StatsPublisher;
use crate::status::StatusDictionary;
use crate::AssemblerError;

const INPUT_WAIT: Duration = Duration::from_millis(50);
const OBS_INFO_TICK: Duration = Duration::from_secs(1);
const DEFAULT_N_INPUT_BLOCKS: usize = 4;

/// Static configuration the runner needs that does not live in the status
/// dictionary (ring geometry, UDP port, flow-install ceiling).
pub struct RunnerConfig {
    pub max_block_bytes: u64,
    pub port: u16,
    pub maxflows: u32,
}

pub struct AssemblerRunner {
    input: Box<dyn InputRing>,
    output: Box<dyn OutputRing>,
    dict: Arc<dyn StatusDictionary>,
    flow: Box<dyn FlowController>,
    config: RunnerConfig,
    obs_info: ObsInfoCache,
    state: StateController,
    stats: StatsPublisher,
    assembler: Option<BlockAssembler>,
    shutdown: Arc<AtomicBool>,
}

impl AssemblerRunner {
    pub fn new(
        input: Box<dyn InputRing>,
        output: Box<dyn OutputRing>,
        dict: Arc<dyn StatusDictionary>,
        flow: Box<dyn FlowController>,
        config: RunnerConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, AssemblerError> {
        check_payload_alignment(input.payload_offset())?;
        let max_block_bytes = config.max_block_bytes;
        let port = config.port;
        Ok(Self {
            input,
            output,
            dict,
            flow,
            config,
            obs_info: ObsInfoCache::new(max_block_bytes),
            state: StateController::new(port),
            stats: StatsPublisher::new(DEFAULT_N_INPUT_BLOCKS),
            assembler: None,
            shutdown,
        })
    }

    /// Run until the shutdown flag is observed set. On shutdown the
    /// currently held input slot is released and any in-flight working
    /// blocks are abandoned without finalizing, per §5.
    pub fn run(&mut self) -> Result<(), AssemblerError> {
        self.dict.set("NETSTAT", "init");
        self.obs_info.refresh(self.dict.as_ref());

        let mut last_obs_info_tick = Instant::now();
        let mut last_block_boundary = Instant::now();
        let mut slot_received_at: Option<Instant> = None;

        while !self.shutdown.load(Ordering::Relaxed) {
            if last_obs_info_tick.elapsed() >= OBS_INFO_TICK {
                self.obs_info.refresh(self.dict.as_ref());
                self.stats
                    .publish_wall_clock_tick(self.dict.as_ref(), last_obs_info_tick.elapsed());
                last_obs_info_tick = Instant::now();
            }

            if !self.obs_info.is_valid() {
                self.dict.set("NETSTAT", "waiting");
                match self.input.wait_filled_timeout(INPUT_WAIT)? {
                    WaitOutcome::Ready => self.input.release(),
                    WaitOutcome::TimedOut => {}
                }
                continue;
            }

            if self.assembler.is_none() {
                self.assembler = Some(BlockAssembler::new(
                    &self.obs_info.current(),
                    self.config.max_block_bytes,
                    0,
                    self.output.as_mut(),
                    self.dict.as_ref(),
                )?);
            }

            self.dict.set("NETSTAT", "receiving");
            match self.input.wait_filled_timeout(INPUT_WAIT)? {
                WaitOutcome::TimedOut => {
                    self.dict.set("NETSTAT", "waiting");
                    continue;
                }
                WaitOutcome::Ready => {
                    slot_received_at = Some(Instant::now());
                }
            }

            self.handle_slot(&mut last_block_boundary)?;

            if let Some(received_at) = slot_received_at.take() {
                self.stats.record_fill_latency(received_at.elapsed());
            }
            self.input.release();
        }

        Ok(())
    }

    fn handle_slot(&mut self, last_block_boundary: &mut Instant) -> Result<(), AssemblerError> {
        let obs_info = self.obs_info.current();
        let payload_len = (obs_info.pkt_nchan * obs_info.pkt_ntime) as usize;
        let slot = self.input.current_slot();

        let packet = match Packet::parse(slot, payload_len * 2) {
            Some(p) => p,
            None => {
                warn!("dropping malformed or short packet");
                return Ok(());
            }
        };

        if packet.header.feng_id >= obs_info.nants {
            return Ok(());
        }

        let header = packet.header;
        let payload_u16 = bytes_to_u16_lossy(packet.payload);

        let pktidx_per_block = self.assembler.as_ref().unwrap().pktidx_per_block();
        let pkt_blk_num = header.pktidx / pktidx_per_block;
        let route = self.assembler.as_ref().unwrap().route(pkt_blk_num);

        let index = match route {
            Route::Accepted(idx) => idx,
            Route::Late => {
                self.stats.counters().record_late();
                return Ok(());
            }
            Route::Advance => {
                let finalized = self
                    .assembler
                    .as_mut()
                    .unwrap()
                    .advance(self.output.as_mut(), self.dict.as_ref())?;
                self.stats.counters().record_drop(finalized.ndrop as u64);
                self.stats
                    .publish_block_boundary(self.dict.as_ref(), last_block_boundary.elapsed());
                *last_block_boundary = Instant::now();
                debug!("advanced window past block {}", finalized.block_num);

                self.run_state_check(finalized.block_num + 1, pktidx_per_block, &obs_info)?;

                match self.assembler.as_ref().unwrap().route(pkt_blk_num) {
                    Route::Accepted(idx) => idx,
                    _ => return Ok(()),
                }
            }
            Route::Reset => {
                self.assembler
                    .as_mut()
                    .unwrap()
                    .reset(pkt_blk_num, self.output.as_mut(), self.dict.as_ref())?;
                return Ok(());
            }
        };

        let geometry = ScatterGeometry {
            nstrm: obs_info.nstrm,
            pkt_nchan: obs_info.pkt_nchan,
            pkt_ntime: obs_info.pkt_ntime,
            pktidx_per_block,
        };
        let block = self
            .assembler
            .as_ref()
            .unwrap()
            .payload_mut(index, self.output.as_mut());
        scatter_packet(
            &geometry,
            block,
            header.feng_id,
            header.feng_chan,
            obs_info.schan,
            header.pktidx,
            &payload_u16,
        );
        self.assembler.as_mut().unwrap().record_packet(index);
        self.stats.counters().record_packet(payload_u16.len() as u64 * 2);

        Ok(())
    }

    /// Run the state controller's per-block-boundary check. Only
    /// `AssemblerError::RingFatal` propagates out of the run loop per §7;
    /// every other error (e.g. a malformed `DESTIP`) is logged and
    /// swallowed so the thread keeps running.
    fn run_state_check(
        &mut self,
        block_num: u64,
        pktidx_per_block: u64,
        obs_info: &crate::obs_info::ObsInfo,
    ) -> Result<(), AssemblerError> {
        let pktidx = block_num * pktidx_per_block;
        let pkt_per_block = obs_info.pkt_per_block(self.config.max_block_bytes);
        match self.state.check_start_stop(
            pktidx,
            pktidx_per_block,
            pkt_per_block,
            self.dict.as_ref(),
            self.flow.as_mut(),
            self.config.maxflows,
        ) {
            Ok(()) => Ok(()),
            Err(e @ AssemblerError::RingFatal(_)) => {
                error!("state controller error: {e}");
                Err(e)
            }
            Err(e) => {
                error!("state controller error: {e}");
                Ok(())
            }
        }
    }
}

fn bytes_to_u16_lossy(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}
