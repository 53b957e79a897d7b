//! MJD (Modified Julian Day) decomposition used by the state controller
//! (C5) to compute `STT_IMJD`/`STT_SMJD`/`STT_OFFS` at RECORD entry.
//!
//! Resolved from the original (un-included) `get_mjd_from_timespec` helper
//! referenced by `hpguppi_atasnap_voltage_thread.c`: seconds since the UNIX
//! epoch convert to MJD via the well-known fixed offset of 40587 days
//! between the two epochs.

/// Days between the UNIX epoch (1970-01-01) and MJD epoch (1858-11-17).
const UNIX_EPOCH_MJD_OFFSET_DAYS: i64 = 40587;

/// `(STT_IMJD, STT_SMJD, STT_OFFS)`, decomposed from a UNIX time split into
/// whole seconds and a nanosecond fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mjd {
    pub imjd: u32,
    pub smjd: u32,
    pub offs: f64,
}

/// Decompose `unix_seconds + nanos/1e9` into integer MJD, integer
/// second-of-day, and a fractional-second offset.
pub fn mjd_from_unix(unix_seconds: i64, nanos: i64) -> Mjd {
    let days = unix_seconds.div_euclid(86_400);
    let sec_of_day = unix_seconds.rem_euclid(86_400);
    let imjd = days + UNIX_EPOCH_MJD_OFFSET_DAYS;

    Mjd {
        imjd: imjd as u32,
        smjd: sec_of_day as u32,
        offs: nanos as f64 / 1e9,
    }
}

/// Compute the `(unix_seconds, nanos)` instant `synctime + realtime_secs`,
/// rounding to the nearest second for the integer part the way the
/// original C code does (`rint(realtime_secs)`), with the remainder carried
/// as a nanosecond fraction.
pub fn instant_from_dwell(synctime: u64, realtime_secs: f64) -> (i64, i64) {
    let whole = realtime_secs.round();
    let frac = realtime_secs - whole;
    let unix_seconds = synctime as i64 + whole as i64;
    let nanos = (frac * 1e9).round() as i64;
    (unix_seconds, nanos)
}

/// Real-time seconds elapsed since `SYNCTIME` for a given `pktidx`, per
/// §4.5: `pktidx * pkt_ntime / (1e6 * |chan_bw_mhz|)`.
pub fn realtime_secs_since_sync(pktidx: u64, pkt_ntime: u64, chan_bw_mhz: f64) -> f64 {
    if chan_bw_mhz == 0.0 {
        return 0.0;
    }
    (pktidx * pkt_ntime) as f64 / (1e6 * chan_bw_mhz.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_is_mjd_40587() {
        let mjd = mjd_from_unix(0, 0);
        assert_eq!(mjd.imjd, 40587);
        assert_eq!(mjd.smjd, 0);
        assert_eq!(mjd.offs, 0.0);
    }

    #[test]
    fn seconds_of_day_wraps_correctly() {
        // 86_400 + 3661 seconds -> one full day plus 01:01:01.
        let mjd = mjd_from_unix(86_400 + 3661, 0);
        assert_eq!(mjd.imjd, 40588);
        assert_eq!(mjd.smjd, 3661);
    }

    #[test]
    fn realtime_secs_matches_scenario_s5() {
        // CHAN_BW=0.25 MHz, PKTNTIME=16, pktidx=64.
        let secs = realtime_secs_since_sync(64, 16, 0.25);
        assert!((secs - (64.0 * 16.0 / (1e6 * 0.25))).abs() < 1e-12);
    }

    #[test]
    fn instant_from_dwell_splits_whole_and_fractional() {
        let (secs, nanos) = instant_from_dwell(1_700_000_000, 1.5);
        assert_eq!(secs, 1_700_000_002);
        assert_eq!(nanos, -500_000_000);
    }
}
