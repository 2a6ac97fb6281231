//! Ogg/Opus voice-note analysis.
//!
//! Outbound voice notes need a duration and a 64-sample waveform preview.
//! The duration comes from the last granule position in the Ogg page chain;
//! the waveform is synthesized, seeded by the duration so the same clip
//! length always yields the same preview.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use chatbridge_shared::constants::{MAX_AUDIO_SECS, MIN_AUDIO_SECS, WAVEFORM_LEN};

use crate::error::{MediaError, Result};

const PAGE_MAGIC: &[u8; 4] = b"OggS";
const OPUS_HEAD: &[u8; 8] = b"OpusHead";
const PAGE_HEADER_LEN: usize = 27;
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
/// Bytes per second assumed when no granule position is found
const FALLBACK_BYTES_PER_SEC: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggAnalysis {
    pub duration_secs: u32,
    pub waveform: Vec<u8>,
}

/// Derive duration and waveform from an Ogg/Opus container.
///
/// Only a missing leading signature is an error.  Truncated or garbled
/// pages end the scan early and the result is built from whatever was read.
pub fn analyze_ogg_opus(data: &[u8]) -> Result<OggAnalysis> {
    if !data.starts_with(PAGE_MAGIC) {
        return Err(MediaError::NotOgg);
    }

    let mut last_granule: u64 = 0;
    let mut sample_rate = DEFAULT_SAMPLE_RATE;
    let mut pre_skip: u16 = 0;
    let mut found_head = false;

    let mut i = 0;
    while i < data.len() {
        if i + PAGE_HEADER_LEN >= data.len() {
            break;
        }
        if &data[i..i + 4] != PAGE_MAGIC {
            i += 1;
            continue;
        }

        let granule = read_u64_le(data, i + 6).unwrap_or(0);
        let sequence = read_u32_le(data, i + 18).unwrap_or(u32::MAX);
        let segments = data[i + 26] as usize;

        let table_end = i + PAGE_HEADER_LEN + segments;
        if table_end >= data.len() {
            break;
        }
        let body_len: usize = data[i + PAGE_HEADER_LEN..table_end]
            .iter()
            .map(|&len| len as usize)
            .sum();
        let page_len = PAGE_HEADER_LEN + segments + body_len;
        let page = &data[i..(i + page_len).min(data.len())];

        if !found_head && sequence <= 1 {
            if let Some((skip, rate)) = parse_opus_head(page) {
                pre_skip = skip;
                sample_rate = if rate == 0 { DEFAULT_SAMPLE_RATE } else { rate };
                found_head = true;
                debug!(sample_rate, pre_skip, "found OpusHead");
            }
        }

        if granule != 0 {
            last_granule = granule;
        }

        i += page_len;
    }

    if !found_head {
        warn!("OpusHead not found, using default sample rate");
    }

    let estimate = if last_granule > 0 {
        last_granule
            .saturating_sub(u64::from(pre_skip))
            .div_ceil(u64::from(sample_rate))
    } else {
        warn!(bytes = data.len(), "no granule position found, estimating duration");
        (data.len() / FALLBACK_BYTES_PER_SEC) as u64
    };
    let duration_secs =
        estimate.clamp(u64::from(MIN_AUDIO_SECS), u64::from(MAX_AUDIO_SECS)) as u32;

    debug!(bytes = data.len(), duration_secs, "analyzed Ogg/Opus clip");

    Ok(OggAnalysis {
        duration_secs,
        waveform: synthesize_waveform(duration_secs),
    })
}

/// `(pre_skip, input_sample_rate)` from an `OpusHead` packet inside `page`.
fn parse_opus_head(page: &[u8]) -> Option<(u16, u32)> {
    let marker = page.windows(OPUS_HEAD.len()).position(|w| w == OPUS_HEAD)?;
    // magic(8) version(1) channels(1) pre_skip(2) sample_rate(4)
    let pre_skip = read_u16_le(page, marker + 10)?;
    let sample_rate = read_u32_le(page, marker + 12)?;
    Some((pre_skip, sample_rate))
}

/// Synthetic voice-note waveform: two sinusoids whose frequency grows with
/// the duration (capped at 120 s), bounded noise, a fade envelope and a
/// baseline of 50.  Every sample lies in `0..=100`.
pub fn synthesize_waveform(duration_secs: u32) -> Vec<u8> {
    const BASE_AMPLITUDE: f64 = 35.0;

    let mut rng = StdRng::seed_from_u64(u64::from(duration_secs));
    let frequency = f64::from(duration_secs.min(120)) / 30.0;

    (0..WAVEFORM_LEN)
        .map(|i| {
            let pos = i as f64 / WAVEFORM_LEN as f64;

            let mut value = BASE_AMPLITUDE * (pos * PI * frequency * 8.0).sin();
            value += (BASE_AMPLITUDE / 2.0) * (pos * PI * frequency * 16.0).sin();
            value += (rng.gen::<f64>() - 0.5) * 15.0;
            value *= 0.7 + 0.3 * (pos * PI).sin();
            value += 50.0;

            value.clamp(0.0, 100.0) as u8
        })
        .collect()
}

fn read_u16_le(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2)?.try_into().ok().map(u16::from_le_bytes)
}

fn read_u32_le(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)?.try_into().ok().map(u32::from_le_bytes)
}

fn read_u64_le(data: &[u8], at: usize) -> Option<u64> {
    data.get(at..at + 8)?.try_into().ok().map(u64::from_le_bytes)
}
