// Claxon -- A FLAC encoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `frame` module runs the per-block encoding pipeline: stereo
//! decorrelation, per-channel residual encoding, and frame serialisation.

use crate::bitwriter::BitWriter;
use crate::config::{ResolvedConfig, StereoMethod};
use crate::crc;
use crate::error::{FlacError, FlacResult};
use crate::rice;
use crate::subframe::{self, EncodeParams, SubframeState};

/// Which channel decorrelation a stereo frame used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    /// Not a two-channel stream; every channel is coded independently.
    NotStereo,
    LeftRight,
    LeftSide,
    RightSide,
    MidSide,
}

impl ChannelMode {
    /// The 4-bit channel assignment field, given the independent-channel
    /// count (only meaningful for `NotStereo`).
    fn wire_code(self, channel_count: u32) -> u32 {
        match self {
            ChannelMode::NotStereo | ChannelMode::LeftRight => channel_count - 1,
            ChannelMode::LeftSide => 0b1000,
            ChannelMode::RightSide => 0b1001,
            ChannelMode::MidSide => 0b1010,
        }
    }
}

fn second_order_difference(samples: &[i64]) -> Vec<i64> {
    let mut d = vec![0i64; samples.len()];
    for i in 2..samples.len() {
        d[i] = samples[i] - 2 * samples[i - 1] + samples[i - 2];
    }
    d[2..].to_vec()
}

fn channel_cost_estimate(samples: &[i64]) -> u64 {
    rice::estimate_cost(&second_order_difference(samples))
}

/// Picks the cheapest of the four two-channel decorrelations by estimating
/// each channel's residual cost on a cheap order-2 difference, per the
/// frame encoder's stereo heuristic.
fn choose_stereo_mode(left: &[i64], right: &[i64]) -> ChannelMode {
    let mid: Vec<i64> = left.iter().zip(right).map(|(&l, &r)| (l + r) >> 1).collect();
    let side: Vec<i64> = left.iter().zip(right).map(|(&l, &r)| l - r).collect();

    let cost_l = channel_cost_estimate(left);
    let cost_r = channel_cost_estimate(right);
    let cost_m = channel_cost_estimate(&mid);
    let cost_s = channel_cost_estimate(&side);

    // `MidSide` is listed first so that `min_by_key`, which keeps the first
    // minimum it sees, favours it over `LeftSide`/`RightSide` on an exact
    // cost tie (e.g. identical left/right channels, where mid reduces to
    // left and side reduces to all zeros).
    let candidates = [
        (ChannelMode::MidSide, cost_m + cost_s),
        (ChannelMode::LeftSide, cost_l + cost_s),
        (ChannelMode::RightSide, cost_r + cost_s),
        (ChannelMode::LeftRight, cost_l + cost_r),
    ];

    candidates
        .into_iter()
        .min_by_key(|&(_, cost)| cost)
        .map(|(mode, _)| mode)
        .unwrap_or(ChannelMode::LeftRight)
}

/// Applies the chosen decorrelation to `left`/`right` in place, returning
/// the two buffers to encode as subframes together with their `obits`.
fn apply_stereo_mode(mode: ChannelMode, left: &[i64], right: &[i64], bps: u32) -> ((Vec<i64>, u32), (Vec<i64>, u32)) {
    match mode {
        ChannelMode::LeftRight | ChannelMode::NotStereo => ((left.to_vec(), bps), (right.to_vec(), bps)),
        ChannelMode::LeftSide => {
            let side: Vec<i64> = left.iter().zip(right).map(|(&l, &r)| l - r).collect();
            ((left.to_vec(), bps), (side, bps + 1))
        }
        ChannelMode::RightSide => {
            let side: Vec<i64> = left.iter().zip(right).map(|(&l, &r)| l - r).collect();
            ((side, bps + 1), (right.to_vec(), bps))
        }
        ChannelMode::MidSide => {
            let mid: Vec<i64> = left.iter().zip(right).map(|(&l, &r)| (l + r) >> 1).collect();
            let side: Vec<i64> = left.iter().zip(right).map(|(&l, &r)| l - r).collect();
            ((mid, bps), (side, bps + 1))
        }
    }
}

fn block_size_code(block_size: u16) -> (u32, Option<(u32, u32)>) {
    let standard = match block_size {
        192 => 1,
        576 => 2,
        1152 => 3,
        2304 => 4,
        4608 => 5,
        256 => 8,
        512 => 9,
        1024 => 10,
        2048 => 11,
        4096 => 12,
        8192 => 13,
        16384 => 14,
        32768 => 15,
        _ => 0,
    };
    if standard != 0 {
        return (standard, None);
    }
    if block_size >= 1 && block_size <= 256 {
        (6, Some((8, (block_size - 1) as u32)))
    } else {
        (7, Some((16, (block_size - 1) as u32)))
    }
}

fn sample_rate_code(sample_rate: u32) -> (u32, Option<(u32, u32)>) {
    let standard = match sample_rate {
        88_200 => 1,
        176_400 => 2,
        192_000 => 3,
        8_000 => 4,
        16_000 => 5,
        22_050 => 6,
        24_000 => 7,
        32_000 => 8,
        44_100 => 9,
        48_000 => 10,
        96_000 => 11,
        _ => 0,
    };
    if standard != 0 {
        return (standard, None);
    }
    if sample_rate % 1_000 == 0 && sample_rate / 1_000 <= 255 {
        (12, Some((8, sample_rate / 1_000)))
    } else if sample_rate <= 65_535 {
        (13, Some((16, sample_rate)))
    } else if sample_rate % 10 == 0 && sample_rate / 10 <= 65_535 {
        (14, Some((16, sample_rate / 10)))
    } else {
        (0, None)
    }
}

fn bps_code(bits_per_sample: u32) -> u32 {
    match bits_per_sample {
        8 => 0b001,
        16 => 0b100,
        _ => 0b000,
    }
}

/// Encodes `value` the way FLAC frame/sample numbers are coded: a
/// UTF-8-like variable-length scheme extended to cover 36-bit values.
fn write_utf8(writer: &mut BitWriter, value: u64) {
    if value < 0x80 {
        writer.write_bits(8, value as u32);
        return;
    }

    let (lead_mask, payload_bits): (u8, u32) = if value < 0x800 {
        (0xC0, 6)
    } else if value < 0x1_0000 {
        (0xE0, 12)
    } else if value < 0x20_0000 {
        (0xF0, 18)
    } else if value < 0x400_0000 {
        (0xF8, 24)
    } else if value < 0x8000_0000 {
        (0xFC, 30)
    } else {
        (0xFE, 36)
    };

    let continuation_bytes = payload_bits / 6;
    if lead_mask == 0xFE {
        writer.write_bits(8, 0xFE);
    } else {
        let lead_payload = (value >> (continuation_bytes * 6)) as u32;
        writer.write_bits(8, lead_mask as u32 | lead_payload);
    }

    for i in (0..continuation_bytes).rev() {
        let byte = 0x80 | ((value >> (i * 6)) & 0x3F) as u32;
        writer.write_bits(8, byte);
    }
}

/// Encodes one block of already-deinterleaved channel sample buffers into a
/// complete FLAC frame (header, subframes, CRC-16 footer).
///
/// `channels` holds one buffer per channel, all of the same length (the
/// block size). `frame_number` is the zero-based index of this frame.
pub fn encode(
    channels: &[Vec<i64>],
    config: &ResolvedConfig,
    frame_number: u64,
    max_frame_size: usize,
) -> FlacResult<Vec<u8>> {
    let block_size = channels[0].len() as u16;
    let bps = config.bits_per_sample;

    let (mode, subframe_inputs): (ChannelMode, Vec<(Vec<i64>, u32)>) = if channels.len() == 2 {
        let stereo_ok = config.stereo_method == StereoMethod::Estimate && block_size > 32;
        let mode = if stereo_ok {
            choose_stereo_mode(&channels[0], &channels[1])
        } else {
            ChannelMode::LeftRight
        };
        let (a, b) = apply_stereo_mode(mode, &channels[0], &channels[1], bps);
        (mode, vec![a, b])
    } else {
        (
            ChannelMode::NotStereo,
            channels.iter().map(|c| (c.clone(), bps)).collect(),
        )
    };

    let mut subframes: Vec<SubframeState> = Vec::with_capacity(subframe_inputs.len());
    for (samples, obits) in &subframe_inputs {
        let params = EncodeParams {
            prediction_type: config.prediction_type,
            min_prediction_order: config.min_prediction_order,
            max_prediction_order: config.max_prediction_order,
            order_method: config.order_method,
            min_partition_order: config.min_partition_order,
            max_partition_order: config.max_partition_order,
            lpc_precision: crate::lpc::precision_for_block_size(block_size),
        };
        subframes.push(subframe::encode_channel(samples, *obits, &params));
    }

    let mut buf = vec![0u8; max_frame_size];
    let mut writer = BitWriter::new(&mut buf);
    write_frame(&mut writer, &subframes, mode, config, block_size, frame_number);

    if writer.is_eof() {
        log::warn!("frame {frame_number} overflowed its buffer, re-emitting as verbatim");
        return encode_verbatim_fallback(&subframe_inputs, config, block_size, frame_number, max_frame_size);
    }

    Ok(writer.bytes().to_vec())
}

fn write_frame(
    writer: &mut BitWriter,
    subframes: &[SubframeState],
    mode: ChannelMode,
    config: &ResolvedConfig,
    block_size: u16,
    frame_number: u64,
) {
    let (bs_code, bs_ext) = block_size_code(block_size);
    let (sr_code, sr_ext) = sample_rate_code(config.sample_rate);

    writer.write_bits(14, 0b11111111111110);
    writer.write_bits(1, 0); // reserved
    writer.write_bits(1, 0); // blocking strategy: fixed (variable-block-size unsupported)
    writer.write_bits(4, bs_code);
    writer.write_bits(4, sr_code);
    writer.write_bits(4, mode.wire_code(subframes.len() as u32));
    writer.write_bits(3, bps_code(config.bits_per_sample));
    writer.write_bits(1, 0); // reserved

    write_utf8(writer, frame_number);

    if let Some((bits, value)) = bs_ext {
        writer.write_bits(bits, value);
    }
    if let Some((bits, value)) = sr_ext {
        writer.write_bits(bits, value);
    }

    let header_crc = crc::crc8(writer.bytes());
    writer.write_bits(8, header_crc as u32);

    for state in subframes {
        writer.write_bits(1, 0); // reserved
        writer.write_bits(6, state.type_code as u32);
        writer.write_bits(1, 0); // wasted-bits-per-sample flag: unsupported
        subframe::write(writer, state, block_size);
    }

    writer.flush();
    let frame_crc = crc::crc16(writer.bytes());
    writer.write_bits(16, frame_crc as u32);
}

fn encode_verbatim_fallback(
    subframe_inputs: &[(Vec<i64>, u32)],
    config: &ResolvedConfig,
    block_size: u16,
    frame_number: u64,
    max_frame_size: usize,
) -> FlacResult<Vec<u8>> {
    let verbatim: Vec<SubframeState> = subframe_inputs
        .iter()
        .map(|(samples, obits)| SubframeState {
            obits: *obits,
            samples: samples.clone(),
            residual: Vec::new(),
            subframe_type: subframe::SubframeType::Verbatim,
            type_code: 1,
            order: 0,
            coefs: Vec::new(),
            shift: 0,
            precision: 0,
            rice: rice::RiceContext { porder: 0, params: Vec::new(), esc_bps: Vec::new() },
            cost_bits: samples.len() as u64 * *obits as u64,
        })
        .collect();

    let mut buf = vec![0u8; max_frame_size];
    let mut writer = BitWriter::new(&mut buf);
    let mode = if verbatim.len() == 2 { ChannelMode::LeftRight } else { ChannelMode::NotStereo };
    write_frame(&mut writer, &verbatim, mode, config, block_size, frame_number);

    if writer.is_eof() {
        return Err(FlacError::BufferOverflow);
    }

    Ok(writer.bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_config() -> ResolvedConfig {
        ResolvedConfig {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            total_samples: 0,
            block_size: 4096,
            prediction_type: crate::config::PredictionType::Fixed,
            min_prediction_order: 1,
            max_prediction_order: 4,
            order_method: subframe::OrderMethod::Search,
            min_partition_order: 0,
            max_partition_order: 6,
            stereo_method: StereoMethod::Estimate,
            padding_size: 0,
            variable_block_size: false,
            subset: true,
        }
    }

    #[test]
    fn utf8_round_trips_small_and_large_values() {
        for &value in &[0u64, 1, 79, 127, 128, 300, 70_000, 5_000_000, 1 << 34] {
            let mut buf = vec![0u8; 16];
            let mut writer = BitWriter::new(&mut buf);
            write_utf8(&mut writer, value);
            writer.flush();
            assert!(!writer.is_eof());
        }
    }

    #[test]
    fn mono_silence_produces_a_single_constant_subframe() {
        let config = basic_config();
        let channels = vec![vec![0i64; 4096]];
        let frame = encode(&channels, &config, 0, 1 << 20).unwrap();
        assert_eq!(&frame[0..2], &[0xffu8, 0xf8]);
    }

    #[test]
    fn stereo_identical_channels_prefers_mid_side() {
        let samples: Vec<i64> = (0..4096).map(|i| (1000.0 * (i as f64 * 0.01).sin()) as i64).collect();
        let mode = choose_stereo_mode(&samples, &samples);
        assert_eq!(mode, ChannelMode::MidSide);
    }

    #[test]
    fn short_stereo_block_skips_decorrelation() {
        let left: Vec<i64> = (0..32).collect();
        let right: Vec<i64> = (0..32).map(|i| 31 - i).collect();
        let mut config = basic_config();
        config.channels = 2;
        let frame = encode(&[left, right], &config, 0, 1 << 16).unwrap();
        assert!(!frame.is_empty());
    }

    #[test]
    fn block_size_code_table_matches_standard_values() {
        assert_eq!(block_size_code(4096), (12, None));
        assert_eq!(block_size_code(17).0, 6);
        assert_eq!(block_size_code(40000).0, 7);
    }

    #[test]
    fn sample_rate_code_table_matches_standard_values() {
        assert_eq!(sample_rate_code(44_100), (9, None));
        assert_eq!(sample_rate_code(12_345).0, 13);
    }
}
