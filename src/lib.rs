// Claxon -- A FLAC encoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! `flac_encoder` turns interleaved integer PCM into a compliant FLAC
//! bitstream, one fixed-size block at a time.
//!
//! The typical lifecycle:
//!
//! ```no_run
//! use flac_encoder::{init, EncoderConfig};
//!
//! let config = EncoderConfig::new(2, 44_100, 16);
//! let (mut encoder, header) = init(config).unwrap();
//! // write `header`, then for every block of interleaved samples:
//! // let frame = encoder.encode_frame(&samples).unwrap();
//! // write `frame`
//! let digest = encoder.close();
//! # let _ = (header, digest);
//! ```
//!
//! This crate does not read files, parse command lines, or decode; see the
//! crate-level Non-goals in the design documentation for the full list of
//! external collaborators it expects to be driven by.

mod bitwriter;
mod config;
mod crc;
mod error;
mod fixed;
mod frame;
mod lpc;
mod md5;
mod metadata;
mod rice;
mod subframe;

pub use config::{EncoderConfig, PredictionType, StereoMethod};
pub use error::{FlacError, FlacResult};
pub use metadata::{write_streaminfo, StreamInfo};
pub use subframe::OrderMethod;

use config::ResolvedConfig;
use md5::Md5;

/// An in-progress encode of one FLAC stream.
///
/// Allocated once by [`init`] and reused for every block; `encode_frame`
/// does not allocate beyond what a single frame's output vector needs.
pub struct FlacEncoder {
    resolved: ResolvedConfig,
    md5: Md5,
    frame_number: u64,
    total_samples_encoded: u64,
    min_frame_size: u32,
    max_frame_size_seen: u32,
    max_frame_size_bound: usize,
}

/// Rough worst-case size, in bytes, of a single frame encoded verbatim:
/// enough headroom for the frame header, every channel's samples at
/// `bps + 1` bits, and the CRC footer.
fn verbatim_frame_bound(resolved: &ResolvedConfig) -> usize {
    let per_sample_bits = (resolved.bits_per_sample + 1) as usize;
    let body_bits = resolved.channels as usize * resolved.block_size as usize * per_sample_bits;
    body_bits / 8 + 64
}

/// Validates and resolves `config`, returning a fresh encoder together with
/// the header bytes (the `fLaC` marker, a placeholder STREAMINFO, a
/// vendor-only VORBIS_COMMENT, and optional PADDING) that must be written
/// to the output before any frame.
pub fn init(config: EncoderConfig) -> FlacResult<(FlacEncoder, Vec<u8>)> {
    let resolved = config::resolve(&config)?;

    if !resolved.subset {
        log::warn!("resolved configuration leaves the FLAC subset");
    }

    let streaminfo = StreamInfo {
        min_block_size: resolved.block_size,
        max_block_size: resolved.block_size,
        min_frame_size: 0,
        max_frame_size: 0,
        sample_rate: resolved.sample_rate,
        channels: resolved.channels as u8,
        bits_per_sample: resolved.bits_per_sample as u8,
        total_samples: resolved.total_samples,
        md5sum: [0u8; 16],
    };

    let vendor = format!("flac-encoder {}", env!("CARGO_PKG_VERSION"));
    let (header, _streaminfo_offset) = metadata::write_header(&streaminfo, &vendor, resolved.padding_size);

    let max_frame_size_bound = verbatim_frame_bound(&resolved);

    let encoder = FlacEncoder {
        resolved,
        md5: Md5::new(),
        frame_number: 0,
        total_samples_encoded: 0,
        min_frame_size: u32::MAX,
        max_frame_size_seen: 0,
        max_frame_size_bound,
    };

    Ok((encoder, header))
}

impl FlacEncoder {
    /// Encodes one block of interleaved samples, channel-major
    /// (L,R,L,R,... for stereo). The final block of a stream may be
    /// shorter than the configured block size; the emitted frame
    /// advertises its true size.
    pub fn encode_frame(&mut self, interleaved_samples: &[i64]) -> FlacResult<Vec<u8>> {
        let channels = self.resolved.channels as usize;
        debug_assert_eq!(interleaved_samples.len() % channels, 0);
        let block_size = interleaved_samples.len() / channels;

        md5::accumulate(&mut self.md5, interleaved_samples, self.resolved.bits_per_sample);

        let mut per_channel = vec![Vec::with_capacity(block_size); channels];
        for (i, &sample) in interleaved_samples.iter().enumerate() {
            per_channel[i % channels].push(sample);
        }

        let frame = frame::encode(&per_channel, &self.resolved, self.frame_number, self.max_frame_size_bound)?;

        self.frame_number += 1;
        self.total_samples_encoded += block_size as u64;
        self.min_frame_size = self.min_frame_size.min(frame.len() as u32);
        self.max_frame_size_seen = self.max_frame_size_seen.max(frame.len() as u32);

        Ok(frame)
    }

    /// A snapshot of the stream-wide parameters gathered so far. The MD5
    /// field is left zeroed: call [`FlacEncoder::close`] to obtain the
    /// final digest and splice it (together with the min/max frame sizes
    /// reported here) into the STREAMINFO this returns, then
    /// [`write_streaminfo`] it over the placeholder at the start of the
    /// stream.
    pub fn get_streaminfo(&self) -> StreamInfo {
        StreamInfo {
            min_block_size: self.resolved.block_size,
            max_block_size: self.resolved.block_size,
            min_frame_size: if self.min_frame_size == u32::MAX { 0 } else { self.min_frame_size },
            max_frame_size: self.max_frame_size_seen,
            sample_rate: self.resolved.sample_rate,
            channels: self.resolved.channels as u8,
            bits_per_sample: self.resolved.bits_per_sample as u8,
            total_samples: self.total_samples_encoded,
            md5sum: [0u8; 16],
        }
    }

    /// True if the resolved configuration stayed within the FLAC subset.
    pub fn is_subset(&self) -> bool {
        self.resolved.subset
    }

    /// Finalises the running MD5 hash and frees the encoder.
    pub fn close(self) -> [u8; 16] {
        self.md5.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_close_on_silence_round_trips_through_a_frame() {
        let config = EncoderConfig::new(1, 44_100, 16);
        let (mut encoder, header) = init(config).unwrap();
        assert_eq!(&header[0..4], b"fLaC");

        let samples = vec![0i64; 4096];
        let frame = encoder.encode_frame(&samples).unwrap();
        assert!(!frame.is_empty());

        let info = encoder.get_streaminfo();
        assert_eq!(info.total_samples, 4096);

        let digest = encoder.close();
        assert_eq!(digest.len(), 16);
    }

    #[test]
    fn stereo_frames_advance_the_frame_number() {
        let mut config = EncoderConfig::new(2, 44_100, 16);
        config.block_size = Some(256);
        let (mut encoder, _header) = init(config).unwrap();

        for block in 0..3 {
            let samples: Vec<i64> = (0..512).map(|i| (block * 512 + i) % 100).collect();
            encoder.encode_frame(&samples).unwrap();
        }

        assert_eq!(encoder.frame_number, 3);
    }

    #[test]
    fn short_final_block_is_accepted() {
        let mut config = EncoderConfig::new(1, 44_100, 16);
        config.block_size = Some(4096);
        let (mut encoder, _header) = init(config).unwrap();

        let full = vec![1i64; 4096];
        encoder.encode_frame(&full).unwrap();

        let short = vec![2i64; 17];
        let frame = encoder.encode_frame(&short).unwrap();
        assert!(!frame.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_before_any_bytes_are_emitted() {
        let config = EncoderConfig::new(1, 44_100, 24);
        assert!(init(config).is_err());
    }
}
