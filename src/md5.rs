// Claxon -- A FLAC encoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Fingerprints the decoded audio for the STREAMINFO block, via a thin
//! incremental wrapper around the `md5` crate.

/// Accumulates an MD5 digest incrementally, one `update` call at a time.
pub struct Md5 {
    context: md5::Context,
}

impl Md5 {
    pub fn new() -> Md5 {
        Md5 { context: md5::Context::new() }
    }

    /// Feeds raw bytes into the running hash.
    pub fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    /// Consumes the hasher and returns the 16-byte digest.
    pub fn finalize(self) -> [u8; 16] {
        self.context.compute().0
    }
}

impl Default for Md5 {
    fn default() -> Md5 {
        Md5::new()
    }
}

/// Feeds one block's worth of interleaved PCM `samples` into `md5`, each
/// serialised little-endian in `ceil(bits_per_sample / 8)` bytes, matching
/// the declared bit depth regardless of the `i64` storage width.
pub fn accumulate(md5: &mut Md5, samples: &[i64], bits_per_sample: u32) {
    let byte_width = ((bits_per_sample + 7) / 8) as usize;
    let mut buf = [0u8; 8];
    for &sample in samples {
        let bytes = (sample as i64).to_le_bytes();
        buf[..byte_width].copy_from_slice(&bytes[..byte_width]);
        md5.update(&buf[..byte_width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_hex(data: &[u8]) -> String {
        let mut md5 = Md5::new();
        md5.update(data);
        md5.finalize().iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn empty_input() {
        assert_eq!(digest_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn abc() {
        assert_eq!(digest_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn longer_message() {
        assert_eq!(
            digest_hex(b"The quick brown fox jumps over the lazy dog"),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn chunked_equals_single_call() {
        let data: Vec<u8> = (0u8..=255).cycle().take(4096).collect();

        let mut whole = Md5::new();
        whole.update(&data);
        let whole_digest = whole.finalize();

        let mut chunked = Md5::new();
        for chunk in data.chunks(13) {
            chunked.update(chunk);
        }
        let chunked_digest = chunked.finalize();

        assert_eq!(whole_digest, chunked_digest);
    }

    #[test]
    fn accumulate_matches_manual_byte_serialisation() {
        let samples = [0i64, -1, 1, 32767, -32768];

        let mut via_helper = Md5::new();
        accumulate(&mut via_helper, &samples, 16);

        let mut manual = Md5::new();
        for &s in &samples {
            manual.update(&(s as i16).to_le_bytes());
        }

        assert_eq!(via_helper.finalize(), manual.finalize());
    }

    #[test]
    fn accumulate_respects_eight_bit_width() {
        let samples = [0i64, -1, 127, -128];

        let mut via_helper = Md5::new();
        accumulate(&mut via_helper, &samples, 8);

        let mut manual = Md5::new();
        for &s in &samples {
            manual.update(&(s as i8).to_le_bytes());
        }

        assert_eq!(via_helper.finalize(), manual.finalize());
    }
}
