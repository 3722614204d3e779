// Claxon -- A FLAC encoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `fixed` module implements the four fixed polynomial predictors.

/// Highest fixed predictor order supported by the format.
pub const MAX_FIXED_ORDER: u8 = 4;

/// Computes the order-`order` fixed-predictor residual of `samples` into
/// `residual`. The first `order` entries of `residual` are left untouched;
/// those are the warm-up samples and are emitted verbatim by the caller.
pub fn compute_residual(samples: &[i64], order: u8, residual: &mut [i64]) {
    debug_assert_eq!(samples.len(), residual.len());
    debug_assert!(order <= MAX_FIXED_ORDER);

    match order {
        0 => {
            for i in 0..samples.len() {
                residual[i] = samples[i];
            }
        }
        1 => {
            for i in 1..samples.len() {
                residual[i] = samples[i] - samples[i - 1];
            }
        }
        2 => {
            for i in 2..samples.len() {
                residual[i] = samples[i] - 2 * samples[i - 1] + samples[i - 2];
            }
        }
        3 => {
            for i in 3..samples.len() {
                residual[i] = samples[i] - 3 * samples[i - 1] + 3 * samples[i - 2] - samples[i - 3];
            }
        }
        4 => {
            for i in 4..samples.len() {
                residual[i] = samples[i] - 4 * samples[i - 1] + 6 * samples[i - 2]
                    - 4 * samples[i - 3] + samples[i - 4];
            }
        }
        _ => unreachable!("fixed predictor order must be 0..=4"),
    }
}

/// Reconstructs `samples` in-place from a fixed-predictor residual: the first
/// `order` entries are assumed to already hold the warm-up samples, and
/// entries `order..` hold the residual on input, the restored samples on
/// output. Used only to verify encoder output in tests.
#[cfg(test)]
pub fn reconstruct(order: u8, samples: &mut [i64]) {
    match order {
        0 => {}
        1 => {
            for i in 1..samples.len() {
                samples[i] += samples[i - 1];
            }
        }
        2 => {
            for i in 2..samples.len() {
                samples[i] += 2 * samples[i - 1] - samples[i - 2];
            }
        }
        3 => {
            for i in 3..samples.len() {
                samples[i] += 3 * samples[i - 1] - 3 * samples[i - 2] + samples[i - 3];
            }
        }
        4 => {
            for i in 4..samples.len() {
                samples[i] += 4 * samples[i - 1] - 6 * samples[i - 2] + 4 * samples[i - 3]
                    - samples[i - 4];
            }
        }
        _ => unreachable!("fixed predictor order must be 0..=4"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_0_is_identity() {
        let samples = vec![1i64, 2, 3, 4, 5];
        let mut residual = vec![0i64; 5];
        compute_residual(&samples, 0, &mut residual);
        assert_eq!(residual, samples);
    }

    #[test]
    fn constant_signal_has_zero_residual_above_order_1() {
        let samples = vec![42i64; 8];
        let mut residual = vec![0i64; 8];
        for order in 1..=4 {
            compute_residual(&samples, order, &mut residual);
            for &r in &residual[order as usize..] {
                assert_eq!(r, 0);
            }
        }
    }

    #[test]
    fn round_trips_through_reconstruct() {
        let samples: Vec<i64> = (0..32).map(|i| ((i * 37) % 101) as i64 - 50).collect();
        for order in 0..=4 {
            let mut residual = samples.clone();
            compute_residual(&samples, order, &mut residual);

            let mut restored = samples[..order as usize].to_vec();
            restored.extend_from_slice(&residual[order as usize..]);
            reconstruct(order, &mut restored);

            assert_eq!(restored, samples, "order {order} failed to round-trip");
        }
    }
}
