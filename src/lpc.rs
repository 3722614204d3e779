// Claxon -- A FLAC encoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `lpc` module fits linear-predictive-coding coefficients to a block of
//! samples: Welch-windowed autocorrelation, Levinson-Durbin recursion, and
//! quantisation of the resulting coefficients to fixed-point integers.

/// Quantised LPC coefficients and the shift to apply to their integer
/// accumulated prediction before subtracting it from the sample.
#[derive(Clone, Debug)]
pub struct QuantizedLpc {
    pub coefs: Vec<i32>,
    pub shift: i32,
    pub precision: u8,
}

/// Applies a symmetric Welch window to `samples`, returning a new vector.
fn welch_window(samples: &[i64]) -> Vec<f64> {
    let n = samples.len();
    if n <= 1 {
        return samples.iter().map(|&s| s as f64).collect();
    }
    let n1 = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let t = (2.0 * i as f64 / n1) - 1.0;
            samples[i] as f64 * (1.0 - t * t)
        })
        .collect()
}

/// Computes `R[0..=max_order]`, the autocorrelation of `windowed`.
fn autocorrelate(windowed: &[f64], max_order: usize) -> Vec<f64> {
    let n = windowed.len();
    let mut r = vec![0.0f64; max_order + 1];
    for lag in 0..=max_order {
        let mut sum = 0.0;
        for i in lag..n {
            sum += windowed[i] * windowed[i - lag];
        }
        r[lag] = sum;
    }
    r
}

/// One order's worth of Levinson-Durbin output: the prediction coefficients
/// for that order, and the reflection coefficient that produced them.
pub struct LevinsonOrder {
    pub coefs: Vec<f64>,
    pub reflection: f64,
}

/// Runs the Levinson-Durbin recursion on autocorrelation `r`, returning the
/// coefficient vector and reflection coefficient for every order `1..=max_order`.
fn levinson_durbin(r: &[f64], max_order: usize) -> Vec<LevinsonOrder> {
    let mut error = r[0];
    let mut lpc = vec![0.0f64; max_order];
    let mut out = Vec::with_capacity(max_order);

    for i in 0..max_order {
        let mut acc = r[i + 1];
        for j in 0..i {
            acc -= lpc[j] * r[i - j];
        }
        let reflection = if error.abs() > 1e-9 { acc / error } else { 0.0 };

        lpc[i] = reflection;
        for j in 0..i / 2 {
            let tmp = lpc[j];
            lpc[j] = tmp - reflection * lpc[i - 1 - j];
            lpc[i - 1 - j] -= reflection * tmp;
        }
        if i % 2 == 1 {
            let mid = i / 2;
            lpc[mid] -= reflection * lpc[mid];
        }

        error *= 1.0 - reflection * reflection;

        out.push(LevinsonOrder { coefs: lpc[..=i].to_vec(), reflection });
    }

    out
}

/// Computes autocorrelation-derived LPC coefficients for every order
/// `1..=max_order`, via a Welch-windowed autocorrelation followed by
/// Levinson-Durbin.
pub fn analyse(samples: &[i64], max_order: usize) -> Vec<LevinsonOrder> {
    debug_assert!(max_order >= 1 && max_order <= 32);
    let windowed = welch_window(samples);
    let r = autocorrelate(&windowed, max_order);
    levinson_durbin(&r, max_order)
}

/// Picks the order `order_method == Estimate` would use: the largest
/// (1-based) order whose reflection coefficient magnitude exceeds 0.10,
/// defaulting to 1 if none qualifies.
pub fn estimate_order(orders: &[LevinsonOrder]) -> u8 {
    orders
        .iter()
        .enumerate()
        .filter(|(_, o)| o.reflection.abs() > 0.10)
        .map(|(i, _)| i as u8 + 1)
        .max()
        .unwrap_or(1)
}

/// Quantises floating-point coefficients to fixed-point integers with a
/// shared right-shift, via sigma-delta (running error) rounding to avoid
/// bias, and with the requested bit precision.
pub fn quantize(coefs: &[f64], precision: u8) -> QuantizedLpc {
    let qmax = (1i64 << (precision - 1)) - 1;
    let qmin = -(qmax + 1) + 1; // clamp matches spec: [-(2^(p-1)-1), 2^(p-1)-1]

    let cmax = coefs.iter().fold(0.0f64, |acc, &c| acc.max(c.abs()));

    if cmax * (1i64 << 15) as f64 < 1.0 {
        return QuantizedLpc { coefs: vec![0; coefs.len()], shift: 0, precision };
    }

    let mut shift: i32 = 15;
    while shift > 0 && cmax * (1i64 << shift) as f64 > qmax as f64 {
        shift -= 1;
    }

    // If even shift=0 overflows the precision, pre-scale the coefficients.
    let scale = if shift == 0 && cmax > qmax as f64 {
        qmax as f64 / cmax
    } else {
        1.0
    };

    let mut error = 0.0f64;
    let mut out = Vec::with_capacity(coefs.len());
    for &c in coefs {
        let scaled = c * scale * (1i64 << shift) as f64 + error;
        let mut q = scaled.round() as i64;
        q = q.clamp(qmin, qmax);
        error = scaled - q as f64;
        out.push(q as i32);
    }

    QuantizedLpc { coefs: out, shift, precision }
}

/// Chooses an LPC precision in `[7, 15]` derived from the block size, the
/// way `flake`-style encoders scale precision down for short blocks.
pub fn precision_for_block_size(block_size: u16) -> u8 {
    match block_size {
        0..=192 => 7,
        193..=384 => 8,
        385..=576 => 9,
        577..=1152 => 10,
        1153..=2304 => 11,
        2305..=4608 => 12,
        4609..=8192 => 13,
        8193..=16384 => 14,
        _ => 15,
    }
}

/// Integer LPC prediction residual: `r[t] = s[t] - (sum(c[i] * s[t-1-i]) >> shift)`.
pub fn compute_residual(samples: &[i64], coefs: &[i32], shift: i32, residual: &mut [i64]) {
    let order = coefs.len();
    debug_assert_eq!(samples.len(), residual.len());

    for t in order..samples.len() {
        let mut acc = 0i64;
        for (i, &c) in coefs.iter().enumerate() {
            acc += c as i64 * samples[t - 1 - i];
        }
        residual[t] = samples[t] - (acc >> shift);
    }
}

/// Reconstructs `samples[order..]` in-place from an LPC residual, assuming
/// `samples[..order]` already holds the warm-up. Used only by tests.
#[cfg(test)]
pub fn reconstruct(samples: &mut [i64], coefs: &[i32], shift: i32) {
    let order = coefs.len();
    for t in order..samples.len() {
        let mut acc = 0i64;
        for (i, &c) in coefs.iter().enumerate() {
            acc += c as i64 * samples[t - 1 - i];
        }
        samples[t] += acc >> shift;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantized_coefs_within_bounds() {
        let coefs = [1.9, -2.5, 0.3, -0.01];
        for precision in 5..=15u8 {
            let q = quantize(&coefs, precision);
            let qmax = (1i64 << (precision - 1)) - 1;
            for &c in &q.coefs {
                assert!((c as i64).abs() <= qmax, "precision {precision} coef {c} exceeds {qmax}");
            }
            assert!(q.shift >= 0 && q.shift <= 31);
        }
    }

    #[test]
    fn all_zero_coefficients_short_circuit() {
        let q = quantize(&[0.0, 0.0, 0.0], 12);
        assert!(q.coefs.iter().all(|&c| c == 0));
        assert_eq!(q.shift, 0);
    }

    #[test]
    fn sine_wave_predicts_well() {
        let samples: Vec<i64> = (0..256)
            .map(|i| (1000.0 * (i as f64 * 0.05).sin()) as i64)
            .collect();
        let orders = analyse(&samples, 8);
        let order = estimate_order(&orders);
        assert!(order >= 1 && order <= 8);

        let chosen = &orders[(order - 1) as usize];
        let q = quantize(&chosen.coefs, precision_for_block_size(256));

        let mut residual = samples.clone();
        compute_residual(&samples, &q.coefs, q.shift, &mut residual);

        let mut restored = samples[..q.coefs.len()].to_vec();
        restored.extend_from_slice(&residual[q.coefs.len()..]);
        reconstruct(&mut restored, &q.coefs, q.shift);

        assert_eq!(restored, samples);

        // A well-predicted sine wave should have much smaller residual
        // magnitude than the original signal past the warm-up.
        let orig_energy: i64 = samples[q.coefs.len()..].iter().map(|&s| s.abs()).sum();
        let res_energy: i64 = residual[q.coefs.len()..].iter().map(|&s| s.abs()).sum();
        assert!(res_energy < orig_energy);
    }

    #[test]
    fn precision_grows_with_block_size() {
        assert_eq!(precision_for_block_size(192), 7);
        assert_eq!(precision_for_block_size(4096), 12);
        assert_eq!(precision_for_block_size(32768), 15);
    }
}
