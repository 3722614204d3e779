// Claxon -- A FLAC encoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `rice` module partitions a residual into equal-length chunks and
//! finds the Rice parameter (or unencoded escape) that minimises the coded
//! size of each chunk.

use crate::bitwriter::BitWriter;

/// The parameter value reserved to mean "not Rice-coded, escape to raw PCM".
pub const ESCAPE_PARAMETER: u8 = 15;

/// The highest partition order this encoder will ever choose.
pub const MAX_PARTITION_ORDER: u8 = 8;

/// A chosen partitioning of one subframe's residual: how many partitions
/// (`2^porder`), and the Rice parameter (or escape width) used by each.
#[derive(Clone, Debug)]
pub struct RiceContext {
    pub porder: u8,
    /// Rice parameter per partition; `ESCAPE_PARAMETER` marks an escape.
    pub params: Vec<u8>,
    /// Bits-per-sample used for the raw escape coding of each partition.
    /// Only meaningful where the matching entry of `params` is the escape.
    pub esc_bps: Vec<u8>,
}

fn zigzag(v: i64) -> u64 {
    if v < 0 {
        ((-(v + 1)) as u64) * 2 + 1
    } else {
        (v as u64) * 2
    }
}

/// Exact coded cost, in bits, of `residuals` under Rice parameter `k`.
fn rice_cost(residuals: &[i64], k: u32) -> u64 {
    let mut bits = 0u64;
    for &r in residuals {
        bits += (zigzag(r) >> k) + 1 + k as u64;
    }
    bits
}

/// Bits per sample needed to store every value in `residuals` as raw signed
/// two's complement (used for the parameter-15 escape).
fn escape_bps(residuals: &[i64]) -> u8 {
    let max_abs = residuals.iter().map(|&r| r.unsigned_abs()).max().unwrap_or(0);
    let magnitude_bits = 64 - max_abs.leading_zeros();
    (magnitude_bits + 1).max(1) as u8
}

/// Finds the Rice parameter (0..=14) minimising the coded size of
/// `residuals`, or falls back to the raw escape if that is cheaper.
///
/// Returns `(parameter, esc_bps, cost_bits)`. `esc_bps` is only meaningful
/// when `parameter == ESCAPE_PARAMETER`.
pub(crate) fn best_parameter(residuals: &[i64]) -> (u8, u8, u64) {
    let n = residuals.len() as u64;
    if n == 0 {
        return (0, 1, 0);
    }

    let sum_abs: u64 = residuals.iter().map(|&r| r.unsigned_abs()).sum();
    let mean = sum_abs as f64 / n as f64;
    let estimate = if mean < 1.0 { 0 } else { mean.log2().floor() as i32 };

    let mut best_k = 0u32;
    let mut best_cost = u64::MAX;
    let lo = (estimate - 1).max(0) as u32;
    let hi = (estimate + 1).min(14) as u32;
    for k in lo..=hi.max(lo) {
        let cost = rice_cost(residuals, k);
        if cost < best_cost {
            best_cost = cost;
            best_k = k;
        }
    }

    let esc_bps = escape_bps(residuals);
    let escape_cost = n * esc_bps as u64;

    if escape_cost < best_cost {
        (ESCAPE_PARAMETER, esc_bps, escape_cost)
    } else {
        (best_k as u8, 0, best_cost)
    }
}

/// Splits `residual` (length `block_size`, with the first `order` entries
/// being warm-up samples rather than coded residual) into `2^porder` equal
/// partitions and returns the slice bounds of each.
fn partition_bounds(block_size: u16, order: u8, porder: u8) -> Vec<(usize, usize)> {
    let n_partitions = 1usize << porder;
    let per_partition = block_size as usize >> porder;
    let mut bounds = Vec::with_capacity(n_partitions);
    let mut start = order as usize;
    for i in 0..n_partitions {
        let len = if i == 0 { per_partition - order as usize } else { per_partition };
        bounds.push((start, start + len));
        start += len;
    }
    bounds
}

/// True if `porder` is a legal partition order for this block/predictor
/// order: the block size must divide evenly, and every partition (including
/// the shortened first one) must be able to hold the warm-up samples.
fn is_valid_porder(block_size: u16, order: u8, porder: u8) -> bool {
    let divisor = 1u32 << porder;
    if block_size as u32 % divisor != 0 {
        return false;
    }
    let per_partition = block_size as u32 / divisor;
    per_partition > order as u32 || (order == 0 && per_partition > 0)
}

/// Cheap cost estimate, in bits, of Rice-coding `residuals` as a single
/// partition. Used by the stereo decorrelation picker, which only needs to
/// compare candidate channel assignments against each other.
pub(crate) fn estimate_cost(residuals: &[i64]) -> u64 {
    best_parameter(residuals).2
}

/// Exhaustively searches partition orders in `min_porder..=max_porder` and
/// returns the cheapest `RiceContext` together with its total cost in bits
/// (partition-order field, per-partition headers, and coded residuals).
pub fn choose_partitioning(
    residual: &[i64],
    order: u8,
    block_size: u16,
    min_porder: u8,
    max_porder: u8,
) -> (RiceContext, u64) {
    let mut best: Option<(RiceContext, u64)> = None;

    for porder in min_porder..=max_porder {
        if !is_valid_porder(block_size, order, porder) {
            continue;
        }

        let bounds = partition_bounds(block_size, order, porder);
        let mut params = Vec::with_capacity(bounds.len());
        let mut esc_bps = Vec::with_capacity(bounds.len());
        let mut cost = 4u64; // the 4-bit partition order field itself

        for (start, end) in &bounds {
            let (param, bps, part_cost) = best_parameter(&residual[*start..*end]);
            let header_bits = if param == ESCAPE_PARAMETER { 4 + 5 } else { 4 };
            cost += header_bits + part_cost;
            params.push(param);
            esc_bps.push(bps);
        }

        let candidate = RiceContext { porder, params, esc_bps };
        if best.as_ref().map_or(true, |(_, best_cost)| cost < *best_cost) {
            best = Some((candidate, cost));
        }
    }

    // `porder = 0` is always valid (a single partition covering everything
    // but the warm-up), so the search above is guaranteed to find something.
    best.expect("partition order search must find at least porder=0")
}

/// Emits `residual[order..]` (the warm-up samples are written separately by
/// the subframe encoder) using the partitioning recorded in `ctx`.
pub fn write_residual(writer: &mut BitWriter, residual: &[i64], order: u8, block_size: u16, ctx: &RiceContext) {
    writer.write_bits(2, 0); // residual coding method 0: 4-bit partitioned Rice
    writer.write_bits(4, ctx.porder as u32);

    let bounds = partition_bounds(block_size, order, ctx.porder);
    for (i, (start, end)) in bounds.iter().enumerate() {
        let param = ctx.params[i];
        writer.write_bits(4, param as u32);
        if param == ESCAPE_PARAMETER {
            let bps = ctx.esc_bps[i];
            writer.write_bits(5, bps as u32);
            for &r in &residual[*start..*end] {
                writer.write_bits_signed(bps as u32, r as i32);
            }
        } else {
            for &r in &residual[*start..*end] {
                writer.write_rice_signed(param as u32, r);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_matches_spec_mapping() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(2), 4);
    }

    #[test]
    fn all_zero_residual_picks_param_zero() {
        let residual = vec![0i64; 64];
        let (param, _, cost) = best_parameter(&residual);
        assert_eq!(param, 0);
        // Each zero residual costs exactly 1 bit (the unary stop bit).
        assert_eq!(cost, 64);
    }

    #[test]
    fn huge_outlier_prefers_escape() {
        // One enormous value among zeros is not Rice-friendly at any small k;
        // raw escape coding should win for such a partition.
        let mut residual = vec![0i64; 16];
        residual[0] = 1_000_000_000;
        let (param, bps, _) = best_parameter(&residual);
        assert_eq!(param, ESCAPE_PARAMETER);
        assert!(bps >= 31);
    }

    #[test]
    fn partition_bounds_cover_whole_block_exactly_once() {
        let block_size = 64u16;
        let order = 3u8;
        for porder in 0..=4u8 {
            let bounds = partition_bounds(block_size, order, porder);
            let mut covered = 0usize;
            let mut prev_end = order as usize;
            for (start, end) in &bounds {
                assert_eq!(*start, prev_end);
                covered += end - start;
                prev_end = *end;
            }
            assert_eq!(covered, block_size as usize - order as usize);
            assert_eq!(prev_end, block_size as usize);
        }
    }

    #[test]
    fn choose_partitioning_respects_order_constraint() {
        let block_size = 32u16;
        let order = 2u8;
        let residual: Vec<i64> = (0..block_size as i64).map(|i| i % 7 - 3).collect();
        let (ctx, cost) = choose_partitioning(&residual, order, block_size, 0, MAX_PARTITION_ORDER);
        assert!(is_valid_porder(block_size, order, ctx.porder));
        assert_eq!(ctx.params.len(), 1usize << ctx.porder);
        assert!(cost > 0);
    }

    #[test]
    fn write_residual_does_not_overflow_sized_buffer() {
        let block_size = 64u16;
        let order = 2u8;
        let residual: Vec<i64> = (0..block_size as i64).map(|i| (i * 3) % 11 - 5).collect();
        let (ctx, _) = choose_partitioning(&residual, order, block_size, 0, MAX_PARTITION_ORDER);

        let mut buf = vec![0u8; 1024];
        let mut writer = BitWriter::new(&mut buf);
        write_residual(&mut writer, &residual, order, block_size, &ctx);
        writer.flush();
        assert!(!writer.is_eof());
    }
}
