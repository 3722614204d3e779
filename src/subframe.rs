// Claxon -- A FLAC encoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `subframe` module chooses, per channel, between Constant, Verbatim,
//! Fixed and LPC encodings, and serialises the winner into the bitstream.

use crate::bitwriter::BitWriter;
use crate::fixed;
use crate::lpc;
use crate::rice::{self, RiceContext};

/// How a candidate prediction order is chosen for Fixed and LPC subframes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderMethod {
    /// Always use the configured maximum order.
    Max,
    /// LPC: use the Levinson-Durbin reflection-coefficient estimator.
    /// Fixed: use a fixed order-2 baseline.
    Estimate,
    TwoLevel,
    FourLevel,
    EightLevel,
    /// Evaluate every order and pick the cheapest.
    Search,
    /// Evaluate orders on a log2-spaced grid.
    Log,
}

/// Which of the four subframe encodings was chosen for a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubframeType {
    Constant,
    Verbatim,
    Fixed,
    Lpc,
}

/// Everything the frame encoder needs to emit one channel's subframe.
#[derive(Clone, Debug)]
pub struct SubframeState {
    pub obits: u32,
    pub samples: Vec<i64>,
    pub residual: Vec<i64>,
    pub subframe_type: SubframeType,
    pub type_code: u8,
    pub order: u8,
    pub coefs: Vec<i32>,
    pub shift: i32,
    pub precision: u8,
    pub rice: RiceContext,
    /// Total cost in bits of emitting this subframe, used by the stereo
    /// decorrelation picker to compare channel assignments.
    pub cost_bits: u64,
}

/// Orders `order_method` evaluates, out of the inclusive range `min..=max`.
fn candidate_orders(method: OrderMethod, min: u8, max: u8) -> Vec<u8> {
    if max < min {
        return vec![min];
    }
    match method {
        OrderMethod::Max => vec![max],
        OrderMethod::Estimate => vec![max], // refined by callers that can estimate
        OrderMethod::TwoLevel => spaced(min, max, 2),
        OrderMethod::FourLevel => spaced(min, max, 4),
        OrderMethod::EightLevel => spaced(min, max, 8),
        OrderMethod::Search => (min..=max).collect(),
        OrderMethod::Log => log_spaced(min, max),
    }
}

fn spaced(min: u8, max: u8, n: u8) -> Vec<u8> {
    let span = (max - min) as u32;
    let divisor = (n as u32).saturating_sub(1).max(1);
    let mut out: Vec<u8> = (0..n as u32)
        .map(|i| min + ((span * i) / divisor) as u8)
        .collect();
    out.push(max);
    out.sort_unstable();
    out.dedup();
    out
}

fn log_spaced(min: u8, max: u8) -> Vec<u8> {
    let mut out = Vec::new();
    let mut order = min as u32;
    let mut step = 1u32;
    while order <= max as u32 {
        out.push(order as u8);
        step *= 2;
        order += step;
    }
    if *out.last().unwrap_or(&min) != max {
        out.push(max);
    }
    out
}

/// Rice-codes `residual[order..]` with the best partitioning and returns
/// `(context, cost_bits)`; used both by the order picker and the final
/// emission so both agree on cost.
fn score_residual(residual: &[i64], order: u8, block_size: u16, min_porder: u8, max_porder: u8) -> (RiceContext, u64) {
    rice::choose_partitioning(residual, order, block_size, min_porder, max_porder)
}

fn encode_constant(samples: &[i64], obits: u32) -> SubframeState {
    SubframeState {
        obits,
        samples: samples.to_vec(),
        residual: Vec::new(),
        subframe_type: SubframeType::Constant,
        type_code: 0,
        order: 0,
        coefs: Vec::new(),
        shift: 0,
        precision: 0,
        rice: RiceContext { porder: 0, params: Vec::new(), esc_bps: Vec::new() },
        cost_bits: obits as u64,
    }
}

fn encode_verbatim(samples: &[i64], obits: u32) -> SubframeState {
    SubframeState {
        obits,
        samples: samples.to_vec(),
        residual: Vec::new(),
        subframe_type: SubframeType::Verbatim,
        type_code: 1,
        order: 0,
        coefs: Vec::new(),
        shift: 0,
        precision: 0,
        rice: RiceContext { porder: 0, params: Vec::new(), esc_bps: Vec::new() },
        cost_bits: samples.len() as u64 * obits as u64,
    }
}

fn encode_fixed_order(samples: &[i64], order: u8, obits: u32, min_porder: u8, max_porder: u8) -> SubframeState {
    let block_size = samples.len() as u16;
    let mut residual = samples.to_vec();
    fixed::compute_residual(samples, order, &mut residual);

    let (rice_ctx, residual_bits) = score_residual(&residual, order, block_size, min_porder, max_porder);
    let warmup_bits = order as u64 * obits as u64;

    SubframeState {
        obits,
        samples: samples.to_vec(),
        residual,
        subframe_type: SubframeType::Fixed,
        type_code: 8 | order,
        order,
        coefs: Vec::new(),
        shift: 0,
        precision: 0,
        rice: rice_ctx,
        cost_bits: warmup_bits + residual_bits,
    }
}

fn encode_lpc_order(
    samples: &[i64],
    coefs: &[f64],
    precision: u8,
    obits: u32,
    min_porder: u8,
    max_porder: u8,
) -> SubframeState {
    let block_size = samples.len() as u16;
    let order = coefs.len() as u8;
    let quantized = lpc::quantize(coefs, precision);

    let mut residual = samples.to_vec();
    lpc::compute_residual(samples, &quantized.coefs, quantized.shift, &mut residual);

    let (rice_ctx, residual_bits) = score_residual(&residual, order, block_size, min_porder, max_porder);
    let warmup_bits = order as u64 * obits as u64;
    // header: precision-1 (4 bits), shift (5 bits signed), order coefficients
    // of `precision` bits each.
    let header_bits = 4 + 5 + order as u64 * precision as u64;

    SubframeState {
        obits,
        samples: samples.to_vec(),
        residual,
        subframe_type: SubframeType::Lpc,
        type_code: 32 | (order - 1),
        order,
        coefs: quantized.coefs,
        shift: quantized.shift,
        precision,
        rice: rice_ctx,
        cost_bits: warmup_bits + header_bits + residual_bits,
    }
}

/// Parameters the residual encoder needs beyond the raw samples, mirroring
/// the relevant fields of a resolved `EncoderConfig`.
pub struct EncodeParams {
    pub prediction_type: crate::config::PredictionType,
    pub min_prediction_order: u8,
    pub max_prediction_order: u8,
    pub order_method: OrderMethod,
    pub min_partition_order: u8,
    pub max_partition_order: u8,
    pub lpc_precision: u8,
}

/// Chooses the cheapest of Constant / Verbatim / Fixed / LPC for `samples`,
/// honouring `params.prediction_type` and `params.order_method`.
pub fn encode_channel(samples: &[i64], obits: u32, params: &EncodeParams) -> SubframeState {
    if samples.iter().all(|&s| s == samples[0]) {
        return encode_constant(samples, obits);
    }

    use crate::config::PredictionType;

    let max_fixed = fixed::MAX_FIXED_ORDER.min(params.max_prediction_order.max(2));
    let fixed_orders: Vec<u8> = if params.order_method == OrderMethod::Estimate {
        vec![2.min(max_fixed)]
    } else {
        candidate_orders(params.order_method, 0, max_fixed)
    };

    let mut best = encode_verbatim(samples, obits);

    for &order in &fixed_orders {
        if (order as usize) >= samples.len() {
            continue;
        }
        let candidate = encode_fixed_order(
            samples,
            order,
            obits,
            params.min_partition_order,
            params.max_partition_order,
        );
        if candidate.cost_bits < best.cost_bits {
            best = candidate;
        }
    }

    if params.prediction_type == PredictionType::Levinson && samples.len() > params.max_prediction_order as usize {
        let max_order = params.max_prediction_order.max(1).min(32) as usize;
        let analysed = lpc::analyse(samples, max_order);

        let orders: Vec<u8> = if params.order_method == OrderMethod::Estimate {
            vec![lpc::estimate_order(&analysed).max(params.min_prediction_order.max(1))]
        } else {
            candidate_orders(
                params.order_method,
                params.min_prediction_order.max(1),
                max_order as u8,
            )
        };

        for order in orders {
            if order == 0 || order as usize > analysed.len() || order as usize >= samples.len() {
                continue;
            }
            let coefs = &analysed[(order - 1) as usize].coefs;
            let candidate = encode_lpc_order(
                samples,
                coefs,
                params.lpc_precision,
                obits,
                params.min_partition_order,
                params.max_partition_order,
            );
            if candidate.cost_bits < best.cost_bits {
                best = candidate;
            }
        }
    }

    best
}

/// Serialises `state`'s subframe body (the caller has already written the
/// leading zero bit, the 6-bit type code, and the wasted-bits flag).
pub fn write(writer: &mut BitWriter, state: &SubframeState, block_size: u16) {
    match state.subframe_type {
        SubframeType::Constant => {
            writer.write_bits_signed(state.obits, state.samples[0] as i32);
        }
        SubframeType::Verbatim => {
            for &s in &state.samples {
                writer.write_bits_signed(state.obits, s as i32);
            }
        }
        SubframeType::Fixed => {
            for &s in &state.samples[..state.order as usize] {
                writer.write_bits_signed(state.obits, s as i32);
            }
            rice::write_residual(writer, &state.residual, state.order, block_size, &state.rice);
        }
        SubframeType::Lpc => {
            for &s in &state.samples[..state.order as usize] {
                writer.write_bits_signed(state.obits, s as i32);
            }
            writer.write_bits(4, state.precision as u32 - 1);
            writer.write_bits_signed(5, state.shift);
            for &c in &state.coefs {
                writer.write_bits_signed(state.precision as u32, c);
            }
            rice::write_residual(writer, &state.residual, state.order, block_size, &state.rice);
        }
    }
}
