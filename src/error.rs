// Claxon -- A FLAC encoding library in Rust
// Copyright (C) 2014-2015 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The `error` module defines the error and result types.

use thiserror::Error;

/// An error that prevents successful encoding of the FLAC stream.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FlacError {
    /// A configuration field is outside the range the FLAC format allows.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Reserved for an internal encoding failure mid-frame (e.g. a block
    /// size or residual pass with no valid encoding). The current frame
    /// encoder's code-selection and residual passes are total functions
    /// over any resolved configuration, so this variant is not constructed
    /// today; it stays part of the public error type so a future frame
    /// encoding path that isn't total can report through it without a
    /// breaking change.
    #[error("encoder could not process the frame: {0}")]
    EncoderInternal(&'static str),

    /// The bit writer ran out of room in its pre-sized buffer.
    ///
    /// The frame buffer is sized to the verbatim worst case, so this can only
    /// happen as a result of a bug elsewhere in the encoder.
    #[error("bit writer buffer overflowed")]
    BufferOverflow,
}

/// Either `T` on success, or a `FlacError` on failure.
pub type FlacResult<T> = Result<T, FlacError>;
