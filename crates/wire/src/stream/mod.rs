// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job stream reading: chunk reassembly, frame decoding, and the reader task.

pub mod decode;
pub mod frame;
pub mod reader;

pub use decode::{decode_frame, StreamFrame, DEFAULT_EVENT};
pub use frame::FrameAssembler;
pub use reader::JobStream;
