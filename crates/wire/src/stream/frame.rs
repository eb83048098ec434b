// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reassembles blank-line delimited frames from arbitrarily split chunks.

/// Frame delimiters, bare and carriage-return line endings.
const DELIMITERS: [&str; 2] = ["\n\n", "\r\n\r\n"];

/// Accumulates raw text and yields complete frames.
///
/// Frames are split on the earliest blank line in the buffer. Frames that
/// are empty or whitespace-only are never emitted.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: String,
    /// Undecoded tail of a multi-byte UTF-8 sequence split across chunks.
    pending: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.buf.push_str(chunk);
        self.drain()
    }

    /// Append raw bytes, decoding UTF-8 incrementally. Invalid sequences are
    /// replaced with U+FFFD; incomplete trailing sequences wait for the next chunk.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        if bytes.is_empty() {
            return Vec::new();
        }
        self.pending.extend_from_slice(bytes);
        let text = decode_utf8_prefix(&mut self.pending);
        self.push(&text)
    }

    /// End of stream: the remainder, if not blank, is the final frame.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.buf.push_str(&tail);
        }
        let rest = std::mem::take(&mut self.buf);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Bytes of text buffered awaiting a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len() + self.pending.len()
    }

    fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some((at, len)) = find_delimiter(&self.buf) {
            let frame: String = self.buf[..at].to_owned();
            self.buf.drain(..at + len);
            if !frame.trim().is_empty() {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Earliest delimiter in `text` as `(offset, length)`.
fn find_delimiter(text: &str) -> Option<(usize, usize)> {
    DELIMITERS
        .iter()
        .filter_map(|d| text.find(d).map(|at| (at, d.len())))
        .min_by_key(|&(at, _)| at)
}

/// Decode the longest valid UTF-8 prefix of `pending`, leaving an incomplete
/// trailing sequence in place.
fn decode_utf8_prefix(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    // Truncated sequence at the end: keep it for the next chunk.
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
