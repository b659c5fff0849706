//! Line framing for the microcontroller text protocol.
//!
//! Bytes are buffered until a newline arrives. Each complete line is cleaned
//! of control bytes and stray non-ASCII, then split wherever a known message
//! prefix starts, so `GSR_CONDUCTANCE:7.34GSR_CONDUCTANCE:8.1` yields two
//! frames.

use std::collections::VecDeque;
use tracing::{debug, warn};

/// Non-ASCII glyphs the device uses in status and LCD text.
pub const ALLOWED_GLYPHS: [char; 7] = ['µ', 'μ', '°', '✓', '✗', '█', '░'];

/// Default upper bound on a buffered line without terminator.
pub const DEFAULT_MAX_LINE: usize = 512;

/// Splits a byte stream into cleaned text frames.
#[derive(Debug)]
pub struct Framer {
    prefixes: &'static [&'static str],
    max_line: usize,
    partial: Vec<u8>,
    ready: VecDeque<String>,
    /// Lines dropped because of decoding failures or overflow
    dropped: u64,
}

impl Framer {
    /// Create a framer that splits on the given message prefixes.
    pub fn new(prefixes: &'static [&'static str]) -> Self {
        Self::with_max_line(prefixes, DEFAULT_MAX_LINE)
    }

    pub fn with_max_line(prefixes: &'static [&'static str], max_line: usize) -> Self {
        Self {
            prefixes,
            max_line: max_line.max(16),
            partial: Vec::new(),
            ready: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Append freshly read bytes. Complete lines become available from
    /// [`Framer::next_frame`]; a trailing partial line stays buffered.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.partial);
                self.finish_line(&line);
            } else if self.partial.len() >= self.max_line {
                warn!(
                    len = self.partial.len(),
                    "Discarding unterminated line over length limit"
                );
                self.partial.clear();
                self.dropped += 1;
            } else {
                self.partial.push(byte);
            }
        }
    }

    /// Take the next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Drain all frames completed so far.
    pub fn drain(&mut self) -> impl Iterator<Item = String> + '_ {
        self.ready.drain(..)
    }

    /// Forget any partial line and pending frames (used after reconnecting).
    pub fn reset(&mut self) {
        self.partial.clear();
        self.ready.clear();
    }

    /// Whether bytes of an unterminated line are buffered.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    pub fn dropped_lines(&self) -> u64 {
        self.dropped
    }

    fn finish_line(&mut self, raw: &[u8]) {
        // Strip NUL, CR and other C0/DEL control bytes before decoding.
        let stripped: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|b| !(b.is_ascii_control()))
            .collect();

        let text = match String::from_utf8(stripped) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Dropping line that is not valid UTF-8");
                self.dropped += 1;
                return;
            }
        };

        let cleaned = clean_text(&text);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return;
        }

        let frames = split_on_prefixes(cleaned, self.prefixes);
        if frames.len() > 1 {
            debug!(count = frames.len(), "Split concatenated frames");
        }
        self.ready.extend(frames);
    }
}

/// Keep printable ASCII plus the allow-listed glyphs.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| (' '..='~').contains(c) || ALLOWED_GLYPHS.contains(c))
        .collect()
}

/// Split a cleaned line at every position where a known prefix begins.
///
/// Text before the first prefix is kept as its own fragment so the router can
/// report it as unknown.
pub fn split_on_prefixes(line: &str, prefixes: &[&str]) -> Vec<String> {
    let mut starts: Vec<usize> = Vec::new();
    let mut pos = 0;

    while pos < line.len() {
        let rest = &line[pos..];
        // Longest match wins so BASELINE_PROGRESS: is never read as BASELINE
        let matched = prefixes
            .iter()
            .filter(|p| rest.starts_with(**p))
            .map(|p| p.len())
            .max();

        match matched {
            Some(len) => {
                starts.push(pos);
                pos += len;
            }
            None => {
                pos += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
    }

    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    let mut frames = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(line.len());
        let fragment = line[start..end].trim();
        if !fragment.is_empty() {
            frames.push(fragment.to_string());
        }
    }
    frames
}
