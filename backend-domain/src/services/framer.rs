//! Event-stream framing.
//!
//! The wire format is a sequence of blocks of `field: value` lines, each
//! block terminated by a blank line. Lines starting with `:` are comments.
//! A field repeated inside one block has its values joined with `\n`.

use crate::entities::StreamEvent;
use crate::error::FramingError;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Complete events found in a buffer plus how much of it they used.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FrameOutput {
    pub events: Vec<StreamEvent>,
    /// Bytes from the start of the buffer that belong to finished blocks.
    pub consumed: usize,
    /// Blocks discarded because they could not be parsed.
    pub malformed: usize,
    /// Blocks discarded because they carried no payload (heartbeats, comments).
    pub empty: usize,
    /// Offset of the first line not yet terminated; rescanning starts here.
    resume_at: usize,
}

/// Splits `buffer` into complete events. Everything from `consumed` onward
/// is an unfinished block and must be kept for the next call.
pub fn split_events(buffer: &[u8]) -> FrameOutput {
    split_from(buffer, 0)
}

fn split_from(buffer: &[u8], scan_from: usize) -> FrameOutput {
    let mut out = FrameOutput::default();
    let mut block_start = 0;
    let mut line_start = scan_from.min(buffer.len());

    while let Some(offset) = buffer[line_start..].iter().position(|byte| *byte == b'\n') {
        let line_end = line_start + offset;
        let next_line = line_end + 1;
        if trim_cr(&buffer[line_start..line_end]).is_empty() {
            if line_start > block_start {
                match parse_block(&buffer[block_start..line_start]) {
                    Ok(Some(event)) => out.events.push(event),
                    Ok(None) => out.empty += 1,
                    Err(_) => out.malformed += 1,
                }
            }
            block_start = next_line;
        }
        line_start = next_line;
    }

    out.consumed = block_start;
    out.resume_at = line_start;
    out
}

/// Parses one block (without its terminating blank line).
///
/// Returns `Ok(None)` when the block has no payload.
pub fn parse_block(block: &[u8]) -> Result<Option<StreamEvent>, FramingError> {
    let text = std::str::from_utf8(block).map_err(|_| FramingError::InvalidUtf8)?;

    let mut event_type: Option<String> = None;
    let mut payload: Option<String> = None;
    let mut id: Option<String> = None;
    let mut retry_hint: Option<u64> = None;

    for raw_line in text.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field.trim() {
            "event-type" | "event" => append_field(&mut event_type, value),
            "payload" | "data" => append_field(&mut payload, value),
            "id" => append_field(&mut id, value),
            "retry-hint" | "retry" => {
                if let Ok(hint) = value.trim().parse::<u64>() {
                    retry_hint = Some(hint);
                }
            }
            _ => {}
        }
    }

    let payload = match payload {
        Some(payload) if !payload.trim().is_empty() => payload,
        _ => return Ok(None),
    };

    Ok(Some(StreamEvent {
        event_type: event_type.filter(|value| !value.trim().is_empty()),
        payload,
        id,
        retry_hint,
    }))
}

fn append_field(slot: &mut Option<String>, value: &str) {
    match slot {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(value);
        }
        None => *slot = Some(value.to_string()),
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Incremental framer owning the partial-frame buffer of one connection.
#[derive(Debug)]
pub struct EventFramer {
    buffer: Vec<u8>,
    scan_from: usize,
    max_frame_bytes: usize,
    /// Set after an oversized block was dropped; input is skipped up to the
    /// next blank line.
    discarding: bool,
    discard_at_line_start: bool,
}

impl Default for EventFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl EventFramer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scan_from: 0,
            max_frame_bytes: max_frame_bytes.max(1),
            discarding: false,
            discard_at_line_start: false,
        }
    }

    /// Appends a network chunk and returns every block it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> FrameOutput {
        self.buffer.extend_from_slice(chunk);
        if self.discarding && !self.skip_discarded() {
            return FrameOutput::default();
        }

        let mut out = split_from(&self.buffer, self.scan_from);
        self.buffer.drain(..out.consumed);
        self.scan_from = out.resume_at - out.consumed;

        if self.buffer.len() > self.max_frame_bytes {
            self.scan_from = 0;
            self.discarding = true;
            self.discard_at_line_start = false;
            self.skip_discarded();
            out.malformed += 1;
        }
        out
    }

    /// Drops buffered bytes of a discarded block. Returns true once its
    /// terminating blank line was consumed and normal framing can resume.
    fn skip_discarded(&mut self) -> bool {
        let mut line_start = 0;
        let mut fresh = self.discard_at_line_start;
        while let Some(offset) = self.buffer[line_start..].iter().position(|byte| *byte == b'\n') {
            let line_end = line_start + offset;
            if fresh && trim_cr(&self.buffer[line_start..line_end]).is_empty() {
                self.buffer.drain(..=line_end);
                self.discarding = false;
                return true;
            }
            fresh = true;
            line_start = line_end + 1;
        }

        // keep a lone `\r` so a CRLF blank line split across chunks is seen
        let keep_tail = fresh && trim_cr(&self.buffer[line_start..]).is_empty();
        if keep_tail {
            self.buffer.drain(..line_start);
        } else {
            self.buffer.clear();
        }
        self.discard_at_line_start = keep_tail;
        false
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any unfinished block, e.g. after the connection is lost.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan_from = 0;
        self.discarding = false;
        self.discard_at_line_start = false;
    }
}
