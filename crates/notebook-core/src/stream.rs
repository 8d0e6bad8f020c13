//! Streaming text merging.
//!
//! Process output (stdout/stderr) arrives in chunks that are appended to the last item of the
//! same mime. Two terminal control sequences are interpreted while appending so that progress
//! bars and spinners do not grow the buffer without bound:
//!
//! - `ESC [ A` (cursor up one line) drops the last line of what has been written so far,
//!   including the newline that precedes it. Bytes after the sequence are appended as-is.
//!   When there is no newline to drop, the sequence is kept verbatim.
//! - A chunk starting with a lone `\r` drops everything after the last newline of the buffer.
//!   A leading `\r\n` is an ordinary line ending.
//!
//! Merging is a small byte-level state machine. A control sequence split across two chunks is
//! recognized because the merger resumes from a partial sequence left at the buffer's end.

const ESC: u8 = 0x1b;
const LINE_FEED: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

/// Cursor-up-one-line control sequence.
pub const CURSOR_UP_ONE_LINE: &[u8] = b"\x1b[A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    /// Saw `ESC`.
    Escape,
    /// Saw `ESC [`.
    Csi,
}

struct StreamMerger<'a> {
    buffer: &'a mut Vec<u8>,
    /// Buffer length before the merge; truncating below it discards existing bytes.
    base: usize,
    state: State,
    compressed: bool,
}

impl<'a> StreamMerger<'a> {
    fn resume(buffer: &'a mut Vec<u8>) -> Self {
        let base = buffer.len();
        let state = if buffer.ends_with(&[ESC, b'[']) {
            buffer.truncate(buffer.len() - 2);
            State::Csi
        } else if buffer.ends_with(&[ESC]) {
            buffer.truncate(buffer.len() - 1);
            State::Escape
        } else {
            State::Text
        };
        Self {
            buffer,
            base,
            state,
            compressed: false,
        }
    }

    fn feed(&mut self, byte: u8) {
        self.state = match (self.state, byte) {
            (State::Text, ESC) => State::Escape,
            (State::Text, b) => {
                self.buffer.push(b);
                State::Text
            }
            (State::Escape, b'[') => State::Csi,
            (State::Escape, ESC) => {
                self.buffer.push(ESC);
                State::Escape
            }
            (State::Escape, b) => {
                self.buffer.extend_from_slice(&[ESC, b]);
                State::Text
            }
            (State::Csi, b'A') => {
                self.cursor_up();
                State::Text
            }
            (State::Csi, ESC) => {
                self.buffer.extend_from_slice(&[ESC, b'[']);
                State::Escape
            }
            (State::Csi, b) => {
                self.buffer.extend_from_slice(&[ESC, b'[', b]);
                State::Text
            }
        };
    }

    fn cursor_up(&mut self) {
        match self.buffer.iter().rposition(|&b| b == LINE_FEED) {
            Some(pos) => {
                self.buffer.truncate(pos);
                self.compressed |= pos < self.base;
            }
            None => self.buffer.extend_from_slice(CURSOR_UP_ONE_LINE),
        }
    }

    fn carriage_return(&mut self) {
        let keep = self
            .buffer
            .iter()
            .rposition(|&b| b == LINE_FEED)
            .map_or(0, |pos| pos + 1);
        if keep < self.buffer.len() {
            self.buffer.truncate(keep);
            self.compressed |= keep < self.base;
        }
    }

    fn flush_pending(&mut self) {
        match self.state {
            State::Text => {}
            State::Escape => self.buffer.push(ESC),
            State::Csi => self.buffer.extend_from_slice(&[ESC, b'[']),
        }
        self.state = State::Text;
    }

    fn finish(mut self) -> bool {
        self.flush_pending();
        self.compressed
    }
}

/// Append `incoming` to `buffer`, interpreting stream control sequences.
///
/// Returns `true` if bytes already present in `buffer` were discarded (the merge was a
/// compression rather than a plain append).
pub fn merge_stream(buffer: &mut Vec<u8>, incoming: &[u8]) -> bool {
    let mut merger = StreamMerger::resume(buffer);
    let mut bytes = incoming;

    if let [CARRIAGE_RETURN, rest @ ..] = incoming
        && rest.first() != Some(&LINE_FEED)
    {
        merger.flush_pending();
        merger.carriage_return();
        bytes = rest;
    }

    for &byte in bytes {
        merger.feed(byte);
    }
    merger.finish()
}
