//! Line framing for the control socket.
//!
//! ```text
//! {"type":"tab_switch","tab_id":"@2"}\n
//! {"type":"terminal_input","session_id":"%1","data":"bHMK"}\n
//! ```
//!
//! Reads arrive in arbitrary chunks; [`LineDecoder`] accumulates bytes and
//! yields complete lines. A trailing `\r` is stripped and blank
//! (whitespace-only) lines are dropped.

/// Maximum size of an unterminated line (16 MB).
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

/// Error from [`LineDecoder::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTooLong {
    /// Bytes that were discarded.
    pub discarded: usize,
}

impl std::fmt::Display for LineTooLong {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Line exceeds {MAX_LINE_SIZE} bytes, discarded {} bytes",
            self.discarded
        )
    }
}

impl std::error::Error for LineTooLong {}

/// Incremental newline splitter.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Create a decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and extract every complete, non-blank line (without
    /// `\n` or `\r\n`).
    ///
    /// An unterminated tail is kept for the next call. If the tail grows
    /// past [`MAX_LINE_SIZE`] it is discarded and an error returned; the
    /// decoder stays usable.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, LineTooLong> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();

        let mut start = 0;
        while let Some(pos) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let mut line = &self.buf[start..start + pos];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line.to_vec());
            }
            start += pos + 1;
        }
        self.buf.drain(..start);

        if self.buf.len() > MAX_LINE_SIZE {
            let discarded = self.buf.len();
            self.buf.clear();
            return Err(LineTooLong { discarded });
        }
        Ok(lines)
    }

    /// Bytes buffered waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_multiple_lines_in_one_chunk() {
        let mut dec = LineDecoder::new();
        let lines = dec.feed(b"{\"a\":1}\n{\"b\":2}\n").unwrap();
        assert_eq!(lines, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
        assert_eq!(dec.pending(), 0);
    }

    #[test]
    fn test_reassembles_line_across_chunks() {
        let mut dec = LineDecoder::new();
        assert!(dec.feed(b"{\"type\":").unwrap().is_empty());
        assert!(dec.feed(b"\"tab_create\"").unwrap().is_empty());
        assert_eq!(dec.pending(), 20);
        let lines = dec.feed(b"}\n{\"x\"").unwrap();
        assert_eq!(lines, vec![b"{\"type\":\"tab_create\"}".to_vec()]);
        assert_eq!(dec.pending(), 4);
    }

    #[test]
    fn test_blank_lines_are_discarded() {
        let mut dec = LineDecoder::new();
        let lines = dec.feed(b"\n  \n\r\nx\n\n").unwrap();
        assert_eq!(lines, vec![b"x".to_vec()]);
    }

    #[test]
    fn test_crlf_terminated_lines_lose_the_cr() {
        let mut dec = LineDecoder::new();
        let lines = dec.feed(b"{\"type\":\"tab_create\"}\r\nraw\rmid\n").unwrap();
        assert_eq!(
            lines,
            vec![b"{\"type\":\"tab_create\"}".to_vec(), b"raw\rmid".to_vec()]
        );

        // CR and LF split across chunks.
        assert!(dec.feed(b"x\r").unwrap().is_empty());
        assert_eq!(dec.feed(b"\n").unwrap(), vec![b"x".to_vec()]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut dec = LineDecoder::new();
        let mut out = Vec::new();
        for b in b"one\ntwo\n" {
            out.extend(dec.feed(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(out, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_oversized_tail_is_discarded_and_decoder_recovers() {
        let mut dec = LineDecoder::new();
        let big = vec![b'x'; MAX_LINE_SIZE + 1];
        let err = dec.feed(&big).unwrap_err();
        assert_eq!(err.discarded, MAX_LINE_SIZE + 1);
        assert_eq!(dec.pending(), 0);
        assert_eq!(dec.feed(b"ok\n").unwrap(), vec![b"ok".to_vec()]);
    }
}
