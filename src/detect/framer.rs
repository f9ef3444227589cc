//! Splitting detector stdout into complete responses.
//!
//! Correlation never looks at raw bytes; it only sees whole responses
//! produced by a [`ResponseFramer`].

use crate::Framing;

pub trait ResponseFramer: Send {
    /// Feed bytes read from the detector and return every response they
    /// complete, oldest first.
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>>;

    /// Bytes held towards an incomplete response.
    fn pending(&self) -> usize;
}

pub fn framer_for(framing: Framing) -> Box<dyn ResponseFramer> {
    match framing {
        Framing::Bracket => Box::new(BracketFramer::default()),
        Framing::Line => Box::new(LineFramer::default()),
    }
}

/// A response is everything accumulated up to and including the first read
/// chunk that contains a `]` byte.
///
/// Known limitation: a `]` inside a string field completes the response
/// early, and bytes after the closing `]` in the same read are treated as
/// part of it. Use [`LineFramer`] with detectors that print one array per
/// line.
#[derive(Debug, Default)]
pub struct BracketFramer {
    buffer: Vec<u8>,
}

impl ResponseFramer for BracketFramer {
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        if chunk.contains(&b']') {
            vec![std::mem::take(&mut self.buffer)]
        } else {
            Vec::new()
        }
    }

    fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// One response per `\n`-terminated line; blank lines are skipped.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl ResponseFramer for LineFramer {
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut responses = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                responses.push(line);
            }
        }
        responses
    }

    fn pending(&self) -> usize {
        self.buffer.len()
    }
}
