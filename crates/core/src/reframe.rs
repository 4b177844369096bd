//! Re-framing of raw model deltas into `text/event-stream` frames.
//!
//! Upstream deltas arrive with arbitrary boundaries. Each delta is split on `'\n'` and every line
//! becomes its own `data:` frame, so the client can render output as soon as it arrives. A hard
//! line break inside a delta is followed by a [`Frame::ParagraphBreak`] filler, which keeps the
//! blank-line structure visible to a markdown renderer that appends event data as it goes.
//!
//! Frames never span deltas. When a delta ends exactly on `'\n'` the trailing empty segment is
//! emitted straight away as an empty [`Frame::Line`] instead of being held back and merged with
//! the next delta's first segment. Clients see one extra empty event at that position.
//!
//! The adapter keeps no state between deltas, so it can be dropped at any point without cleanup.

use futures::stream::{self, Stream, StreamExt};

use crate::completion::DeltaChunk;

const PARAGRAPH_BREAK_WIRE: &str = "data:  \n";

/// One unit of the outbound event stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A single line of model output, without its newline. May be empty.
    Line(String),
    /// Blank filler emitted after every non-final line of a delta.
    ParagraphBreak,
}

impl Frame {
    /// Whether this is the blank filler that follows a line break.
    pub fn is_filler(&self) -> bool {
        matches!(self, Frame::ParagraphBreak)
    }

    /// Text carried by the frame. The filler carries a single space.
    pub fn payload(&self) -> &str {
        match self {
            Frame::Line(line) => line,
            Frame::ParagraphBreak => " ",
        }
    }

    /// Wire form of the frame.
    ///
    /// Lines are terminated by a blank line. The filler is a lone `data:` line with no blank line
    /// after it, so a conforming client folds it into the next event as a leading line break.
    pub fn encode(&self) -> String {
        match self {
            Frame::Line(line) => format!("data: {line}\n\n"),
            Frame::ParagraphBreak => PARAGRAPH_BREAK_WIRE.to_string(),
        }
    }
}

/// Frames produced by a single delta's text.
///
/// Absent or empty text produces nothing.
pub fn frames_for_chunk(text: Option<&str>) -> Vec<Frame> {
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        return Vec::new();
    };

    let mut segments = text.split('\n');
    // `split` always yields at least one segment for non-empty input.
    let mut current = segments.next().unwrap_or_default();
    let mut frames = Vec::new();
    for next in segments {
        frames.push(Frame::Line(current.to_string()));
        frames.push(Frame::ParagraphBreak);
        current = next;
    }
    frames.push(Frame::Line(current.to_string()));
    frames
}

/// Lift [`frames_for_chunk`] over a fallible delta stream.
///
/// Deltas are consumed strictly in order. An upstream error is passed through at its position;
/// the caller decides whether to keep polling afterwards.
pub fn reframe<S, E>(deltas: S) -> impl Stream<Item = Result<Frame, E>>
where
    S: Stream<Item = Result<DeltaChunk, E>>,
{
    deltas.flat_map(|item| {
        let frames: Vec<Result<Frame, E>> = match item {
            Ok(chunk) => frames_for_chunk(chunk.text.as_deref())
                .into_iter()
                .map(Ok)
                .collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(frames)
    })
}
