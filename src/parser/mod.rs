//! Incremental parser for the ANTML streamed tag protocol.
//!
//! Model output arrives as text chunks with arbitrary boundaries: a chunk may
//! split a tag in half or deliver one character at a time. [`StreamParser`]
//! carries unconsumed bytes across chunks and emits [`ParsedItem`]s as soon as
//! they are complete, never earlier. Recognized wrappers are `<thinking>`
//! (emitted verbatim) and `<function_calls>` (run through invocation
//! extraction against the tool registry); any other tag-like text passes
//! through byte-for-byte as plain text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tools::ToolRegistry;

mod invocation;

pub use invocation::{FunctionCall, ValidationErrorKind, ValidationFailure};

const THINKING: &str = "thinking";
const FUNCTION_CALLS: &str = "function_calls";

/// One structured item produced by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedItem {
    /// Plain text, passed through verbatim.
    Text { text: String },
    /// The body of one complete `<thinking>` wrapper, verbatim.
    Thinking { text: String },
    /// A validated tool invocation.
    FunctionCall(FunctionCall),
    /// An invocation that failed validation; siblings are unaffected.
    ValidationError(ValidationFailure),
}

/// Wrapper tag currently being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wrapper {
    Thinking,
    FunctionCalls,
}

impl Wrapper {
    fn closing_tag(self) -> &'static str {
        match self {
            Wrapper::Thinking => "</thinking>",
            Wrapper::FunctionCalls => "</function_calls>",
        }
    }
}

/// Incremental transducer from text chunks to [`ParsedItem`]s.
///
/// State lives for one streaming session: the pending byte buffer plus an
/// optional "currently collecting a wrapper" marker. No input byte is ever
/// dropped or duplicated regardless of chunk granularity.
pub struct StreamParser {
    registry: Arc<ToolRegistry>,
    buffer: String,
    /// Wrapper being collected, with its opening tag bytes so an
    /// unterminated wrapper can be flushed whole at end of session.
    collecting: Option<(Wrapper, String)>,
}

impl StreamParser {
    /// Create a parser validating invocations against `registry`.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            buffer: String::new(),
            collecting: None,
        }
    }

    /// Feed one chunk and drain every item that is complete so far.
    pub fn push(&mut self, chunk: &str) -> Vec<ParsedItem> {
        self.buffer.push_str(chunk);
        let mut items = Vec::new();

        loop {
            if let Some(wrapper) = self.collecting.as_ref().map(|(w, _)| *w) {
                // Inside a wrapper: wait for the complete closing tag before
                // emitting anything.
                let close = wrapper.closing_tag();
                let Some(idx) = self.buffer.find(close) else {
                    break;
                };
                let content: String = self.buffer.drain(..idx).collect();
                self.buffer.drain(..close.len());
                self.collecting = None;
                match wrapper {
                    Wrapper::Thinking => items.push(ParsedItem::Thinking { text: content }),
                    Wrapper::FunctionCalls => {
                        items.extend(invocation::extract_invocations(&content, &self.registry));
                    }
                }
                continue;
            }

            match self.buffer.find('<') {
                None => {
                    // No tag in sight: flush everything as text.
                    if !self.buffer.is_empty() {
                        items.push(ParsedItem::Text {
                            text: std::mem::take(&mut self.buffer),
                        });
                    }
                    break;
                }
                Some(0) => {}
                Some(pos) => {
                    let text: String = self.buffer.drain(..pos).collect();
                    items.push(ParsedItem::Text { text });
                }
            }

            // Buffer now starts with '<'. The tag may still be incomplete.
            let Some(gt) = self.buffer.find('>') else {
                break;
            };
            let name = self.buffer[1..gt]
                .split_whitespace()
                .next()
                .unwrap_or_default();
            match name {
                THINKING => {
                    let opening: String = self.buffer.drain(..=gt).collect();
                    self.collecting = Some((Wrapper::Thinking, opening));
                }
                FUNCTION_CALLS => {
                    let opening: String = self.buffer.drain(..=gt).collect();
                    self.collecting = Some((Wrapper::FunctionCalls, opening));
                }
                _ => {
                    // Not a recognized wrapper: the tag text itself is content.
                    let literal: String = self.buffer.drain(..=gt).collect();
                    items.push(ParsedItem::Text { text: literal });
                }
            }
        }

        items
    }

    /// End the session, flushing any still-buffered bytes as one final text
    /// item. An unterminated wrapper is surfaced whole, opening tag
    /// included, rather than silently dropped.
    pub fn finish(self) -> Vec<ParsedItem> {
        let mut residue = match self.collecting {
            Some((_, opening)) => opening,
            None => String::new(),
        };
        residue.push_str(&self.buffer);
        if residue.is_empty() {
            Vec::new()
        } else {
            vec![ParsedItem::Text { text: residue }]
        }
    }

    /// Whether the parser holds no pending input.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty() && self.collecting.is_none()
    }
}

impl std::fmt::Debug for StreamParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParser")
            .field("buffered_bytes", &self.buffer.len())
            .field("collecting", &self.collecting.as_ref().map(|(w, _)| *w))
            .finish()
    }
}
