//! Partitioning of raw submissions into setup and loop phases.
//!
//! A submission is either a reserved directive token (`#resu`, `#paus`,
//! `#rest`) or a 12-character header followed by the program body. The
//! sixth header character is the debug level. The body is split at the
//! first top-level `while True:` into code run once (setup) and code run on
//! every cycle (loop).
//!
//! Partitioning never fails: malformed input degrades to "everything is
//! setup, nothing loops" or to an empty program.

mod split;

use std::time::Instant;

use serde::Serialize;

pub use split::{LoopSplit, VISUAL_PREFIX, dedent_once, filter_visual_lines, split_setup_loop};

/// Length of a directive token.
pub const DIRECTIVE_TOKEN_LEN: usize = 5;

/// Byte offset of the debug-level digit in the header.
pub const DEBUG_LEVEL_OFFSET: usize = 5;

/// Length of the submission header preceding the program body.
pub const HEADER_LEN: usize = 12;

/// Debug level used when the header is missing or unreadable.
pub const DEFAULT_DEBUG_LEVEL: u8 = 1;

/// Debug level that strips visual-output calls from the program.
pub const NON_VISUAL_DEBUG_LEVEL: u8 = 1;

/// Simulation directive carried by a submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// Not a directive: the submission is a program.
    #[default]
    None,
    /// Resume the physics simulation.
    Resume,
    /// Pause the physics simulation.
    Pause,
    /// Reset the simulation world and the visual state.
    Reset,
}

impl Directive {
    /// Detect a directive token at the start of `text`.
    pub fn detect(text: &str) -> Self {
        match text.get(..DIRECTIVE_TOKEN_LEN) {
            Some("#resu") => Self::Resume,
            Some("#paus") => Self::Pause,
            Some("#rest") => Self::Reset,
            _ => Self::None,
        }
    }

    /// The reserved token for this directive.
    pub fn token(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Resume => Some("#resu"),
            Self::Pause => Some("#paus"),
            Self::Reset => Some("#rest"),
        }
    }

    /// Whether this is an actual directive.
    pub fn is_some(self) -> bool {
        self != Self::None
    }
}

/// Outcome of partitioning a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionResult {
    /// Code executed once before the loop.
    pub setup_code: String,
    /// Body of the control loop, dedented by one level.
    pub loop_code: String,
    /// Line of the program body holding the first loop line.
    pub loop_first_line: usize,
    /// Directive, if the submission was one.
    pub directive: Directive,
    /// Debug level read from the header.
    pub debug_level: u8,
    /// False when the header was unreadable and defaults were applied.
    pub header_valid: bool,
}

impl PartitionResult {
    fn for_directive(directive: Directive) -> Self {
        Self {
            setup_code: String::new(),
            loop_code: String::new(),
            loop_first_line: loop_first_line("", false),
            directive,
            debug_level: DEFAULT_DEBUG_LEVEL,
            header_valid: true,
        }
    }

    /// Whether there is a loop body to run repeatedly.
    pub fn has_loop(&self) -> bool {
        !self.loop_code.is_empty()
    }

    /// Whether there is no code at all.
    pub fn is_empty(&self) -> bool {
        self.setup_code.is_empty() && self.loop_code.is_empty()
    }
}

/// A raw inbound submission.
#[derive(Debug, Clone)]
pub struct ProgramSubmission {
    /// Raw message text.
    pub text: String,
    /// When the message arrived.
    pub received_at: Instant,
}

impl ProgramSubmission {
    /// Wrap a freshly received message.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Instant::now(),
        }
    }

    /// Partition the submission.
    pub fn partition(&self) -> PartitionResult {
        partition(&self.text)
    }
}

/// Build a submission with the standard header for `body`.
pub fn with_header(body: &str, debug_level: u8) -> String {
    format!("#code{}#debug{}", debug_level % 10, body)
}

/// Partition a raw submission.
pub fn partition(raw: &str) -> PartitionResult {
    let directive = Directive::detect(raw);
    if directive.is_some() {
        return PartitionResult::for_directive(directive);
    }

    match parse_header(raw) {
        Some((debug_level, body)) => split(body, debug_level),
        None => PartitionResult {
            setup_code: String::new(),
            loop_code: String::new(),
            loop_first_line: loop_first_line("", false),
            directive: Directive::None,
            debug_level: DEFAULT_DEBUG_LEVEL,
            header_valid: false,
        },
    }
}

/// Split a program body for the given debug level.
///
/// Pure in `(text, debug_level)`.
pub fn split(text: &str, debug_level: u8) -> PartitionResult {
    let filtered = if debug_level == NON_VISUAL_DEBUG_LEVEL {
        filter_visual_lines(text)
    } else {
        text.to_string()
    };

    let split = split_setup_loop(&filtered).unwrap_or_else(|| LoopSplit {
        setup: filtered.clone(),
        body: String::new(),
        body_on_header: false,
    });

    PartitionResult {
        loop_first_line: loop_first_line(&split.setup, split.body_on_header),
        setup_code: split.setup,
        loop_code: split.body,
        directive: Directive::None,
        debug_level,
        header_valid: true,
    }
}

/// Line number of the first loop line, counting the setup code from 1.
///
/// The loop header takes the line after the setup code; a body written on
/// the header line starts there, otherwise on the next line.
pub fn loop_first_line(setup_code: &str, body_on_header: bool) -> usize {
    let header_line = setup_code.lines().count() + 1;
    if body_on_header { header_line } else { header_line + 1 }
}

/// Debug level and program body; `None` when the header is unreadable.
///
/// A header shorter than [`HEADER_LEN`] carries an empty body. A header
/// whose last byte falls inside a multi-byte character is unreadable.
fn parse_header(raw: &str) -> Option<(u8, &str)> {
    let digit = raw.get(DEBUG_LEVEL_OFFSET..DEBUG_LEVEL_OFFSET + 1)?;
    let debug_level = digit.parse::<u8>().ok()?;
    let body = if raw.len() <= HEADER_LEN { "" } else { raw.get(HEADER_LEN..)? };
    Some((debug_level, body))
}
