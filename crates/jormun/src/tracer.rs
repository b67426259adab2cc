//! Parse tracing infrastructure.
//!
//! Provides a trait-based tracing system for the front-end with zero-cost
//! abstraction: with [`NoopTracer`] every hook compiles away through
//! monomorphization, so production parses carry no overhead. The parser is
//! parameterized as `Parser<'a, T: ParseTracer>`; callers choose the tracer
//! at construction time.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (production default) |
//! | [`StderrTracer`] | Human-readable parse log to stderr |
//! | [`RecordingTracer`] | Event capture for tests and post-mortem |

/// A parse event, as captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A token was consumed.
    Token {
        /// Token type name.
        kind: &'static str,
        /// One-based source line of the token.
        line: u32,
    },
    /// A scope was opened.
    ScopeBegin {
        /// Scope type name.
        kind: &'static str,
        /// Function-nesting depth of the new scope.
        depth: u8,
    },
    /// A scope was closed.
    ScopeEnd {
        /// Scope type name.
        kind: &'static str,
    },
    /// A syntax error was attached to the VM.
    Error {
        /// The full error text.
        message: String,
    },
}

/// Hook points the parser reports into.
///
/// Every method has a no-op default body, so implementations opt into just
/// the events they care about.
pub trait ParseTracer {
    fn on_token(&mut self, _kind: &'static str, _line: u32) {}
    fn on_scope_begin(&mut self, _kind: &'static str, _depth: u8) {}
    fn on_scope_end(&mut self, _kind: &'static str) {}
    fn on_error(&mut self, _message: &str) {}
}

/// Zero-cost tracer; all hooks compile away.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl ParseTracer for NoopTracer {}

/// Logs parse events to stderr, one line per event.
#[derive(Debug, Default)]
pub struct StderrTracer {
    indent: usize,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParseTracer for StderrTracer {
    fn on_token(&mut self, kind: &'static str, line: u32) {
        eprintln!("{:indent$}token {kind} @{line}", "", indent = self.indent * 2);
    }

    fn on_scope_begin(&mut self, kind: &'static str, depth: u8) {
        eprintln!("{:indent$}scope {kind} (depth {depth}) {{", "", indent = self.indent * 2);
        self.indent += 1;
    }

    fn on_scope_end(&mut self, kind: &'static str) {
        self.indent = self.indent.saturating_sub(1);
        eprintln!("{:indent$}}} // {kind}", "", indent = self.indent * 2);
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("{:indent$}error: {message}", "", indent = self.indent * 2);
    }
}

/// Captures every event for inspection; used by parser tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<ParseEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParseTracer for RecordingTracer {
    fn on_token(&mut self, kind: &'static str, line: u32) {
        self.events.push(ParseEvent::Token { kind, line });
    }

    fn on_scope_begin(&mut self, kind: &'static str, depth: u8) {
        self.events.push(ParseEvent::ScopeBegin { kind, depth });
    }

    fn on_scope_end(&mut self, kind: &'static str) {
        self.events.push(ParseEvent::ScopeEnd { kind });
    }

    fn on_error(&mut self, message: &str) {
        self.events.push(ParseEvent::Error {
            message: message.to_string(),
        });
    }
}
