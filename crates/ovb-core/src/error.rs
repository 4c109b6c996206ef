use serde::Serialize;

/// Line/column position of a statement or argument expression, as reported
/// by the external compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One entry of a captured call-stack trace, innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceFrame {
    pub module: String,
    pub proc: String,
    pub statement: usize,
}

impl std::fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} (statement {})", self.module, self.proc, self.statement)
    }
}

/// Legacy numeric error codes. The classic codes keep their historical
/// numbers; codes without a historical equivalent live above 500.
pub mod codes {
    pub const RETURN_WITHOUT_GOSUB: u32 = 3;
    pub const INVALID_PROCEDURE_CALL: u32 = 5;
    pub const OVERFLOW: u32 = 6;
    pub const SUBSCRIPT_OUT_OF_RANGE: u32 = 9;
    pub const DIVISION_BY_ZERO: u32 = 11;
    pub const TYPE_MISMATCH: u32 = 13;
    pub const RESUME_WITHOUT_ERROR: u32 = 20;
    pub const INTERNAL_ERROR: u32 = 51;
    pub const OBJECT_VARIABLE_NOT_SET: u32 = 91;
    pub const INVALID_USE_OF_NULL: u32 = 94;
    pub const MEMBER_NOT_SUPPORTED: u32 = 438;
    pub const NAMED_ARGUMENT_NOT_FOUND: u32 = 448;
    pub const ARGUMENT_NOT_OPTIONAL: u32 = 449;
    pub const WRONG_NUMBER_OF_ARGUMENTS: u32 = 450;
    pub const NO_MATCHING_RULE: u32 = 513;

    pub fn describe(code: u32) -> &'static str {
        match code {
            RETURN_WITHOUT_GOSUB => "return without gosub",
            INVALID_PROCEDURE_CALL => "invalid procedure call",
            OVERFLOW => "overflow",
            SUBSCRIPT_OUT_OF_RANGE => "subscript out of range",
            DIVISION_BY_ZERO => "division by zero",
            TYPE_MISMATCH => "type mismatch",
            RESUME_WITHOUT_ERROR => "resume without error",
            INTERNAL_ERROR => "internal error",
            OBJECT_VARIABLE_NOT_SET => "object variable not set",
            INVALID_USE_OF_NULL => "invalid use of null",
            MEMBER_NOT_SUPPORTED => "object doesn't support this property or method",
            NAMED_ARGUMENT_NOT_FOUND => "named argument not found",
            ARGUMENT_NOT_OPTIONAL => "argument not optional",
            WRONG_NUMBER_OF_ARGUMENTS => "wrong number of arguments",
            NO_MATCHING_RULE => "no matching rule",
            _ => "application-defined error",
        }
    }
}

/// A failure surfaced to the engine. The source location and stack trace are
/// captured once, when the error first becomes visible, and preserved on
/// every further propagation step.
#[derive(Debug, Clone, thiserror::Error)]
#[error("error {code}: {message}")]
pub struct RuntimeError {
    pub code: u32,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub trace: Option<Vec<TraceFrame>>,
    pub cause: Option<Box<RuntimeError>>,
}

impl RuntimeError {
    pub fn new(code: u32) -> Self {
        Self {
            code,
            message: codes::describe(code).to_string(),
            location: None,
            trace: None,
            cause: None,
        }
    }

    pub fn with_message(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
            trace: None,
            cause: None,
        }
    }

    pub fn caused_by(mut self, cause: RuntimeError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Sets the source location unless one was already attributed.
    pub fn attribute(mut self, location: SourceLocation) -> Self {
        if self.location.is_none() {
            self.location = Some(location);
        }
        self
    }

    /// Forces the source location, discarding any previous attribution.
    pub fn relocate(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Stores the call-stack trace unless one was captured earlier.
    pub fn capture_trace(&mut self, frames: Vec<TraceFrame>) {
        if self.trace.is_none() {
            self.trace = Some(frames);
        }
    }

    pub fn has_trace(&self) -> bool {
        self.trace.is_some()
    }

    /// Renders the captured trace, innermost frame first, one frame per line.
    pub fn render_trace(&self) -> String {
        match &self.trace {
            Some(frames) => frames
                .iter()
                .map(|frame| format!("  at {frame}"))
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }
}

/// Binding failure attributed to one argument position. The call boundary
/// maps the index back to the failing argument expression's location.
#[derive(Debug, Clone, thiserror::Error)]
#[error("argument {index}: {cause}")]
pub struct ArgumentError {
    pub index: usize,
    pub cause: RuntimeError,
}

impl ArgumentError {
    pub fn new(index: usize, cause: RuntimeError) -> Self {
        Self { index, cause }
    }
}

/// Build-time failure while pairing an implemented class's public surface
/// with the implementing class's members.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LinkError {
    #[error("{implementor} does not implement {interface}.{member}")]
    MissingMember {
        implementor: String,
        interface: String,
        member: String,
    },
    #[error("{implementor}.{interface}_{member} does not match the signature of {interface}.{member}")]
    SignatureMismatch {
        implementor: String,
        interface: String,
        member: String,
    },
}
