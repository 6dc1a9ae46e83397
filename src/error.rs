use thiserror::Error;

/// Source location for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A fault report carrying enough source context to locate the problem
/// without a debugger: message, location and a rendered code frame.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub source: Option<String>,
    pub message: String,
    pub location: Location,
    pub frame: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            source: None,
            message: message.into(),
            location,
            frame: String::new(),
        }
    }

    pub fn with_source(mut self, source: Option<&str>) -> Self {
        self.source = source.map(str::to_owned);
        self
    }

    pub fn with_frame(mut self, frame: String) -> Self {
        self.frame = frame;
        self
    }

    fn origin(&self) -> &str {
        self.source.as_deref().unwrap_or("source")
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.message, self.origin(), self.location)?;
        if !self.frame.is_empty() {
            write!(f, "\n{}", self.frame)?;
        }
        Ok(())
    }
}

/// All errors that can occur while compiling or rendering a document
#[derive(Error, Debug)]
pub enum KakikaeError {
    /// Malformed directive, unmatched quote or tag, illegal nesting,
    /// unknown operator. Aborts compilation of the whole document.
    #[error("Grammar violation: {0}")]
    Grammar(Diagnostic),

    /// An embedded expression failed the standalone syntax check.
    #[error("Expression syntax error: {0}")]
    ExpressionSyntax(Diagnostic),

    /// An expression failed while rendering. Aborts the render call;
    /// no partial output is returned.
    #[error("Evaluation error: {0}")]
    Evaluation(Diagnostic),

    #[error("Invalid options: {message}")]
    Options { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for kakikae operations
pub type Result<T> = std::result::Result<T, KakikaeError>;
