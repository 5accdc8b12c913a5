use std::fmt;

#[derive(Debug)]
pub enum ResolveError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad weight, threshold, strategy reference, etc.).
    ConfigValidation(String),
    /// Missing required column in input data.
    MissingColumn { source: String, column: String },
    /// Timestamp parse error on a source row.
    DateParse { source: String, record_id: String, value: String },
    /// Numeric field parse error on a source row.
    NumberParse { source: String, record_id: String, value: String },
    /// Run was cancelled via the cooperative token; partial work is discarded.
    Cancelled,
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { source, column } => {
                write!(f, "source '{source}': missing column '{column}'")
            }
            Self::DateParse { source, record_id, value } => {
                write!(f, "source '{source}', record '{record_id}': cannot parse timestamp '{value}'")
            }
            Self::NumberParse { source, record_id, value } => {
                write!(f, "source '{source}', record '{record_id}': cannot parse number '{value}'")
            }
            Self::Cancelled => write!(f, "resolution run cancelled"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ResolveError {}
