use std::io;

use thiserror::Error;

/// Reasons an extraction run stops. Every variant aborts the whole call.
#[derive(Error, Debug)]
pub(crate) enum ExtractError {
    #[error("Error: File '{path}' not found.")]
    FileNotFound {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(
        "Parsing error: {message} (in '{path}'{})",
        .line.map(|l| format!(", line {l}")).unwrap_or_default()
    )]
    Parse {
        path: String,
        line: Option<u64>,
        message: String,
    },
    #[error("An unexpected error occurred: {reason} (in '{path}')")]
    Unexpected { path: String, reason: String },
}

pub(crate) type Result<T> = std::result::Result<T, ExtractError>;

impl ExtractError {
    pub(crate) fn parse(path: &str, err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line());
        Self::Parse {
            path: path.to_string(),
            line,
            message: err.to_string(),
        }
    }

    pub(crate) fn unexpected(path: &str, reason: impl Into<String>) -> Self {
        Self::Unexpected {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Short tag used in log fields.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "file_not_found",
            Self::Parse { .. } => "parse",
            Self::Unexpected { .. } => "unexpected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_the_report_diagnostics() {
        let missing = ExtractError::FileNotFound {
            path: "./data/nope.csv".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(missing.to_string(), "Error: File './data/nope.csv' not found.");
        assert_eq!(missing.kind(), "file_not_found");

        let odd = ExtractError::unexpected("x.csv", "missing column 'Sex'");
        assert_eq!(
            odd.to_string(),
            "An unexpected error occurred: missing column 'Sex' (in 'x.csv')"
        );
    }

    #[test]
    fn parse_message_carries_line_when_known() {
        let err = ExtractError::Parse {
            path: "a.csv".into(),
            line: Some(12),
            message: "bad quote".into(),
        };
        assert_eq!(err.to_string(), "Parsing error: bad quote (in 'a.csv', line 12)");
        assert_eq!(err.kind(), "parse");
    }
}
