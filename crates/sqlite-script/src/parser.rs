/// Statement delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = ";";

/// Classification of one physical script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine<'a> {
    /// A `--` comment, trimmed.
    Comment(&'a str),
    /// A blank line or a `//` line.
    Ignored,
    /// Content appended to the statement being assembled.
    Pending,
    /// The line completed a statement.
    Statement(String),
}

/// Assembles statements from script lines in a single forward pass.
///
/// Lines accumulate in a buffer separated by spaces until a line ends with
/// the delimiter, or, in full-line mode, until a line consists of nothing
/// but the delimiter. Comment lines never touch the buffer.
#[derive(Debug, Clone)]
pub struct StatementParser {
    delimiter: String,
    full_line_delimiter: bool,
    buffer: String,
}

impl Default for StatementParser {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER, false)
    }
}

impl StatementParser {
    #[must_use]
    pub fn new(delimiter: impl Into<String>, full_line_delimiter: bool) -> Self {
        Self {
            delimiter: delimiter.into(),
            full_line_delimiter,
            buffer: String::new(),
        }
    }

    /// Feeds one line (without its line terminator) to the parser.
    pub fn push_line<'a>(&mut self, line: &'a str) -> ParsedLine<'a> {
        let trimmed = line.trim();

        if trimmed.starts_with("--") {
            return ParsedLine::Comment(trimmed);
        }

        if trimmed.is_empty() || trimmed.starts_with("//") {
            return ParsedLine::Ignored;
        }

        if self.terminates(trimmed) {
            let content = line
                .rfind(self.delimiter.as_str())
                .map_or(line, |index| &line[..index]);

            self.buffer.push_str(content);
            self.buffer.push(' ');

            return ParsedLine::Statement(std::mem::take(&mut self.buffer));
        }

        self.buffer.push_str(line);
        self.buffer.push(' ');
        ParsedLine::Pending
    }

    /// Returns the unterminated statement text collected so far, if any.
    #[must_use]
    pub fn remainder(&self) -> Option<&str> {
        let remainder = self.buffer.trim();
        (!remainder.is_empty()).then_some(remainder)
    }

    fn terminates(&self, trimmed: &str) -> bool {
        if self.full_line_delimiter {
            trimmed == self.delimiter
        } else {
            trimmed.ends_with(self.delimiter.as_str())
        }
    }
}
