// ABOUTME: Lazy statement splitter for PostgreSQL-style SQL dump text
// ABOUTME: Tracks quotes, dollar-quoted blocks and comments so only top-level semicolons split

/// Maximum number of characters inspected when looking for a `$tag$` delimiter
///
/// The window includes both `$` characters, so the longest accepted tag is
/// `DOLLAR_TAG_WINDOW - 2` characters. A longer tag is treated as plain text.
pub const DOLLAR_TAG_WINDOW: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScanState<'a> {
    Normal,
    /// Inside a string opened by the given quote character
    Quoted(char),
    /// Inside a dollar-quoted block; holds the full `$tag$` delimiter
    DollarQuoted(&'a str),
    /// Inside a block comment at the given nesting depth
    BlockComment(u32),
}

/// Splits dump text into trimmed statements, one per top-level semicolon
///
/// The scan is single-pass and forward-only. Comments are dropped from the
/// emitted text (a block comment leaves a single space behind). Truncated input
/// never panics: an unterminated string, dollar block or comment simply runs to
/// the end of the text and is emitted as the final statement.
///
/// # Examples
///
/// ```
/// # use dump_migrator::dump::StatementTokenizer;
/// let sql = "SET x = 1; INSERT INTO t (a) VALUES ('a;b'); -- done";
/// let statements: Vec<String> = StatementTokenizer::new(sql).collect();
/// assert_eq!(statements, vec!["SET x = 1", "INSERT INTO t (a) VALUES ('a;b')"]);
/// ```
pub struct StatementTokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> StatementTokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn advance(&mut self, bytes: usize) {
        self.pos = (self.pos + bytes).min(self.input.len());
    }
}

impl<'a> Iterator for StatementTokenizer<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let input = self.input;
        let mut current = String::new();
        let mut state = ScanState::Normal;

        while let Some(c) = input[self.pos..].chars().next() {
            let rest = &input[self.pos..];

            match state {
                ScanState::Normal => {
                    if c == '\'' || c == '"' {
                        state = ScanState::Quoted(c);
                        current.push(c);
                        self.advance(1);
                    } else if rest.starts_with("--") {
                        // Keep the newline so the surrounding tokens stay separated
                        match rest.find('\n') {
                            Some(offset) => self.advance(offset),
                            None => self.advance(rest.len()),
                        }
                    } else if rest.starts_with("/*") {
                        state = ScanState::BlockComment(1);
                        self.advance(2);
                    } else if c == '$' {
                        match dollar_delimiter(rest) {
                            Some(delimiter) => {
                                state = ScanState::DollarQuoted(delimiter);
                                current.push_str(delimiter);
                                self.advance(delimiter.len());
                            }
                            None => {
                                current.push(c);
                                self.advance(1);
                            }
                        }
                    } else if c == ';' {
                        self.advance(1);
                        let statement = current.trim();
                        if !statement.is_empty() {
                            return Some(statement.to_string());
                        }
                        current.clear();
                    } else {
                        current.push(c);
                        self.advance(c.len_utf8());
                    }
                }
                ScanState::Quoted(quote) => {
                    current.push(c);
                    self.advance(c.len_utf8());
                    if c == quote {
                        if input[self.pos..].starts_with(quote) {
                            // Doubled quote is an escaped literal quote
                            current.push(quote);
                            self.advance(1);
                        } else {
                            state = ScanState::Normal;
                        }
                    }
                }
                ScanState::DollarQuoted(delimiter) => {
                    if c == '$' && rest.starts_with(delimiter) {
                        current.push_str(delimiter);
                        self.advance(delimiter.len());
                        state = ScanState::Normal;
                    } else {
                        current.push(c);
                        self.advance(c.len_utf8());
                    }
                }
                ScanState::BlockComment(depth) => {
                    if rest.starts_with("/*") {
                        state = ScanState::BlockComment(depth + 1);
                        self.advance(2);
                    } else if rest.starts_with("*/") {
                        self.advance(2);
                        if depth <= 1 {
                            state = ScanState::Normal;
                            current.push(' ');
                        } else {
                            state = ScanState::BlockComment(depth - 1);
                        }
                    } else {
                        self.advance(c.len_utf8());
                    }
                }
            }
        }

        if state != ScanState::Normal {
            tracing::debug!("Dump text ended inside {:?}; emitting remainder", state);
        }

        let statement = current.trim();
        if statement.is_empty() {
            None
        } else {
            Some(statement.to_string())
        }
    }
}

/// Recognize a `$tag$` delimiter at the start of `text`, within the lookahead window
fn dollar_delimiter(text: &str) -> Option<&str> {
    for (count, (idx, c)) in text.char_indices().enumerate().skip(1) {
        if count >= DOLLAR_TAG_WINDOW {
            return None;
        }
        if c == '$' {
            return Some(&text[..=idx]);
        }
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
    }
    None
}

/// Collect every statement of a dump
pub fn split_statements(input: &str) -> Vec<String> {
    StatementTokenizer::new(input).collect()
}
