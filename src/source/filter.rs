use regex::Regex;

use crate::error::{IndexerError, Result};

/// A slash-path glob such as `/1111/**` or `/*/2222`.
///
/// `*` matches exactly one path segment, `**` matches any number of
/// segments (including none) and `?` matches one character other than `/`.
#[derive(Debug, Clone)]
pub struct PathFilter {
    expression: String,
    regex: Regex,
}

impl PathFilter {
    pub fn parse(expression: &str) -> Result<Self> {
        if expression.is_empty() {
            return Err(IndexerError::invalid_argument("path filter is empty"));
        }
        if !expression.starts_with('/') {
            return Err(IndexerError::invalid_argument(format!(
                "path filter must start with '/': {expression}"
            )));
        }
        Ok(PathFilter {
            expression: expression.to_string(),
            regex: Self::compile_pattern(expression)?,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    fn compile_pattern(pattern: &str) -> Result<Regex> {
        let mut regex_pattern = String::from("^");

        for segment in pattern[1..].split('/') {
            if segment == "**" {
                regex_pattern.push_str("(/[^/]+)*");
                continue;
            }
            if segment.contains("**") {
                return Err(IndexerError::invalid_argument(format!(
                    "'**' must be a whole segment: {pattern}"
                )));
            }
            regex_pattern.push('/');
            for c in segment.chars() {
                match c {
                    '*' => regex_pattern.push_str("[^/]*"),
                    '?' => regex_pattern.push_str("[^/]"),
                    c => regex_pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
                }
            }
        }
        regex_pattern.push('$');

        Regex::new(&regex_pattern).map_err(|e| {
            IndexerError::invalid_argument(format!("invalid path filter {pattern}: {e}"))
        })
    }
}
