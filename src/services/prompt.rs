//! Prompt templates with `{column}` placeholders.

use std::path::Path;

use crate::error::{DataFormatError, PromptError};
use crate::models::{ColumnMatch, WorkItem, resolve_column, value_to_text};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed prompt template.
///
/// `{name}` is replaced by the row's `name` column; `{{` and `}}` produce
/// literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self, PromptError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().is_some_and(|(_, n)| *n == '{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().is_some_and(|(_, n)| *n == '}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(PromptError::Unclosed(pos));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(PromptError::EmptyPlaceholder(pos));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_string()));
                }
                '}' => return Err(PromptError::UnmatchedBrace(pos)),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    pub fn from_file(path: &Path) -> Result<Self, PromptError> {
        let source = std::fs::read_to_string(path).map_err(|e| PromptError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&source)
    }

    /// Placeholder names in order of first use.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Field(name) = segment
                && !names.contains(&name.as_str())
            {
                names.push(name);
            }
        }
        names
    }

    /// Check every placeholder binds to exactly one of `columns`.
    pub fn validate(&self, columns: &[String]) -> Result<(), DataFormatError> {
        for name in self.placeholders() {
            match resolve_column(columns.iter().map(String::as_str), name) {
                ColumnMatch::Found(_) => {}
                ColumnMatch::Missing => return Err(DataFormatError::MissingColumn(name.to_string())),
                ColumnMatch::Ambiguous(candidates) => {
                    return Err(DataFormatError::AmbiguousColumn {
                        requested: name.to_string(),
                        candidates,
                    });
                }
            }
        }
        Ok(())
    }

    /// Fill the template from one row. Null cells render as empty text.
    pub fn render(&self, item: &WorkItem) -> Result<String, PromptError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = item
                        .get(name)
                        .ok_or_else(|| PromptError::MissingField(name.clone()))?;
                    out.push_str(&value_to_text(value));
                }
            }
        }
        Ok(out)
    }
}
