//! Response extractors: pull the answer out of raw model text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::ExtractError;
use crate::models::{
    ErrorKind, ErrorMarker, ExtractorKind, Fields, PromptConfig, RecordStatus, RunRecord,
};

/// Output section headings, most specific first. The last occurrence of any
/// of them in a response marks where the answer starts.
const OUTPUT_MARKERS: &[&str] = &[
    "## 2. Output",
    "### Output",
    "\nOutput:",
    "**Output:**",
    "\n## Output",
    "2. Output:",
    "\n2. Output",
    "### 2. Output",
    "\n**Output",
    "Output",
];

pub const DEFAULT_MIN_OUTPUT_LEN: usize = 10;

static RE_JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n(.*?)```").unwrap());

/// What an extractor pulled out of a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub text: String,
    pub fields: Fields,
}

pub trait OutputExtractor: Send + Sync {
    fn parse(&self, raw: &str) -> Result<ParsedOutput, ExtractError>;
}

/// Build the extractor selected in config.
pub fn build_extractor(kind: ExtractorKind, config: &PromptConfig) -> Box<dyn OutputExtractor> {
    match kind {
        ExtractorKind::Marker => Box::new(MarkerExtractor::new(config.min_output_len)),
        ExtractorKind::Json => Box::new(JsonExtractor::new(config.required_keys.clone())),
        ExtractorKind::None => Box::new(PassthroughExtractor),
    }
}

/// Takes the first line after the last "Output" heading.
#[derive(Debug, Clone)]
pub struct MarkerExtractor {
    min_len: usize,
}

impl MarkerExtractor {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }
}

impl Default for MarkerExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_OUTPUT_LEN)
    }
}

impl OutputExtractor for MarkerExtractor {
    fn parse(&self, raw: &str) -> Result<ParsedOutput, ExtractError> {
        if raw.trim().is_empty() {
            return Err(ExtractError::Empty);
        }

        // Latest position wins; on a tie the earlier marker in the list does.
        let mut found: Option<(usize, &str)> = None;
        for &marker in OUTPUT_MARKERS {
            if let Some(pos) = raw.rfind(marker)
                && found.is_none_or(|(best, _)| pos > best)
            {
                found = Some((pos, marker));
            }
        }
        let (pos, marker) = found.ok_or(ExtractError::MarkerNotFound)?;

        let section = raw[pos + marker.len()..].trim_matches(':').trim();
        let first_line = section.lines().next().unwrap_or_default();
        let cleaned = first_line
            .trim_matches('*')
            .trim()
            .replace('*', "");
        let cleaned = cleaned.trim_matches('"').trim();

        if cleaned.starts_with('#') {
            return Err(ExtractError::HeadingOnly);
        }
        let len = cleaned.chars().count();
        if len < self.min_len {
            return Err(ExtractError::TooShort {
                len,
                min: self.min_len,
            });
        }

        Ok(ParsedOutput {
            text: cleaned.to_string(),
            fields: Fields::new(),
        })
    }
}

/// Finds the first JSON object in a response, preferring fenced blocks.
#[derive(Debug, Clone, Default)]
pub struct JsonExtractor {
    required_keys: Vec<String>,
}

impl JsonExtractor {
    pub fn new(required_keys: Vec<String>) -> Self {
        Self { required_keys }
    }

    fn missing_keys(&self, object: &Fields) -> Vec<String> {
        self.required_keys
            .iter()
            .filter(|key| !object.contains_key(key.as_str()))
            .cloned()
            .collect()
    }
}

impl OutputExtractor for JsonExtractor {
    fn parse(&self, raw: &str) -> Result<ParsedOutput, ExtractError> {
        if raw.trim().is_empty() {
            return Err(ExtractError::Empty);
        }

        let fenced = RE_JSON_FENCE
            .captures_iter(raw)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| first_object(m.as_str()));
        let candidates = fenced.chain(ObjectScan::new(raw));

        let mut incomplete = None;
        for object in candidates {
            let missing = self.missing_keys(&object);
            if missing.is_empty() {
                return Ok(ParsedOutput {
                    text: Value::Object(object.clone()).to_string(),
                    fields: object,
                });
            }
            incomplete.get_or_insert(missing);
        }

        Err(incomplete.map_or(ExtractError::NoJsonObject, ExtractError::MissingKeys))
    }
}

/// Every JSON object that parses starting at some `{` in the text.
struct ObjectScan<'a> {
    text: &'a str,
    offset: usize,
}

impl<'a> ObjectScan<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, offset: 0 }
    }
}

impl Iterator for ObjectScan<'_> {
    type Item = Fields;

    fn next(&mut self) -> Option<Fields> {
        while let Some(rel) = self.text[self.offset..].find('{') {
            let start = self.offset + rel;
            let mut stream =
                serde_json::Deserializer::from_str(&self.text[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(Value::Object(map))) => {
                    self.offset = start + stream.byte_offset();
                    return Some(map);
                }
                _ => self.offset = start + 1,
            }
        }
        None
    }
}

fn first_object(text: &str) -> Option<Fields> {
    ObjectScan::new(text).next()
}

/// Keeps the whole response as the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExtractor;

impl OutputExtractor for PassthroughExtractor {
    fn parse(&self, raw: &str) -> Result<ParsedOutput, ExtractError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ExtractError::Empty);
        }
        Ok(ParsedOutput {
            text: text.to_string(),
            fields: Fields::new(),
        })
    }
}

/// Outcome counts of [`reextract_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReextractStats {
    pub records: usize,
    /// Records whose response parsed.
    pub parsed: usize,
    /// Previously failed records that now parse.
    pub recovered: usize,
    /// Records whose response did not parse.
    pub unparseable: usize,
    /// Records with no stored response.
    pub skipped: usize,
}

/// Run `extractor` again over each record's stored response.
///
/// Records without a response (API failures) are left untouched. A record
/// whose response now fails to parse becomes a failed, unparseable record.
pub fn reextract_records(
    records: &mut [RunRecord],
    extractor: &dyn OutputExtractor,
) -> ReextractStats {
    let mut stats = ReextractStats {
        records: records.len(),
        ..Default::default()
    };

    for record in records.iter_mut() {
        let Some(response) = record.response.as_deref() else {
            stats.skipped += 1;
            continue;
        };
        match extractor.parse(response) {
            Ok(parsed) => {
                if !record.is_success() {
                    stats.recovered += 1;
                }
                stats.parsed += 1;
                record.status = RecordStatus::Success;
                record.extracted_output = Some(parsed.text);
                record.extracted_fields = parsed.fields;
                record.error = None;
            }
            Err(e) => {
                stats.unparseable += 1;
                record.status = RecordStatus::Failed;
                record.extracted_output = None;
                record.extracted_fields = Fields::new();
                record.error = Some(ErrorMarker {
                    kind: ErrorKind::Unparseable,
                    message: format!("could not parse response: {e}"),
                });
            }
        }
    }

    tracing::info!(
        records = stats.records,
        parsed = stats.parsed,
        recovered = stats.recovered,
        unparseable = stats.unparseable,
        "re-extraction complete"
    );
    stats
}
