//! Layer rename mappings and their CSV form.
//!
//! The rename activity reads a `mapping.csv` with one `oldName,newName` pair
//! per line. Fields containing commas, quotes or line breaks are quoted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Rename one layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMapping {
    pub from: String,
    pub to: String,
}

impl LayerMapping {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Check a mapping set before it is sent to the remote job
pub fn validate(mappings: &[LayerMapping]) -> Result<()> {
    if mappings.is_empty() {
        return Err(PipelineError::InvalidRequest(
            "at least one layer mapping is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for mapping in mappings {
        if mapping.from.trim().is_empty() || mapping.to.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(format!(
                "layer mapping '{}' -> '{}' has an empty name",
                mapping.from, mapping.to
            )));
        }
        if !seen.insert(mapping.from.as_str()) {
            return Err(PipelineError::InvalidRequest(format!(
                "layer '{}' is mapped more than once",
                mapping.from
            )));
        }
    }
    Ok(())
}

/// Serialize mappings to CSV
pub fn to_csv(mappings: &[LayerMapping]) -> String {
    let mut out = String::new();
    for mapping in mappings {
        out.push_str(&quote(&mapping.from));
        out.push(',');
        out.push_str(&quote(&mapping.to));
        out.push('\n');
    }
    out
}

fn quote(field: &str) -> String {
    let padded = field.starts_with(char::is_whitespace) || field.ends_with(char::is_whitespace);
    if padded || field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse `oldName,newName` CSV. Blank lines are skipped. Unquoted fields
/// are trimmed; quoted fields are kept verbatim.
pub fn from_csv(input: &str) -> Result<Vec<LayerMapping>> {
    let mut mappings = Vec::new();
    let mut chars = input.chars().peekable();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut line = 1usize;

    let finish = |field: &mut String, quoted: &mut bool| {
        let value = std::mem::take(field);
        let value = if *quoted { value } else { value.trim().to_string() };
        *quoted = false;
        value
    };

    loop {
        let Some(c) = chars.next() else {
            if !field.is_empty() || quoted || !record.is_empty() {
                record.push(finish(&mut field, &mut quoted));
                push_record(&mut mappings, std::mem::take(&mut record), line)?;
            }
            break;
        };

        match c {
            '"' if !quoted && field.trim().is_empty() => {
                field.clear();
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            field.push('"');
                        }
                        Some('"') => break,
                        Some(ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            field.push(ch);
                        }
                        None => {
                            return Err(PipelineError::decode(
                                "layer mapping CSV",
                                format!("unterminated quote on line {}", line),
                            ))
                        }
                    }
                }
            }
            ',' => record.push(finish(&mut field, &mut quoted)),
            '\r' => {}
            '\n' => {
                if !field.is_empty() || quoted || !record.is_empty() {
                    record.push(finish(&mut field, &mut quoted));
                    push_record(&mut mappings, std::mem::take(&mut record), line)?;
                }
                line += 1;
            }
            // padding between a closing quote and the separator
            other if quoted && other.is_whitespace() => {}
            other => field.push(other),
        }
    }

    Ok(mappings)
}

fn push_record(mappings: &mut Vec<LayerMapping>, record: Vec<String>, line: usize) -> Result<()> {
    match <[String; 2]>::try_from(record) {
        Ok([from, to]) => {
            mappings.push(LayerMapping::new(from, to));
            Ok(())
        }
        Err(record) => Err(PipelineError::decode(
            "layer mapping CSV",
            format!("line {} has {} fields, expected 2", line, record.len()),
        )),
    }
}
