use crate::error::{CoreError, Result};
use crate::time;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Marker that identifies the document header line
pub const HEADER_MARKER: &str = "WEBVTT";

/// Token separating start and end time on a cue timing line
pub const TIME_SEPARATOR: &str = "-->";

/// A single subtitle cue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cue {
    /// Display label, empty when the cue has none. Not required to be unique.
    #[serde(default)]
    pub id: String,
    /// `HH:MM:SS.mmm`, or empty if the source timing line was unusable
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    /// Cue payload, lines joined with `\n`
    pub text: String,
}

/// Editable field of a cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CueField {
    Id,
    StartTime,
    EndTime,
    Text,
}

impl CueField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::StartTime => "startTime",
            Self::EndTime => "endTime",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for CueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CueField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "startTime" | "start_time" | "start" => Ok(Self::StartTime),
            "endTime" | "end_time" | "end" => Ok(Self::EndTime),
            "text" => Ok(Self::Text),
            other => Err(format!(
                "unknown cue field '{other}' (expected id, start, end or text)"
            )),
        }
    }
}

impl Cue {
    /// Create a cue from its parts
    pub fn new(
        id: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            text: text.into(),
        }
    }

    /// Overwrite one field with raw text. No timestamp validation happens here.
    pub fn set_field(&mut self, field: CueField, value: impl Into<String>) {
        let value = value.into();
        match field {
            CueField::Id => self.id = value,
            CueField::StartTime => self.start_time = value,
            CueField::EndTime => self.end_time = value,
            CueField::Text => self.text = value,
        }
    }

    /// Parsed start time
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimecode`] if the start time is not a valid timestamp.
    pub fn start(&self) -> Result<Duration> {
        time::parse(&self.start_time)
    }

    /// Parsed end time
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimecode`] if the end time is not a valid timestamp.
    pub fn end(&self) -> Result<Duration> {
        time::parse(&self.end_time)
    }

    /// Whether `position` lies within the cue (both ends inclusive).
    /// Cues with unparseable times are never active.
    #[must_use]
    pub fn contains(&self, position: Duration) -> bool {
        match (self.start(), self.end()) {
            (Ok(start), Ok(end)) => start <= position && position <= end,
            _ => false,
        }
    }
}

/// Whether the first line of a document carries the header marker
#[must_use]
pub fn has_header(first_line: &str) -> bool {
    first_line.contains(HEADER_MARKER)
}

/// Parse document text into cues, in document order.
///
/// Parsing is lenient: a missing header, missing identifiers or malformed
/// timing lines never abort the parse. Cues without text are dropped.
///
/// Timing tokens that are not `HH:MM:SS.mmm` leave the field empty, with
/// one exception: the hour-less `MM:SS.mmm` form is accepted and stored as
/// `00:MM:SS.mmm`. Cue settings after the end time are dropped.
#[must_use]
pub fn parse(input: &str) -> Vec<Cue> {
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    let lines = split_lines(input);

    let mut i = 0;

    if lines.first().is_some_and(|line| has_header(line)) {
        i = 1;
        // Header metadata block
        while i < lines.len() && !lines[i].trim().is_empty() {
            i += 1;
        }
        // Blank separator after the header
        i += 1;
    }

    let mut cues = Vec::new();
    let mut current: Option<Cue> = None;

    while i < lines.len() {
        let line = lines[i].trim();

        if line.is_empty() {
            if let Some(cue) = current.take() {
                if !cue.text.is_empty() {
                    cues.push(cue);
                }
            }
        } else if let Some(cue) = current.as_mut() {
            if cue.text.is_empty() {
                cue.text = line.to_string();
            } else {
                cue.text.push('\n');
                cue.text.push_str(line);
            }
        } else {
            let mut cue = Cue::default();

            if line.contains(TIME_SEPARATOR) {
                apply_timing_line(&mut cue, line);
            } else {
                cue.id = line.to_string();
                if let Some(next) = lines.get(i + 1) {
                    if next.contains(TIME_SEPARATOR) {
                        apply_timing_line(&mut cue, next.trim());
                        i += 1;
                    }
                }
            }

            current = Some(cue);
        }

        i += 1;
    }

    if let Some(cue) = current {
        if !cue.text.is_empty() {
            cues.push(cue);
        }
    }

    cues
}

/// Render cues as a document.
///
/// # Errors
///
/// Returns [`CoreError::EmptyExport`] if there are no cues.
pub fn serialize(cues: &[Cue]) -> Result<String> {
    use std::fmt::Write;

    if cues.is_empty() {
        return Err(CoreError::EmptyExport);
    }

    let mut output = String::new();
    let _ = write!(output, "{HEADER_MARKER}\n\n");

    for cue in cues {
        if !cue.id.is_empty() {
            let _ = writeln!(output, "{}", cue.id);
        }
        let _ = writeln!(output, "{} {TIME_SEPARATOR} {}", cue.start_time, cue.end_time);
        let _ = write!(output, "{}\n\n", cue.text);
    }

    Ok(output)
}

/// Split on `\r\n`, `\n` or a lone `\r`
fn split_lines(input: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = input;

    while let Some(pos) = rest.find(['\n', '\r']) {
        lines.push(&rest[..pos]);
        let skip = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[pos + skip..];
    }
    lines.push(rest);

    lines
}

/// Fill start/end from a `start --> end [settings]` line.
/// Either side that is not a usable timestamp is left empty.
fn apply_timing_line(cue: &mut Cue, line: &str) {
    let mut parts = line.splitn(2, TIME_SEPARATOR);
    let start = parts.next().unwrap_or_default().trim();
    // Cue settings after the end time are not modelled
    let end = parts
        .next()
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default();

    cue.start_time = normalize_timestamp(start).unwrap_or_default();
    cue.end_time = normalize_timestamp(end).unwrap_or_default();
}

/// Canonicalize a timing token, accepting the hour-less `MM:SS.mmm` form.
fn normalize_timestamp(token: &str) -> Option<String> {
    if time::parse(token).is_ok() {
        return Some(token.to_string());
    }

    let padded = format!("00:{token}");
    time::parse(&padded).ok().map(|_| padded)
}
