//! Conversion between WebVTT timestamps and media positions.
//!
//! Timestamps are always `HH:MM:SS.mmm`. The hour field is at least two
//! digits wide but never capped, so long recordings keep round-tripping.
//! Positions are held as [`Duration`] so millisecond values stay exact; the
//! `*_seconds` helpers expose the floating point view media players use.

use crate::error::{CoreError, Result};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

fn timecode_regex() -> &'static Regex {
    static TIMECODE_REGEX: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    TIMECODE_REGEX.get_or_init(|| {
        Regex::new(r"^(\d{2}|[1-9]\d{2,}):(\d{2}):(\d{2})\.(\d{3})$").expect("Failed to compile timecode regex")
    })
}

/// Parse a `HH:MM:SS.mmm` timestamp into an exact duration.
///
/// Minutes and seconds must be `00`-`59`. Hours wider than two digits must
/// not start with `0`, so every accepted timestamp is the one [`format`]
/// produces. Anything that does not match the pattern exactly is rejected
/// rather than guessed at.
///
/// # Errors
///
/// Returns [`CoreError::InvalidTimecode`] if the text is not a timestamp.
pub fn parse(text: &str) -> Result<Duration> {
    let invalid = || CoreError::InvalidTimecode {
        value: text.to_string(),
    };

    let caps = timecode_regex().captures(text).ok_or_else(invalid)?;
    let field = |i: usize| -> Result<u64> {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .ok_or_else(invalid)
    };

    let hours = field(1)?;
    let minutes = field(2)?;
    let seconds = field(3)?;
    let millis = field(4)?;

    if minutes > 59 || seconds > 59 {
        return Err(invalid());
    }

    let whole_secs = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)?;

    Ok(Duration::from_secs(whole_secs) + Duration::from_millis(millis))
}

/// Parse a timestamp into fractional seconds (`H*3600 + M*60 + S + ms/1000`).
///
/// # Errors
///
/// Returns [`CoreError::InvalidTimecode`] if the text is not a timestamp.
pub fn parse_seconds(text: &str) -> Result<f64> {
    parse(text).map(|d| d.as_secs_f64())
}

/// Format a duration as `HH:MM:SS.mmm`.
///
/// Whole units are floored and sub-millisecond precision is truncated, so the
/// output never rounds up into the next second.
#[must_use]
pub fn format(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = duration.subsec_millis();

    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Format fractional seconds as `HH:MM:SS.mmm`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidSeconds`] for negative or non-finite input.
pub fn format_seconds(seconds: f64) -> Result<String> {
    duration_from_secs(seconds).map(format)
}

/// Convert a media position in seconds into a duration.
///
/// # Errors
///
/// Returns [`CoreError::InvalidSeconds`] for negative or non-finite input.
pub fn duration_from_secs(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(CoreError::InvalidSeconds { value: seconds });
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| CoreError::InvalidSeconds { value: seconds })
}

/// Extension trait for rendering durations as cue timestamps.
pub trait DurationExt {
    /// Render as a `HH:MM:SS.mmm` timestamp.
    fn to_timecode(&self) -> String;
}

impl DurationExt for Duration {
    fn to_timecode(&self) -> String {
        format(*self)
    }
}
