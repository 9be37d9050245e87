//! Embedded calibration string extraction.
//!
//! The device interleaves ASCII diagnostic payloads with hit data. Two of
//! them carry auto-correction telemetry, e.g.
//! `HV_AUTOCORR {temp: 23.5, HV: 2650}` and
//! `THRESH_AUTOCORR {temp: 23.5, THRESH: 1390}`. Parsing is best-effort:
//! a missing or malformed field falls back to 0.0 / 0 rather than losing
//! the series point.

use tracing::trace;

use super::summary::{CorrectionKind, CorrectionRecord};

/// Substring after the last occurrence of `marker` and before the next
/// `stop`, trimmed. With no `marker` present the whole string is searched,
/// which normally fails the numeric parse and yields the default.
fn field<'a>(s: &'a str, marker: &str, stop: char) -> &'a str {
    let tail = s.rsplit(marker).next().unwrap_or(s);
    tail.split(stop).next().unwrap_or("").trim()
}

fn parse_temperature(s: &str) -> f64 {
    field(s, "temp:", ',').parse().unwrap_or(0.0)
}

fn parse_value(s: &str, marker: &str) -> i32 {
    field(s, marker, '}').parse().unwrap_or(0)
}

/// Parse an `HV_` or `THRESH_` calibration payload observed at `time`, or
/// `None` for any other diagnostic content.
#[must_use]
pub fn parse(string: &str, time: f64) -> Option<CorrectionRecord> {
    let (kind, marker) = if string.starts_with("HV_") {
        (CorrectionKind::HighVoltage, "HV:")
    } else if string.starts_with("THRESH_") {
        (CorrectionKind::Threshold, "THRESH:")
    } else {
        trace!(len = string.len(), "ignoring generic string");
        return None;
    };

    Some(CorrectionRecord {
        kind,
        time,
        temperature: parse_temperature(string),
        value: parse_value(string, marker),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hv_string() {
        let record = parse("HV_AUTOCORR {temp: 23.5, HV: 2650}", 12.5).unwrap();
        assert_eq!(record.kind, CorrectionKind::HighVoltage);
        assert!((record.time - 12.5).abs() < f64::EPSILON);
        assert!((record.temperature - 23.5).abs() < f64::EPSILON);
        assert_eq!(record.value, 2650);
    }

    #[test]
    fn parse_thresh_string() {
        let record = parse("THRESH_AUTOCORR {temp: 21.0, THRESH: 1390}", 3.0).unwrap();
        assert_eq!(record.kind, CorrectionKind::Threshold);
        assert_eq!(record.value, 1390);
    }

    #[test]
    fn malformed_fields_default_to_zero() {
        let record = parse("HV_AUTOCORR {temp: abc, HV: xyz}", 0.0).unwrap();
        assert!((record.temperature - 0.0).abs() < f64::EPSILON);
        assert_eq!(record.value, 0);

        let record = parse("HV_", 0.0).unwrap();
        assert!((record.temperature - 0.0).abs() < f64::EPSILON);
        assert_eq!(record.value, 0);
    }

    #[test]
    fn other_content_ignored() {
        assert!(parse("BOOT bank A fw 3.1.2", 0.0).is_none());
        assert!(parse("", 0.0).is_none());
        // prefix must match at the start of the string
        assert!(parse("LOG HV_ raised", 0.0).is_none());
    }
}
