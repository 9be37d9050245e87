use serde::{Deserialize, Serialize};
use tracing::warn;

/// One reconstructed detection event.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    /// Absolute time in seconds on the device clock (epoch plus sub-epoch
    /// offset).
    pub time: f64,
    /// Charge samples; -1 marks a declared slot never populated from the
    /// stream.
    pub adc1: i32,
    pub adc2: i32,
    pub adc3: i32,
    /// True while the device reported the CPU trigger active.
    pub cpu_trigger: bool,
    /// Time over the discriminator threshold, 12-bit range.
    pub tot: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionKind {
    HighVoltage,
    Threshold,
}

/// One point of an auto-correction series reported by the device.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CorrectionRecord {
    pub kind: CorrectionKind,
    /// Seconds on the same clock as [`HitRecord::time`].
    pub time: f64,
    /// Board temperature; 0.0 when the payload was unparsable.
    pub temperature: f64,
    /// DAC setting; 0 when the payload was unparsable.
    pub value: i32,
}

/// Per-decode anomaly tallies.
///
/// Decoding never halts on any of these; each handler counts what it sees
/// and moves on to the next word.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCounters {
    /// Hits whose computed time did not advance past the previous hit.
    pub nonlinear_time: u64,
    /// ADC payloads declaring a count other than the expected 3.
    pub adc_count_mismatch: u64,
    /// Objects truncated by the end of the buffer.
    pub missing_word: u64,
    /// Words with an unrecognized type tag or format subtype.
    pub unknown_type: u64,
    /// Declared ADC slots still at the -1 sentinel after assembly.
    pub negative_adc: u64,
    /// Page headers flagging a device buffer overflow.
    pub buffer_overflow: u64,
    /// Payload words that failed ASCII decoding.
    pub ascii_decode: u64,
}

impl ErrorCounters {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.nonlinear_time
            + self.adc_count_mismatch
            + self.missing_word
            + self.unknown_type
            + self.negative_adc
            + self.buffer_overflow
            + self.ascii_decode
    }

    /// Log every nonzero counter. Called once at the end of a decode.
    pub fn log_nonzero(&self) {
        if self.nonlinear_time > 0 {
            warn!(count = self.nonlinear_time, "non-linear time errors");
        }
        if self.adc_count_mismatch > 0 {
            warn!(count = self.adc_count_mismatch, "adc count errors");
        }
        if self.missing_word > 0 {
            warn!(count = self.missing_word, "missing word errors");
        }
        if self.unknown_type > 0 {
            warn!(count = self.unknown_type, "object type errors");
        }
        if self.negative_adc > 0 {
            warn!(count = self.negative_adc, "-1 charge errors");
        }
        if self.buffer_overflow > 0 {
            warn!(count = self.buffer_overflow, "buffer overflows");
        }
        if self.ascii_decode > 0 {
            warn!(count = self.ascii_decode, "ascii decode errors");
        }
    }
}

/// Everything produced by one decode invocation.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
pub struct Decoded {
    /// Hit records in stream order.
    pub hits: Vec<HitRecord>,
    /// High-voltage auto-correction series.
    pub high_voltage: Vec<CorrectionRecord>,
    /// Discriminator-threshold auto-correction series.
    pub threshold: Vec<CorrectionRecord>,
    pub errors: ErrorCounters,
    /// Bytes at the end of the capture that did not fill a whole word.
    pub trailing_bytes: usize,
}

impl Decoded {
    /// Seconds between the first and last hit.
    #[must_use]
    pub fn duration(&self) -> f64 {
        match (self.hits.first(), self.hits.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }

    /// Mean event rate in Hz, or `None` when no duration can be computed.
    #[must_use]
    pub fn rate(&self) -> Option<f64> {
        let duration = self.duration();
        if duration > 0.0 {
            Some(self.hits.len() as f64 / duration)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(time: f64) -> HitRecord {
        HitRecord {
            time,
            adc1: 100,
            adc2: 200,
            adc3: 300,
            cpu_trigger: false,
            tot: 10,
        }
    }

    #[test]
    fn rate_over_hit_span() {
        let decoded = Decoded {
            hits: vec![hit(10.0), hit(12.0), hit(20.0)],
            ..Decoded::default()
        };
        assert!((decoded.duration() - 10.0).abs() < f64::EPSILON);
        assert!((decoded.rate().unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn rate_is_none_without_span() {
        assert_eq!(Decoded::default().rate(), None);

        let decoded = Decoded {
            hits: vec![hit(10.0)],
            ..Decoded::default()
        };
        assert_eq!(decoded.rate(), None);
    }

    #[test]
    fn counter_total() {
        let errors = ErrorCounters {
            nonlinear_time: 1,
            missing_word: 2,
            ..ErrorCounters::default()
        };
        assert_eq!(errors.total(), 3);
    }
}
