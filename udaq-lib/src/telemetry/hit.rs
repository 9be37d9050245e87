//! Hit record reassembly.
//!
//! A hit is introduced by a time-delta word and, in the
//! TIMESTAMP_TOT_ADCS format, followed by up to two ADC payload words:
//!
//! ```text
//! word 0:  32-bit time delta in device ticks
//! word 1:  [31:28] adc count  [27:16] ToT  [15:12] channel  [11:0] adc1
//! word 2:  [31:28] channel    [27:16] adc2 [15:12] channel  [11:0] adc3
//! ```

use tracing::{debug, trace, warn};

use super::object;
use super::summary::{ErrorCounters, HitRecord};
use super::words::WordBuffer;
use super::Context;

/// Number of ADC samples this data class is configured to record.
pub const EXPECTED_ADCS: u32 = 3;

/// Convert a device tick count to seconds. The hit clock runs at 72/25 ns
/// per tick.
pub(super) fn tick_seconds(word: u32) -> f64 {
    (f64::from(word) * 25.0 / 72.0) / 1e9
}

/// Outcome of assembling one hit object.
pub(super) struct Assembled {
    /// Words consumed, including the time-delta word.
    pub consumed: usize,
    /// `None` when the record was dropped or the format produces none.
    pub record: Option<HitRecord>,
}

/// Assemble the hit starting at `index`, whose leading word is `delta`.
///
/// The running time `t0` advances for every hit word regardless of the
/// active format and regardless of whether a record is emitted.
pub(super) fn assemble(
    words: &WordBuffer,
    index: usize,
    delta: u32,
    ctx: &mut Context,
    errors: &mut ErrorCounters,
) -> Assembled {
    let time = tick_seconds(delta) + f64::from(ctx.epoch);
    if let Some(t0) = ctx.t0 {
        if time <= t0 {
            debug!(index, dt = time - t0, "non-linear time");
            errors.nonlinear_time += 1;
        }
    }
    ctx.t0 = Some(time);

    match ctx.format_subtype {
        object::FORMAT_TIMESTAMP => {
            warn!(index, "deprecated TIMESTAMP hit format, no record");
            Assembled {
                consumed: 1,
                record: None,
            }
        }
        object::FORMAT_TIMESTAMP_TOT_ADCS => {
            trace!(
                index,
                offset = delta,
                detail = ctx.format_detail,
                time,
                "TIMESTAMP_TOT_ADCS hit"
            );
            assemble_adcs(words, index, time, ctx, errors)
        }
        object::FORMAT_TIMESTAMP_TOT_ALL_CCRS => {
            warn!(index, "TIMESTAMP_TOT_ALL_CCRS hit, not expected in this stream");
            Assembled {
                consumed: 17,
                record: None,
            }
        }
        subtype => {
            debug!(index, subtype, "unknown data format subtype");
            errors.unknown_type += 1;
            Assembled {
                consumed: 1,
                record: None,
            }
        }
    }
}

fn assemble_adcs(
    words: &WordBuffer,
    index: usize,
    time: f64,
    ctx: &mut Context,
    errors: &mut ErrorCounters,
) -> Assembled {
    let mut consumed = 1;
    let mut n_adcs = 0;
    let mut tot = 0u16;
    let (mut adc1, mut adc2, mut adc3) = (-1i32, -1i32, -1i32);

    if let Some(word) = words.get(index + 1) {
        consumed += 1;
        n_adcs = (word >> 28) & 0xf;
        if n_adcs != EXPECTED_ADCS {
            debug!(index, n_adcs, "adc count != {EXPECTED_ADCS}");
            errors.adc_count_mismatch += 1;
        }
        tot = ((word >> 16) & 0xfff) as u16;
        adc1 = (word & 0xfff) as i32;
        trace!(
            index,
            n_adcs,
            tot,
            channel = (word >> 12) & 0xf,
            adc1,
            "first adc word"
        );
    } else {
        errors.missing_word += 1;
    }

    if n_adcs > 1 {
        if let Some(word) = words.get(index + 2) {
            consumed += 1;
            adc2 = ((word >> 16) & 0xfff) as i32;
            trace!(index, channel = (word >> 28) & 0xf, adc2, "second adc word");
            if n_adcs > 2 {
                adc3 = (word & 0xfff) as i32;
                trace!(index, channel = (word >> 12) & 0xf, adc3, "third adc word");
            }
        } else {
            errors.missing_word += 1;
        }
    }

    // declared slots that never made it past the sentinel
    for (slot, adc) in [(1u32, adc1), (2, adc2), (3, adc3)] {
        if n_adcs >= slot && adc == -1 {
            debug!(index, slot, "adc still at -1 after assembly");
            errors.negative_adc += 1;
        }
    }

    if n_adcs == 0 {
        return Assembled {
            consumed,
            record: None,
        };
    }
    if ctx.skip_first_hit {
        // the first record after a format switch carries bogus values out
        // of firmware initialization
        ctx.skip_first_hit = false;
        debug!(index, "dropping first hit after format switch");
        return Assembled {
            consumed,
            record: None,
        };
    }
    if ctx.hv_gate_pending {
        trace!(index, "dropping hit before first HV correction");
        return Assembled {
            consumed,
            record: None,
        };
    }

    Assembled {
        consumed,
        record: Some(HitRecord {
            time,
            adc1,
            adc2,
            adc3,
            cpu_trigger: ctx.cpu_trigger,
            tot,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adc_context() -> Context {
        Context {
            format_subtype: object::FORMAT_TIMESTAMP_TOT_ADCS,
            ..Context::default()
        }
    }

    fn words_of(raw: &[u32]) -> WordBuffer {
        let mut words = WordBuffer::new();
        for w in raw {
            words.extend(&w.to_le_bytes());
        }
        words
    }

    // word 1 with n_adcs=3, tot=100, chan 0, adc1=17
    const WORD1: u32 = (3 << 28) | (100 << 16) | 17;
    // word 2 with adc2=34, adc3=51
    const WORD2: u32 = (34 << 16) | 51;

    #[test]
    fn assemble_full_triple() {
        let words = words_of(&[720, WORD1, WORD2]);
        let mut ctx = adc_context();
        ctx.epoch = 41;
        let mut errors = ErrorCounters::default();

        let zult = assemble(&words, 0, 720, &mut ctx, &mut errors);
        assert_eq!(zult.consumed, 3);
        let record = zult.record.unwrap();
        // 720 ticks * 25 / 72 = 250 ns
        assert!((record.time - 41.00000025).abs() < 1e-12);
        assert_eq!(record.adc1, 17);
        assert_eq!(record.adc2, 34);
        assert_eq!(record.adc3, 51);
        assert_eq!(record.tot, 100);
        assert_eq!(errors.total(), 0);
    }

    #[test]
    fn truncated_payload_counts_missing_word() {
        // declares 3 adcs but the buffer ends after word 1
        let words = words_of(&[720, WORD1]);
        let mut ctx = adc_context();
        let mut errors = ErrorCounters::default();

        let zult = assemble(&words, 0, 720, &mut ctx, &mut errors);
        assert_eq!(zult.consumed, 2);
        let record = zult.record.unwrap();
        assert_eq!(record.adc1, 17);
        assert_eq!(record.adc2, -1);
        assert_eq!(record.adc3, -1);
        assert_eq!(errors.missing_word, 1);
        assert_eq!(errors.negative_adc, 2);
    }

    #[test]
    fn missing_first_payload_word_drops_record() {
        let words = words_of(&[720]);
        let mut ctx = adc_context();
        let mut errors = ErrorCounters::default();

        let zult = assemble(&words, 0, 720, &mut ctx, &mut errors);
        assert_eq!(zult.consumed, 1);
        assert!(zult.record.is_none());
        assert_eq!(errors.missing_word, 1);
        assert_eq!(errors.negative_adc, 0);
    }

    #[test]
    fn zero_declared_adcs_never_emits() {
        let word1 = (100 << 16) | 17; // n_adcs == 0
        let words = words_of(&[720, word1]);
        let mut ctx = adc_context();
        let mut errors = ErrorCounters::default();

        let zult = assemble(&words, 0, 720, &mut ctx, &mut errors);
        assert_eq!(zult.consumed, 2);
        assert!(zult.record.is_none());
        assert_eq!(errors.adc_count_mismatch, 1);
    }

    #[test]
    fn skip_first_hit_consumes_flag() {
        let words = words_of(&[720, WORD1, WORD2, 1440, WORD1, WORD2]);
        let mut ctx = adc_context();
        ctx.skip_first_hit = true;
        let mut errors = ErrorCounters::default();

        let zult = assemble(&words, 0, 720, &mut ctx, &mut errors);
        assert!(zult.record.is_none());
        assert!(!ctx.skip_first_hit);

        let zult = assemble(&words, 3, 1440, &mut ctx, &mut errors);
        assert!(zult.record.is_some());
    }

    #[test]
    fn nonlinear_time_flagged_but_time_still_advances() {
        let words = words_of(&[1440, WORD1, WORD2, 720, WORD1, WORD2]);
        let mut ctx = adc_context();
        let mut errors = ErrorCounters::default();

        assemble(&words, 0, 1440, &mut ctx, &mut errors);
        assert_eq!(errors.nonlinear_time, 0);

        let zult = assemble(&words, 3, 720, &mut ctx, &mut errors);
        assert_eq!(errors.nonlinear_time, 1);
        // flagged, never corrected: the record keeps its computed time
        let record = zult.record.unwrap();
        assert!((record.time - tick_seconds(720)).abs() < 1e-15);
        assert_eq!(ctx.t0, Some(record.time));
    }

    #[test]
    fn ccrs_format_consumes_17_words() {
        let words = words_of(&[720]);
        let mut ctx = Context {
            format_subtype: object::FORMAT_TIMESTAMP_TOT_ALL_CCRS,
            ..Context::default()
        };
        let mut errors = ErrorCounters::default();

        let zult = assemble(&words, 0, 720, &mut ctx, &mut errors);
        assert_eq!(zult.consumed, 17);
        assert!(zult.record.is_none());
    }

    #[test]
    fn unknown_subtype_counts_type_error() {
        let words = words_of(&[720]);
        let mut ctx = Context::default(); // subtype 0
        let mut errors = ErrorCounters::default();

        let zult = assemble(&words, 0, 720, &mut ctx, &mut errors);
        assert_eq!(zult.consumed, 1);
        assert!(zult.record.is_none());
        assert_eq!(errors.unknown_type, 1);
    }
}
