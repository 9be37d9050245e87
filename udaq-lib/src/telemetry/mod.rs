//! Telemetry stream decoding.
//!
//! The word stream is a flat sequence of protocol objects, each introduced
//! by the type tag in the top byte of its leading word (see [`Object`]).
//! Decoding is a single forward pass: one [`Decoder`] owns the running
//! context (epoch, active data format, trigger mode) and dispatches each
//! object to its handler, which reports how many words it consumed.
//!
//! A capture can be decoded in one shot with [`Decoder::decode`], or
//! chunk-by-chunk with [`Decoder::feed`] / [`Decoder::finish`] when the
//! acquisition produces bounded subruns:
//!
//! ```
//! use udaq::telemetry::{Config, Decoder};
//!
//! let mut decoder = Decoder::new(Config::builder().build());
//! decoder.feed(&0xe000_0014u32.to_le_bytes()); // PPS second 20
//! let decoded = decoder.finish();
//! assert!(decoded.hits.is_empty());
//! ```

mod calibration;
mod hit;
mod object;
mod summary;
mod words;

pub use hit::EXPECTED_ADCS;
pub use object::{
    Object, StreamStatus, FORMAT_TIMESTAMP, FORMAT_TIMESTAMP_TOT_ADCS,
    FORMAT_TIMESTAMP_TOT_ALL_CCRS,
};
pub use summary::{CorrectionKind, CorrectionRecord, Decoded, ErrorCounters, HitRecord};
pub use words::WordBuffer;

use std::io::Read;

use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

use crate::{framing, Result};

/// Decode configuration.
///
/// None of these affect how anomalies are counted; diagnostic verbosity is
/// controlled entirely through the `tracing` subscriber.
#[derive(TypedBuilder, Debug, Default, Clone, Copy)]
pub struct Config {
    /// Bytes to drop from the front of the capture before word framing.
    #[builder(default)]
    pub skip_bytes: usize,
    /// The device has no PPS input wired in; advance the epoch by one
    /// second per PPS object instead of latching the hardware counter, to
    /// preserve linear time.
    #[builder(default)]
    pub no_pps: bool,
    /// The capture is still wrapped in zero-delimited COBS frames.
    #[builder(default)]
    pub cobs_framing: bool,
    /// Drop hit records preceding the first high-voltage correction
    /// string, for runs using the HV auto-correction.
    #[builder(default)]
    pub hv_auto_gate: bool,
}

/// Running decode state threaded through the object handlers.
#[derive(Debug, Default)]
struct Context {
    year: u16,
    prev_year: u16,
    /// Current whole-second epoch from PPS objects.
    epoch: u32,
    prev_epoch: u32,
    format_subtype: u16,
    format_detail: u16,
    cpu_trigger: bool,
    /// Largest sub-epoch time seen so far, `None` until the first hit.
    t0: Option<f64>,
    skip_first_hit: bool,
    /// True until the first HV correction string; only armed when the
    /// HV auto-gate is requested.
    hv_gate_pending: bool,
}

/// Stateful decoder for one capture.
///
/// Created once per decode invocation; all output entities are value types
/// appended to the output sequences and never mutated afterwards.
pub struct Decoder {
    config: Config,
    words: WordBuffer,
    cursor: usize,
    ctx: Context,
    out: Decoded,
}

impl Decoder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Decoder {
            config,
            words: WordBuffer::new(),
            cursor: 0,
            ctx: Context {
                hv_gate_pending: config.hv_auto_gate,
                ..Context::default()
            },
            out: Decoded::default(),
        }
    }

    /// Decode a complete capture buffer.
    ///
    /// Applies the capture-level preparation called for by the
    /// configuration (deframing, trailing-sentinel strip, leading skip
    /// bytes) and then runs the word loop to the end.
    ///
    /// # Errors
    /// [`crate::Error::Framing`] when `cobs_framing` is set and the frame
    /// boundaries cannot be recovered.
    pub fn decode(config: Config, dat: &[u8]) -> Result<Decoded> {
        let deframed;
        let mut dat = if config.cobs_framing {
            deframed = framing::deframe(dat)?;
            &deframed[..]
        } else {
            dat
        };
        dat = framing::strip_trailing_ok(dat);
        if config.skip_bytes > 0 {
            let skip = config.skip_bytes.min(dat.len());
            debug!(bytes = skip, "skipping capture prefix");
            dat = &dat[skip..];
        }

        let mut decoder = Decoder::new(config);
        decoder.feed(dat);
        Ok(decoder.finish())
    }

    /// Decode a complete capture from a reader.
    ///
    /// # Errors
    /// Any `std::io::Error` reading, or a framing error per
    /// [`Decoder::decode`].
    pub fn decode_reader<R>(config: Config, mut reader: R) -> Result<Decoded>
    where
        R: Read,
    {
        let mut dat = Vec::new();
        reader.read_to_end(&mut dat)?;
        Self::decode(config, &dat)
    }

    /// Feed one chunk of an already-deframed capture.
    ///
    /// Objects whose trailing words have not arrived yet stay buffered
    /// until a later chunk or [`Decoder::finish`] completes them, so
    /// chunk boundaries never show up as missing-word errors.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.words.extend(chunk);
        self.run(false);
    }

    /// Drain everything still buffered and produce the decode output.
    ///
    /// Partial objects at the true end of the capture are now resolved
    /// with missing-word accounting, trailing bytes are reported, and all
    /// nonzero counters logged.
    #[must_use]
    pub fn finish(mut self) -> Decoded {
        self.run(true);

        self.out.trailing_bytes = self.words.trailing_bytes();
        if self.out.trailing_bytes > 0 {
            warn!(
                bytes = self.out.trailing_bytes,
                "capture length not a multiple of 4, dropping trailing bytes"
            );
        }
        self.out.errors.log_nonzero();
        self.out
    }

    /// The dispatcher loop. With `at_end` false it stops short of any
    /// object that a later chunk could still complete.
    fn run(&mut self, at_end: bool) {
        while self.cursor < self.words.len() {
            let word = self.words.get(self.cursor).expect("cursor bounds checked");
            let obj = Object::classify(word);
            if !at_end && self.cursor + required_words(obj, &self.ctx) > self.words.len() {
                break;
            }
            let consumed = self.dispatch(obj);
            debug_assert!(consumed >= 1, "handlers must consume at least one word");
            self.cursor += consumed;
        }
    }

    /// Handle one object, returning the number of words consumed.
    fn dispatch(&mut self, obj: Object) -> usize {
        let index = self.cursor;
        match obj {
            Object::Hit { delta } => {
                let zult = hit::assemble(
                    &self.words,
                    index,
                    delta,
                    &mut self.ctx,
                    &mut self.out.errors,
                );
                if let Some(record) = zult.record {
                    self.out.hits.push(record);
                }
                zult.consumed
            }
            Object::PpsSecond { seconds } => {
                self.on_pps_second(index, seconds);
                1
            }
            Object::PpsYear { year } => {
                self.on_pps_year(index, year);
                1
            }
            Object::TrigConfig { cpu_trigger } => self.on_trig_config(index, cpu_trigger),
            Object::DataFormat { subtype, detail } => {
                self.on_data_format(index, subtype, detail);
                1
            }
            Object::PageHeader {
                num_words,
                status,
                source_id,
            } => {
                self.on_page_header(index, num_words, status, source_id);
                1
            }
            Object::GenericString { num_words } => self.on_generic_string(index, num_words),
            Object::Unknown { tag } => {
                debug!(index, tag, "unknown object type, skipping");
                self.out.errors.unknown_type += 1;
                1
            }
        }
    }

    fn on_pps_second(&mut self, index: usize, seconds: u32) {
        let epoch = if self.config.no_pps {
            self.ctx.epoch + 1
        } else {
            seconds
        };
        if self.ctx.prev_epoch != 0 {
            let jump = i64::from(epoch) - i64::from(self.ctx.prev_epoch);
            if jump.abs() > 1 {
                warn!(index, jump, "epoch changed by more than one second");
            }
        }
        trace!(index, epoch, year = self.ctx.year, "PPS second");
        self.ctx.epoch = epoch;
        self.ctx.prev_epoch = epoch;
    }

    fn on_pps_year(&mut self, index: usize, year: u16) {
        if self.ctx.prev_year != 0 {
            let jump = i32::from(year) - i32::from(self.ctx.prev_year);
            if jump.abs() > 1 {
                warn!(index, jump, "year changed by more than one");
            }
        }
        trace!(index, year, "PPS year");
        self.ctx.year = year;
        self.ctx.prev_year = year;
    }

    fn on_trig_config(&mut self, index: usize, cpu_trigger: bool) -> usize {
        debug!(index, cpu_trigger, "trigger config");
        self.ctx.cpu_trigger = cpu_trigger;

        // the following word carries a timestamp, informational only
        match self.words.get(index + 1) {
            Some(word) => {
                trace!(
                    index,
                    time = hit::tick_seconds(word) + f64::from(self.ctx.epoch),
                    "trigger config timestamp"
                );
                2
            }
            None => {
                self.out.errors.missing_word += 1;
                1
            }
        }
    }

    fn on_data_format(&mut self, index: usize, subtype: u16, detail: u16) {
        debug!(index, subtype, detail, "data format");
        self.ctx.format_subtype = subtype;
        self.ctx.format_detail = detail;
        // the next hit record after any format switch reflects firmware
        // initialization state, not a real event; arm the drop for it
        self.ctx.skip_first_hit = true;
    }

    fn on_page_header(
        &mut self,
        index: usize,
        num_words: u16,
        status: StreamStatus,
        source_id: u8,
    ) {
        debug!(index, num_words, ?status, source_id, "page header");
        match status {
            StreamStatus::Start => debug!(index, "start of stream flagged"),
            StreamStatus::Continuing => {}
            StreamStatus::Overflow => {
                warn!(index, "device buffer overflow");
                self.out.errors.buffer_overflow += 1;
            }
            StreamStatus::End => debug!(index, "end of stream flagged"),
        }
    }

    fn on_generic_string(&mut self, index: usize, num_words: u32) -> usize {
        let declared = num_words.max(1) as usize;
        let mut text = String::new();
        let mut truncated = false;
        for i in 1..declared {
            let Some(word) = self.words.get(index + i) else {
                truncated = true;
                break;
            };
            let bytes = word.to_le_bytes();
            if !bytes.iter().all(u8::is_ascii) {
                debug!(index = index + i, "cannot decode payload word to ascii");
                self.out.errors.ascii_decode += 1;
            }
            // keep whatever decodes; a partial string still parses
            text.extend(bytes.iter().filter(|b| b.is_ascii()).map(|&b| char::from(b)));
        }
        if truncated {
            self.out.errors.missing_word += 1;
        }

        let time = self.ctx.t0.unwrap_or(0.0);
        trace!(index, words = declared, time, text = text.as_str(), "generic string");
        if let Some(record) = calibration::parse(&text, time) {
            match record.kind {
                CorrectionKind::HighVoltage => {
                    if self.out.high_voltage.is_empty() {
                        debug!(index, time, "first HV correction");
                    }
                    self.ctx.hv_gate_pending = false;
                    self.out.high_voltage.push(record);
                }
                CorrectionKind::Threshold => {
                    if self.out.threshold.is_empty() {
                        debug!(index, time, "first threshold correction");
                    }
                    self.out.threshold.push(record);
                }
            }
        }

        if truncated {
            self.words.len() - index
        } else {
            declared
        }
    }
}

/// The most words `obj` could consume, used to defer objects that span a
/// chunk boundary until the rest of them arrives.
fn required_words(obj: Object, ctx: &Context) -> usize {
    match obj {
        Object::Hit { .. } => match ctx.format_subtype {
            FORMAT_TIMESTAMP_TOT_ADCS => 3,
            FORMAT_TIMESTAMP_TOT_ALL_CCRS => 17,
            _ => 1,
        },
        Object::TrigConfig { .. } => 2,
        Object::GenericString { num_words } => num_words.max(1) as usize,
        _ => 1,
    }
}
