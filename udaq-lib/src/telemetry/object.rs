//! Telemetry object classification.
//!
//! Every object in the word stream is introduced by the top byte of its
//! leading word. Tags below `0xe0` are hit time-delta words; the rest
//! select protocol objects, some matched exactly and some through a mask.

use serde::{Deserialize, Serialize};

const CODE_PPS_SECOND: u8 = 0xe0;
const CODE_PPS_YEAR: u8 = 0xe4;
const CODE_TRIG_CONFIG: u8 = 0xe5;
const CODE_DATA_FORMAT: u8 = 0xe6;
const CODE_PAGE_HEADER: u8 = 0xe7;
const CODE_GENERIC: u8 = 0xf0;

const MASK_PPS_SECOND: u8 = 0xfc;
const MASK_GENERIC: u8 = 0xf0;

/// Status bit set in a TRIG_CONFIG word while the CPU trigger is active.
const STATUS_CPUTRIG_ACTIVE: u32 = 1 << 5;

/// Deprecated timestamp-only hit encoding.
pub const FORMAT_TIMESTAMP: u16 = 1;
/// Timestamp plus time-over-threshold and ADC samples; the format this
/// data class is always configured for.
pub const FORMAT_TIMESTAMP_TOT_ADCS: u16 = 2;
/// Full charge-comparator readout; 17 words, never expected here.
pub const FORMAT_TIMESTAMP_TOT_ALL_CCRS: u16 = 3;

/// 2-bit stream status reported by a page header.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Start,
    Continuing,
    Overflow,
    End,
}

impl StreamStatus {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => StreamStatus::Start,
            1 => StreamStatus::Continuing,
            2 => StreamStatus::Overflow,
            _ => StreamStatus::End,
        }
    }
}

/// One protocol object classified from its leading word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Object {
    /// Hit time-delta word; payload layout depends on the active data format.
    Hit { delta: u32 },
    /// Whole-second epoch from the PPS input (26-bit counter).
    PpsSecond { seconds: u32 },
    PpsYear { year: u16 },
    /// Trigger configuration; one more word follows with a timestamp.
    TrigConfig { cpu_trigger: bool },
    /// Hit data format selector.
    DataFormat { subtype: u16, detail: u16 },
    PageHeader {
        num_words: u16,
        status: StreamStatus,
        source_id: u8,
    },
    /// Embedded ASCII payload spanning `num_words` words in total.
    GenericString { num_words: u32 },
    Unknown { tag: u8 },
}

impl Object {
    /// Classify `word` by its type tag.
    ///
    /// Hit words are matched first since the masked tests only apply to
    /// tags at `0xe0` and above.
    #[must_use]
    pub fn classify(word: u32) -> Self {
        let tag = (word >> 24) as u8;
        if tag < 0xe0 {
            return Object::Hit { delta: word };
        }
        match tag {
            CODE_PPS_YEAR => Object::PpsYear { year: word as u16 },
            t if t & MASK_PPS_SECOND == CODE_PPS_SECOND => Object::PpsSecond {
                seconds: word & 0x03ff_ffff,
            },
            CODE_DATA_FORMAT => Object::DataFormat {
                subtype: ((word >> 16) & 0xff) as u16,
                detail: word as u16,
            },
            CODE_TRIG_CONFIG => Object::TrigConfig {
                cpu_trigger: word & STATUS_CPUTRIG_ACTIVE != 0,
            },
            CODE_PAGE_HEADER => Object::PageHeader {
                num_words: ((word >> 10) & 0x3fff) as u16,
                status: StreamStatus::from_bits(word >> 8),
                source_id: (word & 0xff) as u8,
            },
            t if t & MASK_GENERIC == CODE_GENERIC => Object::GenericString {
                num_words: word & 0x00ff_ffff,
            },
            _ => Object::Unknown { tag },
        }
    }
}
