//! Serial-link frame handling.
//!
//! Captures pulled straight off the device's serial link arrive as a
//! sequence of zero-delimited COBS-encoded frames. Each decoded frame
//! carries a 1-byte bus id, the payload words, and a 2-byte checksum.
//! Interleaved with data frames the link also produces a 5-byte
//! message-count control frame and "OK" command acknowledgements, both
//! of which are dropped here.

use tracing::{debug, warn};

use crate::{Error, Result};

/// Decoded length of the device "number of messages" control frame.
const MESSAGE_COUNT_LEN: usize = 5;

/// Bus-id prefix plus checksum trailer carried by every data frame.
const FRAME_OVERHEAD: usize = 3;

/// Recover the flat payload byte stream from a byte-stuffed capture.
///
/// Zero bytes are frame markers and are taken pairwise: the bytes between
/// the markers of a pair are one COBS-encoded frame. An odd marker count
/// is tolerated by dropping the final unpaired marker. Control and
/// acknowledgement frames are discarded; for data frames the bus id and
/// checksum are stripped and the interiors concatenated in stream order.
///
/// The checksum is stripped but not verified.
///
/// # Errors
/// [`Error::Framing`] if any frame interior fails COBS decoding, since a
/// bad frame leaves the word stream unrecoverable.
pub fn deframe(dat: &[u8]) -> Result<Vec<u8>> {
    let mut markers: Vec<usize> = dat
        .iter()
        .enumerate()
        .filter(|(_, &b)| b == 0)
        .map(|(i, _)| i)
        .collect();
    if markers.len() % 2 != 0 {
        warn!(
            markers = markers.len(),
            "odd frame marker count, dropping final unpaired marker"
        );
        markers.pop();
    }
    debug!(frames = markers.len() / 2, "deframing capture");

    let mut out = Vec::new();
    for pair in markers.chunks_exact(2) {
        let frame = cobs::decode_vec(&dat[pair[0] + 1..pair[1]])
            .map_err(|()| Error::Framing(format!("unstuffable frame at byte {}", pair[0])))?;

        if frame.len() == MESSAGE_COUNT_LEN {
            debug!(offset = pair[0], "skipping message-count frame");
            continue;
        }
        if contains_ok(&frame) {
            debug!(offset = pair[0], "skipping acknowledgement frame");
            continue;
        }
        if frame.len() < FRAME_OVERHEAD {
            warn!(
                offset = pair[0],
                len = frame.len(),
                "frame too short for bus id and checksum, skipping"
            );
            continue;
        }
        out.extend_from_slice(&frame[1..frame.len() - 2]);
    }
    Ok(out)
}

/// Strip the trailing 4-byte "OK" sentinel a raw hit dump may still carry.
#[must_use]
pub fn strip_trailing_ok(dat: &[u8]) -> &[u8] {
    if dat.len() >= 4 && contains_ok(&dat[dat.len() - 4..]) {
        debug!(tail = ?&dat[dat.len() - 4..], "stripping trailing OK sentinel");
        return &dat[..dat.len() - 4];
    }
    dat
}

fn contains_ok(dat: &[u8]) -> bool {
    dat.windows(2).any(|w| w == b"OK")
}
