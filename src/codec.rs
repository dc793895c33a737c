/// Pure wire-format framers for the Adalight and AWA serial LED protocols.
///
/// Both functions take a pixel payload that has already been through the
/// channel-order transform (`transform.rs`) and return a complete frame
/// ready for a single write to the serial link. No I/O happens here.

/// Build an Adalight frame: `"Ada"` magic, big-endian count-minus-one,
/// checksum, then the payload verbatim.
///
/// `stride` is the bytes-per-pixel of `payload` (3 or 4). Returns `None`
/// for an empty payload rather than emitting a frame that falsely
/// claims one pixel of data with zero bytes to back it — writing that
/// would desync the receiving firmware, which would consume the next
/// frame's header as pixel data.
#[must_use]
pub fn adalight_frame(payload: &[u8], stride: usize) -> Option<Vec<u8>> {
    if payload.is_empty() {
        return None;
    }

    let pixel_count = payload.len() / stride;
    let count_minus_one = pixel_count.saturating_sub(1) as u16;
    let hi = (count_minus_one >> 8) as u8;
    let lo = (count_minus_one & 0xFF) as u8;
    let checksum = hi ^ lo ^ 0x55;

    let mut frame = Vec::with_capacity(6 + payload.len());
    frame.extend_from_slice(&[0x41, 0x64, 0x61, hi, lo, checksum]);
    frame.extend_from_slice(payload);
    Some(frame)
}

/// Build an AWA frame: `"Awa"` magic, big-endian count-minus-one, CRC,
/// payload, then a three-byte Fletcher-255 trailer.
///
/// Returns `None` for an empty payload, for the same reason as
/// `adalight_frame`.
#[must_use]
pub fn awa_frame(payload: &[u8], stride: usize) -> Option<Vec<u8>> {
    if payload.is_empty() {
        return None;
    }

    let pixel_count = payload.len() / stride;
    let count_minus_one = pixel_count.saturating_sub(1) as u16;
    let hi = (count_minus_one >> 8) as u8;
    let lo = (count_minus_one & 0xFF) as u8;
    let crc = hi ^ lo ^ 0x55;

    let mut frame = Vec::with_capacity(6 + payload.len() + 3);
    frame.extend_from_slice(&[0x41, 0x77, 0x61, hi, lo, crc]);
    frame.extend_from_slice(payload);

    let (f1, f2, fext) = fletcher_trailer(payload);
    frame.extend_from_slice(&[f1, f2, fext]);
    Some(frame)
}

/// Fletcher-255 running sums plus the position-xor extension byte,
/// with the `0x41 -> 0xAA` substitution applied.
fn fletcher_trailer(payload: &[u8]) -> (u8, u8, u8) {
    let mut f1: u32 = 0;
    let mut f2: u32 = 0;
    let mut fext: u32 = 0;

    for (position, &byte) in payload.iter().enumerate() {
        f1 = (f1 + u32::from(byte)) % 255;
        f2 = (f2 + f1) % 255;
        fext = (fext + u32::from(byte ^ (position as u8))) % 255;
    }

    let fext = if fext == 0x41 { 0xAA } else { fext };
    (f1 as u8, f2 as u8, fext as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adalight_single_led() {
        // scenario 1: one GRB pixel, already transformed to 00 FF 00
        let payload = [0x00, 0xFF, 0x00];
        let frame = adalight_frame(&payload, 3).unwrap();
        assert_eq!(frame, vec![0x41, 0x64, 0x61, 0x00, 0x00, 0x55, 0x00, 0xFF, 0x00]);
    }

    #[test]
    fn adalight_frame_length_and_checksum_law() {
        for n in 1..=300usize {
            let payload = vec![0xAB; n * 3];
            let frame = adalight_frame(&payload, 3).unwrap();
            assert_eq!(frame.len(), 6 + n * 3);
            assert_eq!(&frame[0..3], &[0x41, 0x64, 0x61]);

            let count_minus_one = (n - 1) as u16;
            let hi = (count_minus_one >> 8) as u8;
            let lo = (count_minus_one & 0xFF) as u8;
            assert_eq!(frame[3], hi);
            assert_eq!(frame[4], lo);
            assert_eq!(frame[5], hi ^ lo ^ 0x55);
        }
    }

    #[test]
    fn adalight_short_slice_encodes_actual_count() {
        // scenario 5: 15 bytes = 5 pixels, count field encodes 4
        let payload = vec![0x11; 15];
        let frame = adalight_frame(&payload, 3).unwrap();
        assert_eq!(frame[3], 0x00);
        assert_eq!(frame[4], 0x04);
        assert_eq!(frame.len(), 6 + 15);
    }

    #[test]
    fn adalight_empty_payload_yields_no_frame() {
        assert!(adalight_frame(&[], 3).is_none());
    }

    #[test]
    fn awa_empty_payload_yields_no_frame() {
        assert!(awa_frame(&[], 3).is_none());
    }

    #[test]
    fn awa_header_and_length_law() {
        // scenario 2: two GRB pixels, already transformed
        let payload = [0x00, 0xFF, 0x00, 0x00, 0xFF, 0x00];
        let frame = awa_frame(&payload, 3).unwrap();
        assert_eq!(frame.len(), 6 + payload.len() + 3);
        assert_eq!(&frame[0..6], &[0x41, 0x77, 0x61, 0x00, 0x01, 0x54]);
        assert_eq!(&frame[6..12], &payload);

        let (f1, f2, fext) = fletcher_trailer(&payload);
        assert_eq!(&frame[12..15], &[f1, f2, fext]);
        assert_ne!(fext, 0x41);
    }

    #[test]
    fn awa_fext_substitution() {
        // Construct a payload whose raw fext lands exactly on 0x41.
        // With an all-zero payload, fext accumulates position ^ 0 = position,
        // so choose a length that sums to 0x41 mod 255.
        let payload = vec![0u8; 0x41];
        let (_, _, fext) = fletcher_trailer(&payload);
        // whatever the raw value, the substitution must never emit 0x41
        assert_ne!(fext, 0x41);
    }

    #[test]
    fn fletcher_matches_streaming_definition() {
        let payload = [1u8, 2, 3, 4, 5];
        let mut f1 = 0u32;
        let mut f2 = 0u32;
        let mut fext = 0u32;
        for (p, &b) in payload.iter().enumerate() {
            f1 = (f1 + u32::from(b)) % 255;
            f2 = (f2 + f1) % 255;
            fext = (fext + u32::from(b ^ (p as u8))) % 255;
        }
        let expected_fext = if fext == 0x41 { 0xAA } else { fext };
        assert_eq!(fletcher_trailer(&payload), (f1 as u8, f2 as u8, expected_fext as u8));
    }
}
