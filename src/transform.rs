/// Channel-order transform from OPC's RGB triplets to a serial output's
/// target `PixelFormat`. Runs before codec framing (`codec.rs`).
use crate::config::PixelFormat;

/// Transform a contiguous buffer of RGB triplets into the wire order
/// `format` expects. RGB and GRB/BGR are same-size in-place swaps;
/// RGBW/GRBW widen to stride 4, deriving white as `min(r, g, b)`.
///
/// `rgb` need not be a multiple of 3; any trailing partial triplet is
/// passed through unchanged, since a dispatcher-sliced payload may be
/// short (§4.7).
#[must_use]
pub fn transform(rgb: &[u8], format: PixelFormat) -> Vec<u8> {
    let full_triplets = rgb.len() / 3;
    let remainder = &rgb[full_triplets * 3..];

    match format {
        PixelFormat::Rgb => rgb.to_vec(),
        PixelFormat::Grb => {
            let mut out = rgb.to_vec();
            for i in 0..full_triplets {
                out.swap(i * 3, i * 3 + 1);
            }
            out
        }
        PixelFormat::Bgr => {
            let mut out = rgb.to_vec();
            for i in 0..full_triplets {
                out.swap(i * 3, i * 3 + 2);
            }
            out
        }
        PixelFormat::Rgbw | PixelFormat::Grbw => {
            let mut out = Vec::with_capacity(full_triplets * 4 + remainder.len());
            for i in 0..full_triplets {
                let r = rgb[i * 3];
                let g = rgb[i * 3 + 1];
                let b = rgb[i * 3 + 2];
                let w = r.min(g).min(b);
                if format == PixelFormat::Rgbw {
                    out.extend_from_slice(&[r - w, g - w, b - w, w]);
                } else {
                    out.extend_from_slice(&[g - w, r - w, b - w, w]);
                }
            }
            out.extend_from_slice(remainder);
            out
        }
    }
}
