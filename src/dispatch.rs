/// Routes a parsed OPC pixel record to the serial outputs whose
/// configured channel matches, slicing the payload by each output's
/// `opc_offset`/`led_count` (§4.7).
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::output::OutputHandle;

/// Owns the full set of opened outputs and the process-wide frame
/// counters. The ingress loop and the stats loop both hold an `Arc` to
/// this; outputs are only ever enqueued into, never removed, for the
/// life of the process.
pub struct Dispatcher {
    outputs: Vec<OutputHandle>,
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(outputs: Vec<OutputHandle>) -> Self {
        Self {
            outputs,
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn outputs(&self) -> &[OutputHandle] {
        &self.outputs
    }

    /// Consume the dispatcher and hand back ownership of its outputs,
    /// for the shutdown routine to close each by value.
    #[must_use]
    pub fn into_outputs(self) -> Vec<OutputHandle> {
        self.outputs
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Distribute one OPC pixel record to every matching output.
    ///
    /// Channel 0 broadcasts only to outputs configured for channel 0
    /// (not a wildcard into other channels, per §4.7).
    pub fn dispatch(&self, channel: u8, payload: &[u8]) {
        for output in &self.outputs {
            if !channel_matches(output.config.opc_channel, channel) {
                continue;
            }

            let offset_bytes = output.config.opc_offset * 3;
            let need = output.config.led_count * 3;
            let slice = slice_for_output(payload, offset_bytes, need);

            trace!(
                port = %output.config.port,
                channel,
                slice_len = slice.len(),
                "dispatching slice to output"
            );

            output.submit(slice.to_vec());
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of `(frames_received, frames_sent)` since the last call
    /// to `reset_counters` (§4.8's periodic-reset stats window).
    #[must_use]
    pub fn take_counters(&self) -> (u64, u64) {
        (
            self.frames_received.swap(0, Ordering::Relaxed),
            self.frames_sent.swap(0, Ordering::Relaxed),
        )
    }
}

fn channel_matches(output_channel: u8, record_channel: u8) -> bool {
    if output_channel == record_channel {
        return true;
    }
    // Broadcast: channel 0 records only reach outputs configured for
    // channel 0. This is not a wildcard into non-zero output channels.
    false
}

/// Never pads with zeros: a short or out-of-range slice is returned
/// as-is, possibly empty (§4.7).
fn slice_for_output(payload: &[u8], offset_bytes: usize, need: usize) -> &[u8] {
    if offset_bytes >= payload.len() {
        return &[];
    }
    let end = (offset_bytes + need).min(payload.len());
    &payload[offset_bytes..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_matches_exact() {
        assert!(channel_matches(5, 5));
        assert!(!channel_matches(5, 6));
    }

    #[test]
    fn channel_zero_is_broadcast_only_to_zero_outputs() {
        assert!(channel_matches(0, 0));
        assert!(!channel_matches(1, 0));
    }

    #[test]
    fn slice_law_exact_fit() {
        let payload: Vec<u8> = (0..90u8).collect();
        let slice = slice_for_output(&payload, 0, 30);
        assert_eq!(slice, &payload[0..30]);
        let slice = slice_for_output(&payload, 30, 30);
        assert_eq!(slice, &payload[30..60]);
    }

    #[test]
    fn slice_law_short_payload() {
        let payload = vec![1u8; 15];
        let slice = slice_for_output(&payload, 0, 30);
        assert_eq!(slice.len(), 15);
    }

    #[test]
    fn slice_law_offset_past_end_is_empty() {
        let payload = vec![1u8; 10];
        let slice = slice_for_output(&payload, 20, 30);
        assert_eq!(slice.len(), 0);
    }

    #[test]
    fn slice_law_offset_inside_but_need_overruns() {
        let payload = vec![1u8; 20];
        let slice = slice_for_output(&payload, 15, 30);
        assert_eq!(slice.len(), 5);
    }
}
