//! `AudioFrameRouter` — MQTT-gateway in-band audio header framing and the
//! bounded reorder buffer that sits in front of `ASRSession`.
//!
//! Only applies when the connection's `from_mqtt_gateway` flag is set;
//! direct (non-gateway) device connections send bare opus frames.

use std::collections::BTreeMap;

use gateway_core::OverflowPolicy;

/// 16-byte big-endian in-band audio header: `[type:1][reserved:1]
/// [payload_len:2][sequence:4][timestamp_ms:4][opus_len:4]`.
pub const HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: u8,
    pub payload_len: u16,
    pub sequence: u32,
    pub timestamp_ms: u32,
    pub opus_len: u32,
}

impl FrameHeader {
    #[must_use]
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        Self {
            frame_type: bytes[0],
            payload_len: u16::from_be_bytes([bytes[2], bytes[3]]),
            sequence: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            timestamp_ms: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            opus_len: u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    #[must_use]
    pub fn encode(frame_type: u8, sequence: u32, timestamp_ms: u32, opus_len: u32) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = frame_type;
        out[1] = 0;
        out[2..4].copy_from_slice(&(opus_len as u16).to_be_bytes());
        out[4..8].copy_from_slice(&sequence.to_be_bytes());
        out[8..12].copy_from_slice(&timestamp_ms.to_be_bytes());
        out[12..16].copy_from_slice(&opus_len.to_be_bytes());
        out
    }
}

/// Wraps one outbound opus packet with the 16-byte header, for MQTT-gateway
/// egress (spec §4.10).
#[must_use]
pub fn wrap_egress_frame(opus: &[u8], frame_type: u8, sequence: u32, timestamp_ms: u32) -> Vec<u8> {
    let opus_len = opus.len() as u32;
    let mut out = Vec::with_capacity(HEADER_LEN + opus.len());
    out.extend_from_slice(&FrameHeader::encode(frame_type, sequence, timestamp_ms, opus_len));
    out.extend_from_slice(opus);
    out
}

/// A bounded, timestamp-keyed reorder buffer with liveness-favoring
/// overflow behavior (spec §4.2, §9 open question (a)).
pub struct ReorderBuffer {
    cap: usize,
    policy: OverflowPolicy,
    last_delivered: Option<u32>,
    buffered: BTreeMap<u32, Vec<u8>>,
}

impl ReorderBuffer {
    #[must_use]
    pub fn new(cap: usize, policy: OverflowPolicy) -> Self {
        Self {
            cap,
            policy,
            last_delivered: None,
            buffered: BTreeMap::new(),
        }
    }

    /// Feed one decoded audio payload at `timestamp_ms`. Returns the
    /// payloads to deliver to ASR immediately, in delivery order (normally
    /// zero or one; the overflow-immediate policy can yield one payload
    /// from the buffer alongside the new one).
    pub fn feed(&mut self, timestamp_ms: u32, payload: Vec<u8>) -> Vec<Vec<u8>> {
        let in_order = match self.last_delivered {
            None => true,
            Some(last) => timestamp_ms >= last,
        };

        if in_order {
            self.last_delivered = Some(timestamp_ms);
            return vec![payload];
        }

        if self.buffered.len() >= self.cap {
            return match self.policy {
                OverflowPolicy::DeliverImmediately => vec![payload],
                OverflowPolicy::DropNewest => Vec::new(),
            };
        }

        self.buffered.insert(timestamp_ms, payload);
        Vec::new()
    }

    /// Flush whatever is left in the buffer, in ascending timestamp order.
    /// Called at turn/stream end so no frame is ever silently lost.
    pub fn drain_remaining(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.buffered).into_values().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }
}

/// Decode one inbound MQTT-gateway binary frame into its audio payload, per
/// the policy in spec §4.2. Returns `None` when the frame is dropped.
#[must_use]
pub fn strip_or_extract(frame: &[u8]) -> Option<(Option<FrameHeader>, &[u8])> {
    if frame.len() >= HEADER_LEN {
        let mut header_bytes = [0u8; HEADER_LEN];
        header_bytes.copy_from_slice(&frame[..HEADER_LEN]);
        let header = FrameHeader::decode(&header_bytes);
        let opus_len = header.opus_len as usize;
        if opus_len > 0 && frame.len() >= HEADER_LEN + opus_len {
            return Some((Some(header), &frame[HEADER_LEN..HEADER_LEN + opus_len]));
        }
        if frame.len() > HEADER_LEN {
            return Some((Some(header), &frame[HEADER_LEN..]));
        }
        return None;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_encode_decode() {
        let bytes = FrameHeader::encode(1, 7, 123_456, 42);
        let decoded = FrameHeader::decode(&bytes);
        assert_eq!(decoded.sequence, 7);
        assert_eq!(decoded.timestamp_ms, 123_456);
        assert_eq!(decoded.opus_len, 42);
    }

    #[test]
    fn short_frame_is_dropped() {
        let frame = [0u8; 10];
        assert!(strip_or_extract(&frame).is_none());
    }

    #[test]
    fn frame_exactly_header_length_is_dropped() {
        let frame = [0u8; HEADER_LEN];
        assert!(strip_or_extract(&frame).is_none());
    }

    #[test]
    fn reorder_buffer_delivers_in_order_ts_immediately() {
        let mut buffer = ReorderBuffer::new(20, OverflowPolicy::DeliverImmediately);
        assert_eq!(buffer.feed(10, vec![10]), vec![vec![10]]);
        assert_eq!(buffer.feed(30, vec![30]), vec![vec![30]]);
    }

    #[test]
    fn s2_reorder_scenario_matches_spec_trace() {
        // Feed ts sequence [10, 30, 20, 40]; 20 arrives after 30 was already
        // delivered, so it is buffered, not re-inserted into the live
        // stream, and only surfaces via drain_remaining.
        let mut buffer = ReorderBuffer::new(20, OverflowPolicy::DeliverImmediately);
        let mut delivered = Vec::new();
        delivered.extend(buffer.feed(10, vec![1]));
        delivered.extend(buffer.feed(30, vec![3]));
        delivered.extend(buffer.feed(20, vec![2]));
        delivered.extend(buffer.feed(40, vec![4]));
        assert_eq!(delivered, vec![vec![1], vec![3], vec![4]]);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.drain_remaining(), vec![vec![2]]);
    }

    #[test]
    fn overflow_with_deliver_immediately_policy_lets_the_new_frame_through() {
        let mut buffer = ReorderBuffer::new(1, OverflowPolicy::DeliverImmediately);
        buffer.feed(100, vec![100]);
        buffer.feed(10, vec![10]); // out of order, fills the single slot
        let out = buffer.feed(5, vec![5]); // out of order again, buffer full
        assert_eq!(out, vec![vec![5]]);
    }

    #[test]
    fn overflow_with_drop_newest_policy_discards_the_new_frame() {
        let mut buffer = ReorderBuffer::new(1, OverflowPolicy::DropNewest);
        buffer.feed(100, vec![100]);
        buffer.feed(10, vec![10]);
        let out = buffer.feed(5, vec![5]);
        assert!(out.is_empty());
    }
}
