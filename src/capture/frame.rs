//! Raw frame container handed from the capture layer to the decoder

use chrono::{DateTime, Utc};

/// A captured link-layer frame plus capture metadata.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Capture timestamp. An epoch-zero value means the source could not
    /// provide one; consumers substitute wall clock at ingestion.
    pub timestamp: DateTime<Utc>,

    /// Length of the packet as it appeared on the wire.
    pub original_len: u32,

    /// Bytes actually captured; smaller than `original_len` when the
    /// frame was truncated at the snap length.
    pub capture_len: u32,

    /// Captured bytes, starting at the Ethernet header.
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(timestamp: DateTime<Utc>, original_len: u32, data: Vec<u8>) -> Self {
        let capture_len = data.len() as u32;
        Self {
            timestamp,
            original_len,
            capture_len,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_len_tracks_data() {
        let frame = RawFrame::new(Utc::now(), 1500, vec![0u8; 96]);
        assert_eq!(frame.original_len, 1500);
        assert_eq!(frame.capture_len, 96);
    }
}
