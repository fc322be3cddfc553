use bytes::Bytes;
use chrono::{DateTime, Utc};

/// One encoded JPEG frame handed from the camera encoder to stream readers.
#[derive(Debug, Clone)]
pub struct JpegFrame {
    pub data: Bytes,
    /// Assigned by the frame slot on write; strictly increasing.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl JpegFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            sequence: 0,
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
