//! Announcement/frame bookkeeping for the MFD stream.

use std::collections::VecDeque;

use crate::protocol::{DisplayKind, FrameAnnouncement};
use crate::pubsub::ProtocolError;

/// Tracks which binary frames of the current batch are still expected.
///
/// The backend sends `{"list": [...]}` and then exactly one binary frame per
/// entry, in order. It waits for one acknowledgement per batch before sending
/// the next.
#[derive(Debug, Default)]
pub struct FrameBatch {
    pending: VecDeque<DisplayKind>,
}

impl FrameBatch {
    /// Empty batch, waiting for an announcement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether frames of an announced batch are outstanding.
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Handle a text frame, which must announce the next batch.
    pub fn announce(&mut self, text: &str) -> Result<(), ProtocolError> {
        if self.is_pending() {
            return Err(ProtocolError::UnexpectedText);
        }
        let announcement: FrameAnnouncement = serde_json::from_str(text)?;
        self.pending = announcement.list.into();
        Ok(())
    }

    /// Handle a binary frame. Returns its display and whether it closed the
    /// batch.
    pub fn accept(&mut self) -> Result<(DisplayKind, bool), ProtocolError> {
        let kind = self
            .pending
            .pop_front()
            .ok_or(ProtocolError::UnannouncedFrame)?;
        Ok((kind, self.pending.is_empty()))
    }
}
