use crate::model::participant::ParticipantId;
use serde::{Deserialize, Serialize};

/// Payload tracked on the topic for every subscribed participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    #[serde(rename = "user_id")]
    pub participant_id: ParticipantId,
    /// Epoch milliseconds.
    pub joined_at: u64,
}

impl PresenceRecord {
    pub fn new(participant_id: ParticipantId, joined_at: u64) -> Self {
        Self {
            participant_id,
            joined_at,
        }
    }
}
