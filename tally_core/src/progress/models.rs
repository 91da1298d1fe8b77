use serde::{Deserialize, Serialize};

use crate::ChatId;

/// Location of an editable message on the transport side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat: ChatId,
    pub message_id: i64,
}

/// User-visible processing stages, in rough pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Transcribing,
    ReadingReceipt,
    Classifying,
    Logging,
    Summing,
    Replying,
}

impl Stage {
    /// The text shown in the status message while this stage is current.
    pub fn text(self) -> &'static str {
        match self {
            Self::Received => "Got it, one sec…",
            Self::Transcribing => "Transcribing your voice note…",
            Self::ReadingReceipt => "Reading your receipt…",
            Self::Classifying => "Figuring out what you meant…",
            Self::Logging => "Logging your transaction…",
            Self::Summing => "Crunching your numbers…",
            Self::Replying => "Writing a reply…",
        }
    }
}

/// What to do with a stage update that arrives while another edit is in
/// flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Drop it. Intermediate stages may be skipped under load; only the
    /// final displayed state matters to the user.
    #[default]
    DropWhileBusy,
    /// Keep a single replaceable pending slot; the in-flight updater drains
    /// it before releasing the session (latest wins, never a queue).
    CoalesceLatest,
}
