//! Requests a view layer sends to the editor, and what the editor answers.

use crate::store::{CueAddress, CueKey};
use crate::vtt::{Cue, CueField};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Edit or playback request against the open document
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Seek the media to the cue's start
    Play(CueAddress),
    /// Set the cue's start to the current media position
    SetStart {
        address: CueAddress,
        position: Duration,
    },
    /// Set the cue's end to the current media position
    SetEnd {
        address: CueAddress,
        position: Duration,
    },
    Delete(CueAddress),
    /// Overwrite one field with raw text
    Update {
        address: CueAddress,
        field: CueField,
        value: String,
    },
    /// Replace the whole cue
    Replace { address: CueAddress, cue: Cue },
    /// Append a default cue at the media position
    Add { reference: Duration },
}

/// Result of a successfully applied [`Command`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The media layer should seek here
    Seek(Duration),
    Updated { index: usize },
    Added { index: usize, key: CueKey },
    Removed { index: usize, cue: Cue },
}

/// Button actions on a cue row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Play,
    SetStart,
    SetEnd,
    Delete,
}

/// `{action, index}` message from a cue row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueAction {
    pub action: ActionKind,
    pub index: usize,
    /// Key of the cue the view rendered at `index`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<CueKey>,
}

impl CueAction {
    /// Turn the message into a command; `position` is the current media time.
    #[must_use]
    pub const fn into_command(self, position: Duration) -> Command {
        let address = CueAddress {
            index: self.index,
            key: self.key,
        };
        match self.action {
            ActionKind::Play => Command::Play(address),
            ActionKind::SetStart => Command::SetStart { address, position },
            ActionKind::SetEnd => Command::SetEnd { address, position },
            ActionKind::Delete => Command::Delete(address),
        }
    }
}

/// `{index, cue}` message sent when a cue row's inputs change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueEdit {
    pub index: usize,
    pub cue: Cue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<CueKey>,
}

impl CueEdit {
    #[must_use]
    pub fn into_command(self) -> Command {
        Command::Replace {
            address: CueAddress {
                index: self.index,
                key: self.key,
            },
            cue: self.cue,
        }
    }
}
