//! Poll types and the poll workflow state machine
//!
//! A poll collects donations in one currency. Its workflow runs
//! `open -> underway -> completed`, and either live state may instead move to
//! `expired`, at which point its funds are redistributed to other open polls
//! (see [`crate::core::poll_workflow`]).

use super::error::CanvassError;
use super::{PollId, UserId};
use crate::money::MoneyAmount;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a poll title
pub const MAXLEN_TITLE: usize = 60;

/// Poll workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    /// Accepting donations
    #[default]
    Open,
    /// Work has started; donations are closed
    Underway,
    /// Finished (terminal)
    Completed,
    /// Abandoned; funds moved elsewhere (terminal)
    Expired,
}

/// Events an administrator can apply to a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollEvent {
    Underway,
    Complete,
    Expire,
}

impl PollEvent {
    pub const ALL: [PollEvent; 3] = [PollEvent::Underway, PollEvent::Complete, PollEvent::Expire];
}

impl PollState {
    /// The state reached by applying `event`, if the pair is allowed
    ///
    /// # Arguments
    ///
    /// * `event` - The event to apply
    ///
    /// # Returns
    ///
    /// * `Some(state)` - The target state
    /// * `None` - If the event is not valid from this state
    pub fn transition(self, event: PollEvent) -> Option<PollState> {
        match (self, event) {
            (PollState::Open, PollEvent::Underway) => Some(PollState::Underway),
            (PollState::Underway, PollEvent::Complete) => Some(PollState::Completed),
            (PollState::Open | PollState::Underway, PollEvent::Expire) => Some(PollState::Expired),
            _ => None,
        }
    }

    /// Events that may be applied next, in listing order
    pub fn allowed_events(self) -> Vec<PollEvent> {
        PollEvent::ALL
            .into_iter()
            .filter(|event| self.transition(*event).is_some())
            .collect()
    }

    /// States reachable in one step
    pub fn allowed_states(self) -> Vec<PollState> {
        PollEvent::ALL
            .into_iter()
            .filter_map(|event| self.transition(event))
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PollState::Completed | PollState::Expired)
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PollState::Open => "open",
            PollState::Underway => "underway",
            PollState::Completed => "completed",
            PollState::Expired => "expired",
        })
    }
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PollEvent::Underway => "underway",
            PollEvent::Complete => "complete",
            PollEvent::Expire => "expire",
        })
    }
}

/// A fundraising poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    pub description: String,

    /// Currency code; fixed once the poll has votes
    pub currency: String,

    /// Exact sum of all paid donations to this poll
    pub total: MoneyAmount,

    /// Number of paid donations, including redistribution entries
    pub votes: u64,

    pub state: PollState,

    pub owner: UserId,
}

impl Poll {
    /// Create an open poll with zero total and votes
    pub fn new(id: PollId, title: &str, description: &str, currency: &str, owner: UserId) -> Self {
        Poll {
            id,
            title: title.to_string(),
            description: description.to_string(),
            currency: currency.to_string(),
            total: MoneyAmount::zero(),
            votes: 0,
            state: PollState::Open,
            owner,
        }
    }

    /// Check required fields and length limits
    pub fn validate(&self) -> Result<(), CanvassError> {
        if self.title.trim().is_empty() {
            return Err(CanvassError::validation("title", "can't be blank"));
        }
        if self.title.chars().count() > MAXLEN_TITLE {
            return Err(CanvassError::validation(
                "title",
                &format!("is too long (maximum is {} characters)", MAXLEN_TITLE),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(CanvassError::validation("description", "can't be blank"));
        }
        if self.currency.trim().is_empty() {
            return Err(CanvassError::validation("currency", "can't be blank"));
        }
        Ok(())
    }

    /// Label used in transition errors, e.g. "poll 3"
    pub fn entity(&self) -> String {
        format!("poll {}", self.id)
    }
}
