use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a ticket id sits in its lifecycle. There is no way back and no
/// terminal failure state: an unpaid ticket stays pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    Absent,
    Pending,
    Paid,
}

impl TicketState {
    pub fn can_transition_to(self, next: TicketState) -> bool {
        matches!(
            (self, next),
            (TicketState::Absent, TicketState::Pending) | (TicketState::Pending, TicketState::Paid)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketState::Absent => "absent",
            TicketState::Pending => "pending",
            TicketState::Paid => "paid",
        }
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
