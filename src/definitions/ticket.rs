use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::StoreError, helpers::truncate};

use super::ticket_id::TicketId;

/// One attendee on an order and what they pay, in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub amount: u64,
}

impl LineItem {
    pub fn new(name: impl AsRef<str>, amount: u64) -> Self {
        Self {
            name: truncate(name.as_ref()),
            amount,
        }
    }
}

/// An order as submitted by the request layer, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub line_items: Vec<LineItem>,
}

impl TicketDraft {
    pub fn new(email: impl AsRef<str>) -> Self {
        Self {
            created_at: Utc::now(),
            email: truncate(email.as_ref().trim()),
            line_items: Vec::new(),
        }
    }

    pub fn item(mut self, name: impl AsRef<str>, amount: u64) -> Self {
        self.line_items.push(LineItem::new(name, amount));
        self
    }

    /// Sum of all line items, `None` on overflow.
    pub fn total(&self) -> Option<u64> {
        sum_amounts(&self.line_items)
    }

    /// Checks the draft against the configured amount bounds and returns the
    /// order total.
    pub fn validate(&self, min_amount: u64, max_amount: u64) -> Result<u64, StoreError> {
        if self.email.trim().is_empty() {
            return Err(StoreError::InvalidDraft(
                "Please provide an email address".to_string(),
            ));
        }
        if self.line_items.is_empty() {
            return Err(StoreError::InvalidDraft(format!(
                "Enter at least one name and an amount >= {min_amount}"
            )));
        }
        for (n, item) in self.line_items.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(StoreError::InvalidDraft(format!(
                    "Line item {} has no name",
                    n + 1
                )));
            }
            if item.amount < min_amount {
                return Err(StoreError::InvalidDraft(format!(
                    "Amount for {} must be >= {min_amount}",
                    item.name
                )));
            }
        }
        match self.total() {
            Some(total) if total <= max_amount => Ok(total),
            _ => Err(StoreError::InvalidDraft(format!(
                "Please enter a combined ticket price <= {max_amount}"
            ))),
        }
    }
}

/// A persisted ticket. The same shape is stored in both namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: TicketId,
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub line_items: Vec<LineItem>,
    pub total_amount: u64,
}

impl TicketRecord {
    /// Field lengths are capped here as well, so drafts built by hand or
    /// deserialized are stored in the same shape as builder-made ones.
    pub fn new(id: TicketId, draft: TicketDraft, total_amount: u64) -> Self {
        Self {
            id,
            created_at: draft.created_at,
            email: truncate(draft.email.trim()),
            line_items: draft
                .line_items
                .into_iter()
                .map(|item| LineItem::new(item.name, item.amount))
                .collect(),
            total_amount,
        }
    }

    /// A record is well-formed when it has an email, at least one line item
    /// and a total equal to the sum of its items.
    pub fn is_well_formed(&self) -> bool {
        !self.email.is_empty()
            && !self.line_items.is_empty()
            && sum_amounts(&self.line_items) == Some(self.total_amount)
    }
}

fn sum_amounts(items: &[LineItem]) -> Option<u64> {
    items
        .iter()
        .try_fold(0u64, |total, item| total.checked_add(item.amount))
}
