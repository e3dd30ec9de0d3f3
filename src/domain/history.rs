//! Per-user ledger of completed order ids. Created lazily on the first
//! completed order; append-only except for the explicit refund-driven
//! removal path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderHistory {
    pub user_id: String,
    pub order_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderHistory {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            order_ids: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    /// Idempotent append; an id already present is left alone. Returns
    /// whether the ledger changed.
    pub fn append(&mut self, order_id: &str) -> bool {
        if self.order_ids.iter().any(|id| id == order_id) {
            return false;
        }
        self.order_ids.push(order_id.to_string());
        self.updated_at = Utc::now();
        true
    }

    /// Removes one id; a no-op when absent. Returns whether it was present.
    pub fn remove(&mut self, order_id: &str) -> bool {
        let before = self.order_ids.len();
        self.order_ids.retain(|id| id != order_id);
        let removed = self.order_ids.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_ignores_duplicates() {
        let mut history = OrderHistory::for_user("u1");
        assert!(history.append("o1"));
        assert!(!history.append("o1"));
        assert_eq!(history.order_ids, vec!["o1"]);
    }

    #[test]
    fn remove_is_a_noop_when_absent() {
        let mut history = OrderHistory::for_user("u1");
        history.append("o1");
        assert!(history.remove("o1"));
        assert!(!history.remove("o1"));
        assert!(history.order_ids.is_empty());
    }
}
