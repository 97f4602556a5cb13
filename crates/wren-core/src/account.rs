use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

/// A managed WhatsApp account as shown in the dashboard.
///
/// `phone` stays `None` until the engine reports the number on first
/// successful authentication. At most one account is active at a time;
/// `owner` is `None` for legacy accounts created before multi-user support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub owner: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
