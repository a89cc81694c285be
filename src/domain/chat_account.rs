use serde::{Deserialize, Serialize};

/// A user's linked chat recipient. The core only reads this and may flip
/// `is_active` to `false` on a permanent delivery failure; it never creates
/// accounts (that's the account-linking flow, out of scope here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAccount {
    pub user_id: String,
    pub chat_id: String,
    pub is_active: bool,
}
