use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque account identifier.
///
/// Registries, caches and sync state are all keyed by this newtype so an
/// account id can never be confused with a chat id or a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Engine-native chat identifier: `<digits>@c.us` for private chats,
/// `<id>@g.us` for groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_group(&self) -> bool {
        self.0.ends_with("@g.us")
    }

    pub fn is_user(&self) -> bool {
        self.0.ends_with("@c.us")
    }

    /// Phone number for private chats, when the id stem is all digits.
    pub fn phone(&self) -> Option<&str> {
        if !self.is_user() {
            return None;
        }
        let stem = self.stem();
        if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) {
            Some(stem)
        } else {
            None
        }
    }

    /// Bare id without the server suffix, used as a last-resort display name.
    pub fn stem(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChatId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_chat_has_phone() {
        let id = ChatId::from("5511999999999@c.us");
        assert!(id.is_user());
        assert!(!id.is_group());
        assert_eq!(id.phone(), Some("5511999999999"));
    }

    #[test]
    fn group_chat_has_no_phone() {
        let id = ChatId::from("120363041234567890@g.us");
        assert!(id.is_group());
        assert_eq!(id.phone(), None);
        assert_eq!(id.stem(), "120363041234567890");
    }

    #[test]
    fn non_numeric_stem_is_not_a_phone() {
        let id = ChatId::from("status@c.us");
        assert_eq!(id.phone(), None);
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = AccountId::from("acc1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"acc1\"");
    }
}
