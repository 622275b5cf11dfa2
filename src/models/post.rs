//! Post ("memory") model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A memory shared by a dancer, optionally tied to a group, event or activity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub event_id: Option<i64>,
    pub activity_id: Option<i64>,
    pub content: String,
    pub location: Option<String>,
    #[sqlx(try_from = "String")]
    pub visibility: Visibility,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Whether `viewer` may read this post given the friendship between them.
    pub fn visible_to(&self, viewer_id: Option<i64>, are_friends: bool) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Friends => viewer_id == Some(self.user_id) || are_friends,
            Visibility::Private => viewer_id == Some(self.user_id),
        }
    }
}

string_enum! {
    pub enum Visibility {
        Public => "public",
        Friends => "friends",
        Private => "private",
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Public
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub content: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub event_id: Option<i64>,
    #[serde(default)]
    pub activity_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub content: Option<String>,
    pub location: Option<String>,
    pub visibility: Option<Visibility>,
    pub activity_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(visibility: Visibility) -> Post {
        let now = Utc::now();
        Post {
            id: 1,
            user_id: 10,
            group_id: None,
            event_id: None,
            activity_id: None,
            content: "Great milonga".into(),
            location: None,
            visibility,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_public_visible_to_everyone() {
        assert!(post(Visibility::Public).visible_to(None, false));
    }

    #[test]
    fn test_friends_visibility() {
        let p = post(Visibility::Friends);
        assert!(p.visible_to(Some(10), false));
        assert!(p.visible_to(Some(11), true));
        assert!(!p.visible_to(Some(11), false));
        assert!(!p.visible_to(None, false));
    }

    #[test]
    fn test_private_visibility() {
        let p = post(Visibility::Private);
        assert!(p.visible_to(Some(10), false));
        assert!(!p.visible_to(Some(11), true));
    }

    #[test]
    fn test_create_input_defaults_to_public() {
        let input: CreatePostInput = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(input.visibility, Visibility::Public);
    }
}
