//! Group model (city communities, professional circles, interests)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
    /// URL-friendly identifier (unique)
    pub slug: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub group_type: GroupType,
    pub city: Option<String>,
    pub country: Option<String>,
    pub created_by: i64,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

string_enum! {
    pub enum GroupType {
        City => "city",
        Professional => "professional",
        Interest => "interest",
    }
}

impl Default for GroupType {
    fn default() -> Self {
        Self::Interest
    }
}

string_enum! {
    pub enum GroupMemberRole {
        Admin => "admin",
        Member => "member",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupMember {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub role: GroupMemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group_type: GroupType,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGroupInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub group_type: Option<GroupType>,
    pub city: Option<String>,
    pub country: Option<String>,
}
