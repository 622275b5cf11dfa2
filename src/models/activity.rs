//! Activity taxonomy (self-referencing tree)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityNode {
    #[serde(flatten)]
    pub activity: Activity,
    pub children: Vec<ActivityNode>,
}

impl ActivityNode {
    /// Assemble a forest from a flat list
    pub fn build_tree(activities: Vec<Activity>) -> Vec<ActivityNode> {
        fn children_of(parent: Option<i64>, all: &[Activity]) -> Vec<ActivityNode> {
            all.iter()
                .filter(|a| a.parent_id == parent)
                .map(|a| ActivityNode {
                    activity: a.clone(),
                    children: children_of(Some(a.id), all),
                })
                .collect()
        }
        children_of(None, &activities)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateActivityInput {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub icon: Option<String>,
}
