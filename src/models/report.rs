//! Content reports and their type taxonomy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReportType {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportTypeNode {
    #[serde(flatten)]
    pub report_type: ReportType,
    pub children: Vec<ReportTypeNode>,
}

impl ReportTypeNode {
    pub fn build_tree(types: Vec<ReportType>) -> Vec<ReportTypeNode> {
        let ids: std::collections::HashSet<i64> = types.iter().map(|t| t.id).collect();
        let mut roots: Vec<ReportTypeNode> = Vec::new();
        let mut pending: Vec<ReportType> = Vec::new();

        for t in types {
            match t.parent_id {
                Some(parent) if ids.contains(&parent) => pending.push(t),
                _ => roots.push(ReportTypeNode {
                    report_type: t,
                    children: Vec::new(),
                }),
            }
        }

        fn insert(nodes: &mut [ReportTypeNode], item: &ReportType) -> bool {
            for node in nodes.iter_mut() {
                if Some(node.report_type.id) == item.parent_id {
                    node.children.push(ReportTypeNode {
                        report_type: item.clone(),
                        children: Vec::new(),
                    });
                    return true;
                }
                if insert(&mut node.children, item) {
                    return true;
                }
            }
            false
        }

        // Parents may appear after their children; retry until no progress.
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|item| !insert(&mut roots, item));
            if pending.len() == before {
                break;
            }
        }
        roots
    }
}

string_enum! {
    pub enum ReportTargetType {
        Post => "post",
        Comment => "comment",
        User => "user",
        Event => "event",
        Group => "group",
        Housing => "housing",
        Message => "message",
    }
}

string_enum! {
    pub enum ReportStatus {
        Open => "open",
        Resolved => "resolved",
        Dismissed => "dismissed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Report {
    pub id: i64,
    pub reporter_id: i64,
    pub report_type_id: i64,
    #[sqlx(try_from = "String")]
    pub target_type: ReportTargetType,
    pub target_id: i64,
    pub description: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ReportStatus,
    pub resolved_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReportInput {
    pub report_type_id: i64,
    pub target_type: ReportTargetType,
    pub target_id: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReportTypeInput {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt(id: i64, parent_id: Option<i64>) -> ReportType {
        let now = Utc::now();
        ReportType {
            id,
            parent_id,
            name: format!("type {}", id),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_tree_handles_out_of_order_parents() {
        let tree = ReportTypeNode::build_tree(vec![rt(3, Some(2)), rt(2, Some(1)), rt(1, None)]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children[0].report_type.id, 2);
        assert_eq!(tree[0].children[0].children[0].report_type.id, 3);
    }
}
