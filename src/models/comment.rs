//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PublicProfile;

/// Comment on a post; `parent_id` threads replies
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A comment with its author and replies
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<PublicProfile>,
    pub like_count: i64,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Build the reply tree from a flat, oldest-first list.
    ///
    /// Replies whose parent is missing (deleted) are promoted to the root.
    pub fn build_tree(nodes: Vec<CommentNode>) -> Vec<CommentNode> {
        use std::collections::HashMap;

        let ids: std::collections::HashSet<i64> = nodes.iter().map(|n| n.comment.id).collect();
        let mut children: HashMap<i64, Vec<CommentNode>> = HashMap::new();
        let mut roots = Vec::new();

        for node in nodes {
            match node.comment.parent_id {
                Some(parent) if ids.contains(&parent) => {
                    children.entry(parent).or_default().push(node)
                }
                _ => roots.push(node),
            }
        }

        fn attach(node: &mut CommentNode, children: &mut HashMap<i64, Vec<CommentNode>>) {
            if let Some(mut replies) = children.remove(&node.comment.id) {
                for reply in replies.iter_mut() {
                    attach(reply, children);
                }
                node.replies = replies;
            }
        }

        for root in roots.iter_mut() {
            attach(root, &mut children);
        }
        roots
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, parent_id: Option<i64>) -> CommentNode {
        let now = Utc::now();
        CommentNode {
            comment: Comment {
                id,
                post_id: 1,
                user_id: 1,
                parent_id,
                content: format!("comment {}", id),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
            author: None,
            like_count: 0,
            replies: Vec::new(),
        }
    }

    #[test]
    fn test_build_tree_nests_replies() {
        let tree = CommentNode::build_tree(vec![
            node(1, None),
            node(2, Some(1)),
            node(3, Some(2)),
            node(4, None),
        ]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].comment.id, 1);
        assert_eq!(tree[0].replies[0].comment.id, 2);
        assert_eq!(tree[0].replies[0].replies[0].comment.id, 3);
        assert!(tree[1].replies.is_empty());
    }

    #[test]
    fn test_orphans_become_roots() {
        let tree = CommentNode::build_tree(vec![node(5, Some(99))]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].comment.id, 5);
    }
}
