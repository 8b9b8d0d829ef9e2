//! Reply forest reconstruction for a post's comments.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::models::Comment;

/// A comment together with its direct replies, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentThread>,
}

impl CommentThread {
    pub fn leaf(comment: Comment) -> Self {
        Self {
            comment,
            replies: Vec::new(),
        }
    }
}

/// Assemble comments (oldest first) into a forest.
///
/// Every input comment appears exactly once in the output. Roots and reply
/// lists keep the input order. A reply whose parent is not in the input is
/// promoted to a root; so is any comment caught in a parent cycle. Nesting
/// depth is unbounded: the build walks an explicit stack and never recurses.
pub fn build_forest(comments: Vec<Comment>) -> Vec<CommentThread> {
    let n = comments.len();
    let index: HashMap<String, usize> = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.clone(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, comment) in comments.iter().enumerate() {
        let Some(parent_id) = comment.parent_comment_id.as_deref() else {
            roots.push(i);
            continue;
        };
        match index.get(parent_id) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => {
                tracing::warn!(
                    comment_id = %comment.id,
                    parent_comment_id = %parent_id,
                    post_id = %comment.post_id,
                    "Reply has no reachable parent; promoting it to a root"
                );
                roots.push(i);
            }
        }
    }

    // Walk from each root, recording which child edges were taken. Any
    // comment left unvisited sits on a cycle and becomes a root itself.
    let mut visited = vec![false; n];
    let mut attached: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut order = Vec::with_capacity(n);
    let mut tops = Vec::new();

    let mut walk = |start: usize, visited: &mut Vec<bool>| {
        visited[start] = true;
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            order.push(node);
            for &child in &children[node] {
                if !visited[child] {
                    visited[child] = true;
                    attached[node].push(child);
                    stack.push(child);
                }
            }
        }
    };

    for &root in &roots {
        walk(root, &mut visited);
        tops.push(root);
    }
    for i in 0..n {
        if !visited[i] {
            tracing::warn!(comment_id = %comments[i].id, "Comment parent chain loops; promoting it to a root");
            walk(i, &mut visited);
            tops.push(i);
        }
    }
    tops.sort_unstable();

    // Children are always popped after their parent, so the reversed visit
    // order builds every reply before the comment that owns it.
    let mut pending: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentThread>> = (0..n).map(|_| None).collect();
    for &node in order.iter().rev() {
        let replies = attached[node]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        if let Some(comment) = pending[node].take() {
            built[node] = Some(CommentThread { comment, replies });
        }
    }

    tops.into_iter()
        .filter_map(|root| built[root].take())
        .collect()
}
