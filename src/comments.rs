use std::collections::HashMap;

use tracing::info;

use crate::config::SiteConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::{Comment, Id, NewComment, RequestCtx, VoteType, ItemType, ROOT_PARENT};
use crate::store::Store;

/// Live score of a comment from its attached vote counts.
pub fn comment_score(c: &Comment) -> i64 {
    c.up - c.down
}

/// Per-level sibling ordering hook. Receives one sibling group and its
/// depth; reorders it in place.
pub type SiblingSort = dyn Fn(&mut Vec<Comment>, u32) + Send + Sync;

/// Default ordering: higher score first, ties broken by recency so that
/// equally-scored newer comments float above older ones.
pub fn default_sibling_sort(siblings: &mut Vec<Comment>, _level: u32) {
    siblings.sort_by(|a, b| {
        let (sa, sb) = (comment_score(a), comment_score(b));
        if sa == sb {
            b.ctime.cmp(&a.ctime)
        } else {
            sb.cmp(&sa)
        }
    });
}

/// The comment forest of one item, indexed by parent id. Built from a
/// single flat fetch of the whole thread; traversals are independent
/// restartable iterations over it.
pub struct CommentTree {
    byparent: HashMap<Id, Vec<Comment>>,
}

impl CommentTree {
    pub async fn load(store: &dyn Store, news_id: Id) -> CoreResult<Self> {
        let comments = store.thread_comments(news_id).await?;
        Ok(Self::from_comments(comments))
    }

    pub fn from_comments(comments: Vec<Comment>) -> Self {
        let mut byparent: HashMap<Id, Vec<Comment>> = HashMap::new();
        for c in comments {
            byparent.entry(c.parent_id).or_default().push(c);
        }
        Self { byparent }
    }

    pub fn is_empty(&self) -> bool {
        self.byparent.is_empty()
    }

    pub fn children(&self, parent_id: Id) -> Option<&[Comment]> {
        self.byparent.get(&parent_id).map(|v| v.as_slice())
    }

    /// Depth-first pre-order traversal of the whole forest with the default
    /// sibling ordering.
    pub fn iter(&self) -> ThreadIter<'_> {
        self.iter_from(ROOT_PARENT, &default_sibling_sort)
    }

    /// Traversal rooted at an arbitrary comment id with a caller-supplied
    /// sibling ordering. Levels are relative to the given root, starting
    /// at 0. Deleted comments are emitted only while they still have
    /// descendants; the caller renders those as redaction placeholders to
    /// keep the tree connected.
    pub fn iter_from<'a>(&'a self, root: Id, sort: &'a SiblingSort) -> ThreadIter<'a> {
        let mut iter = ThreadIter { tree: self, sort, stack: Vec::new() };
        iter.push_children(root, 0);
        iter
    }
}

pub struct ThreadEntry {
    pub comment: Comment,
    pub level: u32,
}

pub struct ThreadIter<'a> {
    tree: &'a CommentTree,
    sort: &'a SiblingSort,
    stack: Vec<(Comment, u32)>,
}

impl ThreadIter<'_> {
    fn push_children(&mut self, parent_id: Id, level: u32) {
        if let Some(children) = self.tree.byparent.get(&parent_id) {
            let mut siblings = children.clone();
            (self.sort)(&mut siblings, level);
            // reversed so the first sibling pops first
            for c in siblings.into_iter().rev() {
                self.stack.push((c, level));
            }
        }
    }
}

impl Iterator for ThreadIter<'_> {
    type Item = ThreadEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((comment, level)) = self.stack.pop() {
            let has_children = self.tree.byparent.contains_key(&comment.id);
            if has_children {
                self.push_children(comment.id, level + 1);
            }
            // a deleted leaf vanishes; a deleted inner node must still be
            // emitted so its descendants keep their position
            if !comment.del || has_children {
                return Some(ThreadEntry { comment, level });
            }
        }
        None
    }
}

/// Point lookup with an exact, ledger-derived score. Individual reads are
/// cheap, so this is the one place the denormalized field is never trusted.
pub async fn fetch_comment(store: &dyn Store, news_id: Id, comment_id: Id) -> CoreResult<Comment> {
    let mut comment = store.get_comment(news_id, comment_id).await?;
    comment.score = comment_score(&comment);
    Ok(comment)
}

pub async fn post_comment(
    store: &dyn Store,
    ctx: &RequestCtx,
    news_id: Id,
    parent_id: Id,
    body: &str,
    now: i64,
    cfg: &SiteConfig,
) -> CoreResult<Comment> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    let body = body.trim();
    if body.chars().count() < 2 {
        return Err(CoreError::validation("comment must be at least 2 characters long"));
    }
    if body.chars().count() > cfg.comment_max_length {
        return Err(CoreError::validation("comment too long"));
    }
    let comment = store
        .create_comment(NewComment {
            news_id,
            parent_id,
            user_id: user.id,
            body: body.to_string(),
            ctime: now,
        })
        .await?;
    info!(news_id, comment_id = comment.id, "comment posted");
    Ok(comment)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentEditOutcome {
    Updated,
    Deleted,
}

/// Owner-only edit. An empty body is equivalent to an explicit deletion.
pub async fn edit_comment(
    store: &dyn Store,
    ctx: &RequestCtx,
    news_id: Id,
    comment_id: Id,
    body: &str,
    cfg: &SiteConfig,
) -> CoreResult<CommentEditOutcome> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    let existing = store.get_comment(news_id, comment_id).await?;
    // a deleted comment stays deleted; editing it would desync the
    // item's comment count
    if existing.del {
        return Err(CoreError::NotFound);
    }
    if existing.user_id != user.id {
        return Err(CoreError::PermissionDenied);
    }
    let body = body.trim();
    if body.is_empty() {
        store.mark_comment_deleted(news_id, comment_id).await?;
        return Ok(CommentEditOutcome::Deleted);
    }
    if body.chars().count() > cfg.comment_max_length {
        return Err(CoreError::validation("comment too long"));
    }
    store.set_comment_body(news_id, comment_id, body).await?;
    Ok(CommentEditOutcome::Updated)
}

/// Soft-delete by the owner or an admin. The row is never removed; the
/// traversal decides whether it still renders as a placeholder.
pub async fn del_comment(
    store: &dyn Store,
    ctx: &RequestCtx,
    news_id: Id,
    comment_id: Id,
) -> CoreResult<()> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    let existing = store.get_comment(news_id, comment_id).await?;
    if existing.user_id != user.id && !user.is_admin() {
        return Err(CoreError::PermissionDenied);
    }
    store.mark_comment_deleted(news_id, comment_id).await?;
    Ok(())
}

/// Casts a vote on a comment; on success the denormalized score is
/// refreshed from the live counts. Returns false when the user already
/// voted on this comment.
pub async fn vote_comment(
    store: &dyn Store,
    ctx: &RequestCtx,
    news_id: Id,
    comment_id: Id,
    vote_type: VoteType,
    now: i64,
) -> CoreResult<bool> {
    let user = ctx.user.as_ref().ok_or(CoreError::PermissionDenied)?;
    // the comment must exist and be live before touching the ledger
    let comment = store.get_comment(news_id, comment_id).await?;
    if comment.del {
        return Err(CoreError::NotFound);
    }
    let cast = store
        .cast_vote(user.id, ItemType::Comment, comment_id, vote_type, now)
        .await?;
    if cast {
        let (up, down) = store.get_vote_counts(ItemType::Comment, comment_id).await?;
        store.set_comment_score(news_id, comment_id, up - down).await?;
    }
    Ok(cast)
}

pub async fn user_comments(
    store: &dyn Store,
    user_id: Id,
    start: i64,
    count: i64,
) -> CoreResult<(Vec<Comment>, i64)> {
    Ok(store.user_comments(user_id, start, count).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: Id, parent_id: Id, ctime: i64, up: i64, down: i64, del: bool) -> Comment {
        Comment {
            id,
            news_id: 1,
            parent_id,
            user_id: 1,
            username: "u".into(),
            body: format!("c{id}"),
            ctime,
            score: 0,
            up,
            down,
            del,
        }
    }

    #[test]
    fn preorder_with_levels() {
        // 1
        // ├── 2
        // │   └── 4
        // └── 3
        let tree = CommentTree::from_comments(vec![
            comment(1, ROOT_PARENT, 10, 1, 0, false),
            comment(2, 1, 20, 5, 0, false),
            comment(3, 1, 30, 1, 0, false),
            comment(4, 2, 40, 0, 0, false),
        ]);
        let order: Vec<(Id, u32)> = tree.iter().map(|e| (e.comment.id, e.level)).collect();
        assert_eq!(order, vec![(1, 0), (2, 1), (4, 2), (3, 1)]);
    }

    #[test]
    fn equal_scores_order_newest_first() {
        let tree = CommentTree::from_comments(vec![
            comment(1, ROOT_PARENT, 100, 2, 0, false),
            comment(2, ROOT_PARENT, 110, 2, 0, false),
        ]);
        let order: Vec<Id> = tree.iter().map(|e| e.comment.id).collect();
        assert_eq!(order, vec![2, 1], "ties break toward the newer comment");
    }

    #[test]
    fn higher_score_wins_over_recency() {
        let tree = CommentTree::from_comments(vec![
            comment(1, ROOT_PARENT, 100, 9, 0, false),
            comment(2, ROOT_PARENT, 200, 1, 0, false),
        ]);
        let order: Vec<Id> = tree.iter().map(|e| e.comment.id).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn deleted_leaf_is_skipped_deleted_parent_is_kept() {
        let tree = CommentTree::from_comments(vec![
            comment(1, ROOT_PARENT, 10, 0, 0, true), // deleted, has child
            comment(2, 1, 20, 0, 0, false),
            comment(3, ROOT_PARENT, 30, 0, 0, true), // deleted leaf
        ]);
        let order: Vec<Id> = tree.iter().map(|e| e.comment.id).collect();
        assert_eq!(order, vec![1, 2], "placeholder kept, deleted leaf dropped");
    }

    #[test]
    fn traversals_are_independent() {
        let tree = CommentTree::from_comments(vec![
            comment(1, ROOT_PARENT, 10, 0, 0, false),
            comment(2, 1, 20, 0, 0, false),
        ]);
        let first: Vec<Id> = tree.iter().map(|e| e.comment.id).collect();
        let second: Vec<Id> = tree.iter().map(|e| e.comment.id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn subthread_levels_start_at_zero() {
        let tree = CommentTree::from_comments(vec![
            comment(1, ROOT_PARENT, 10, 0, 0, false),
            comment(2, 1, 20, 0, 0, false),
            comment(3, 2, 30, 0, 0, false),
        ]);
        let order: Vec<(Id, u32)> = tree
            .iter_from(1, &default_sibling_sort)
            .map(|e| (e.comment.id, e.level))
            .collect();
        assert_eq!(order, vec![(2, 0), (3, 1)]);
    }
}
