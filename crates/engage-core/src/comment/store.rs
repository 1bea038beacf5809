//! The comment collection of one post.
//!
//! Comments are kept flat; the thread view (top-level slides plus one reply
//! list per top-level comment) is index data rebuilt on load and extended on
//! append. Every stored comment is in exactly one of the two. Replies that
//! cannot be placed on load are set aside in [`CommentStore::quarantined`].

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use super::{Placement, ThreadShapeError};
use crate::model::{Comment, CommentId, PostId};
use crate::remote::{FetchError, RemoteStore};

#[derive(Debug, Clone)]
pub struct CommentStore {
    post_id: PostId,
    comments: Vec<Comment>,
    by_id: HashMap<CommentId, usize>,
    top_level: Vec<usize>,
    replies: HashMap<CommentId, Vec<usize>>,
    quarantined: Vec<Comment>,
}

impl CommentStore {
    #[must_use]
    pub fn new(post_id: PostId) -> Self {
        Self {
            post_id,
            comments: Vec::new(),
            by_id: HashMap::new(),
            top_level: Vec::new(),
            replies: HashMap::new(),
            quarantined: Vec::new(),
        }
    }

    #[must_use]
    pub const fn post_id(&self) -> &PostId {
        &self.post_id
    }

    /// Replace the collection with the remote's comments for this post.
    ///
    /// On failure the current collection is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the remote read fails.
    pub fn load(&mut self, remote: &dyn RemoteStore) -> Result<&[Comment], FetchError> {
        let fetched = remote
            .fetch_comments(&self.post_id)
            .map_err(|err| FetchError::new("comments", &self.post_id, err))?;
        self.rebuild(fetched);
        info!(
            post = %self.post_id,
            comments = self.comments.len(),
            top_level = self.top_level.len(),
            quarantined = self.quarantined.len(),
            "loaded comments"
        );
        Ok(&self.comments)
    }

    fn rebuild(&mut self, mut fetched: Vec<Comment>) {
        fetched.retain(|comment| {
            let ours = comment.post_id == self.post_id;
            if !ours {
                warn!(
                    post = %self.post_id,
                    comment = %comment.id,
                    other = %comment.post_id,
                    "dropping comment addressed to another post"
                );
            }
            ours
        });
        fetched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut seen = HashSet::new();
        fetched.retain(|comment| seen.insert(comment.id.clone()));

        let top_ids: HashSet<CommentId> = fetched
            .iter()
            .filter(|c| c.is_top_level())
            .map(|c| c.id.clone())
            .collect();

        *self = Self::new(self.post_id.clone());
        for comment in fetched {
            let placeable = comment
                .parent_id
                .as_ref()
                .is_none_or(|parent| top_ids.contains(parent));
            if placeable {
                self.insert(comment);
            } else {
                warn!(
                    post = %self.post_id,
                    comment = %comment.id,
                    "quarantining reply without a top-level parent"
                );
                self.quarantined.push(comment);
            }
        }
    }

    /// Index `comment` at the end of its carousel. Caller has checked shape.
    fn insert(&mut self, comment: Comment) -> Placement {
        let slot = self.comments.len();
        self.by_id.insert(comment.id.clone(), slot);
        let placement = match &comment.parent_id {
            None => {
                self.top_level.push(slot);
                Placement::TopLevel {
                    index: self.top_level.len() - 1,
                }
            }
            Some(parent) => {
                let parent_index = self.top_level_position(parent).unwrap_or_default();
                let list = self.replies.entry(parent.clone()).or_default();
                list.push(slot);
                Placement::Reply {
                    parent_index,
                    index: list.len() - 1,
                }
            }
        };
        self.comments.push(comment);
        placement
    }

    /// Add a newly created comment. Never reorders or removes existing ones.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadShapeError`] if the comment belongs to another post,
    /// is already present, or replies to something other than a stored
    /// top-level comment.
    pub fn append(&mut self, comment: Comment) -> Result<Placement, ThreadShapeError> {
        if comment.post_id != self.post_id {
            return Err(ThreadShapeError::WrongPost {
                id: comment.id,
                expected: self.post_id.clone(),
                got: comment.post_id,
            });
        }
        if self.by_id.contains_key(&comment.id) {
            return Err(ThreadShapeError::Duplicate(comment.id));
        }
        if let Some(parent) = &comment.parent_id {
            match self.get(parent) {
                None => {
                    return Err(ThreadShapeError::MissingParent {
                        id: comment.id.clone(),
                        parent: parent.clone(),
                    });
                }
                Some(existing) if !existing.is_top_level() => {
                    return Err(ThreadShapeError::NestedReply {
                        id: comment.id.clone(),
                        parent: parent.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(self.insert(comment))
    }

    /// Top-level comments in ascending creation order.
    #[must_use]
    pub fn top_level(&self) -> Vec<&Comment> {
        self.top_level.iter().map(|&slot| &self.comments[slot]).collect()
    }

    /// Replies to `id` in ascending creation order.
    #[must_use]
    pub fn replies_of(&self, id: &CommentId) -> Vec<&Comment> {
        self.replies
            .get(id)
            .map(|slots| slots.iter().map(|&slot| &self.comments[slot]).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn reply_count(&self, id: &CommentId) -> usize {
        self.replies.get(id).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.by_id.get(id).map(|&slot| &self.comments[slot])
    }

    #[must_use]
    pub fn top_level_len(&self) -> usize {
        self.top_level.len()
    }

    #[must_use]
    pub fn top_level_at(&self, index: usize) -> Option<&Comment> {
        self.top_level.get(index).map(|&slot| &self.comments[slot])
    }

    /// The `index`-th reply of top-level slide `parent_index`.
    #[must_use]
    pub fn reply_at(&self, parent_index: usize, index: usize) -> Option<&Comment> {
        let parent = self.top_level_at(parent_index)?;
        let slot = *self.replies.get(&parent.id)?.get(index)?;
        Some(&self.comments[slot])
    }

    /// Current thread position of a stored comment.
    #[must_use]
    pub fn position_of(&self, id: &CommentId) -> Option<Placement> {
        let comment = self.get(id)?;
        match &comment.parent_id {
            None => self
                .top_level_position(id)
                .map(|index| Placement::TopLevel { index }),
            Some(parent) => {
                let parent_index = self.top_level_position(parent)?;
                let index = self
                    .replies
                    .get(parent)?
                    .iter()
                    .position(|&slot| &self.comments[slot].id == id)?;
                Some(Placement::Reply {
                    parent_index,
                    index,
                })
            }
        }
    }

    fn top_level_position(&self, id: &CommentId) -> Option<usize> {
        let slot = *self.by_id.get(id)?;
        self.top_level.iter().position(|&s| s == slot)
    }

    /// All comments in the thread.
    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Loaded replies whose parent was missing or was itself a reply.
    #[must_use]
    pub fn quarantined(&self) -> &[Comment] {
        &self.quarantined
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comment::fixtures::{POST, comment};
    use crate::remote::{MemoryRemote, RemoteOp};

    fn remote_with(comments: &[Comment]) -> MemoryRemote {
        let remote = MemoryRemote::new();
        for c in comments {
            remote.seed_comment(c.clone());
        }
        remote
    }

    fn loaded(comments: &[Comment]) -> CommentStore {
        let mut store = CommentStore::new(PostId::from(POST));
        store.load(&remote_with(comments)).expect("load");
        store
    }

    fn ids(comments: &[&Comment]) -> Vec<String> {
        comments.iter().map(|c| c.id.to_string()).collect()
    }

    #[test]
    fn splits_top_level_and_replies() {
        let store = loaded(&[
            comment("A", None, 1),
            comment("B", None, 2),
            comment("C", Some("A"), 3),
        ]);
        assert_eq!(ids(&store.top_level()), ["A", "B"]);
        assert_eq!(ids(&store.replies_of(&CommentId::from("A"))), ["C"]);
        assert!(store.replies_of(&CommentId::from("B")).is_empty());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn orders_by_creation_then_id() {
        let store = loaded(&[
            comment("late", None, 9),
            comment("b", None, 5),
            comment("a", None, 5),
            comment("r2", Some("a"), 8),
            comment("r1", Some("a"), 7),
        ]);
        assert_eq!(ids(&store.top_level()), ["a", "b", "late"]);
        assert_eq!(ids(&store.replies_of(&CommentId::from("a"))), ["r1", "r2"]);
    }

    #[test]
    fn quarantines_orphans_and_nested_replies() {
        let store = loaded(&[
            comment("A", None, 1),
            comment("R", Some("A"), 2),
            comment("RR", Some("R"), 3),
            comment("O", Some("ghost"), 4),
        ]);
        assert_eq!(store.len(), 2);
        let quarantined: Vec<&str> = store.quarantined().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(quarantined, ["RR", "O"]);
        assert!(store.get(&CommentId::from("RR")).is_none());
    }

    #[test]
    fn duplicates_keep_first_and_foreign_posts_are_dropped() {
        let mut foreign = comment("F", None, 1);
        foreign.post_id = PostId::from("other");
        let mut dup = comment("A", None, 5);
        dup.content = "second copy".into();

        let mut store = CommentStore::new(PostId::from(POST));
        store.rebuild(vec![comment("A", None, 2), dup, foreign]);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&CommentId::from("A")).map(|c| c.content.as_str()),
            Some("content of A")
        );
    }

    #[test]
    fn failed_load_keeps_existing_collection() {
        let remote = remote_with(&[comment("A", None, 1)]);
        let mut store = CommentStore::new(PostId::from(POST));
        store.load(&remote).expect("first load");

        remote.fail_next(RemoteOp::FetchComments, 1);
        let err = store.load(&remote).expect_err("second load fails");
        assert_eq!(err.code(), crate::ErrorCode::FetchFailed);
        assert_eq!(ids(&store.top_level()), ["A"]);
    }

    #[test]
    fn append_places_at_end_of_its_carousel() {
        let mut store = loaded(&[comment("A", None, 1), comment("B", None, 2)]);
        assert_eq!(
            store.append(comment("C", Some("B"), 3)),
            Ok(Placement::Reply {
                parent_index: 1,
                index: 0
            })
        );
        assert_eq!(
            store.append(comment("D", None, 4)),
            Ok(Placement::TopLevel { index: 2 })
        );
        assert_eq!(ids(&store.top_level()), ["A", "B", "D"]);
        assert_eq!(
            store.position_of(&CommentId::from("C")),
            Some(Placement::Reply {
                parent_index: 1,
                index: 0
            })
        );
        assert_eq!(store.reply_at(1, 0).map(|c| c.id.as_str()), Some("C"));
    }

    #[test]
    fn append_rejects_bad_shapes_without_mutating() {
        let mut store = loaded(&[comment("A", None, 1), comment("R", Some("A"), 2)]);
        let before = store.len();

        assert!(matches!(
            store.append(comment("A", None, 3)),
            Err(ThreadShapeError::Duplicate(_))
        ));
        assert!(matches!(
            store.append(comment("X", Some("ghost"), 3)),
            Err(ThreadShapeError::MissingParent { .. })
        ));
        assert!(matches!(
            store.append(comment("Y", Some("R"), 3)),
            Err(ThreadShapeError::NestedReply { .. })
        ));
        let mut foreign = comment("Z", None, 3);
        foreign.post_id = PostId::from("other");
        let err = store.append(foreign).expect_err("wrong post");
        assert_eq!(err.code(), crate::ErrorCode::ThreadShapeViolation);

        assert_eq!(store.len(), before);
    }

    #[test]
    fn every_comment_is_in_exactly_one_list() {
        let store = loaded(&[
            comment("A", None, 1),
            comment("B", None, 2),
            comment("a1", Some("A"), 3),
            comment("a2", Some("A"), 4),
            comment("b1", Some("B"), 5),
        ]);
        let mut seen: Vec<String> = ids(&store.top_level());
        for top in store.top_level() {
            for reply in store.replies_of(&top.id) {
                assert_eq!(reply.parent_id.as_ref(), Some(&top.id));
                seen.push(reply.id.to_string());
            }
        }
        seen.sort();
        let mut all: Vec<String> = store.comments().iter().map(|c| c.id.to_string()).collect();
        all.sort();
        assert_eq!(seen, all);
    }
}
