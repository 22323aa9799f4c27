//! Flat comment list to nested reply forest.
//!
//! Comments are indexed into an arena and linked by position, so the builder
//! never holds back-pointers and never recurses. Replies whose parent is not
//! in the snapshot (deleted, or on another post) become roots. Parent chains
//! that loop are cut: every comment on the loop becomes a root and the cut is
//! logged as a data-integrity problem.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::comment::{CommentTree, CommentWithUser};

/// Output of [`build_forest`].
#[derive(Debug, Default)]
pub struct Forest {
    pub roots: Vec<CommentTree>,
    /// Ids detached from their parent because their ancestor chain looped.
    pub broken_cycles: Vec<i64>,
}

/// Builds the reply forest for one post, oldest first at every level.
pub fn build_tree(comments: Vec<CommentWithUser>) -> Vec<CommentTree> {
    build_forest(comments).roots
}

/// Like [`build_tree`], also reporting comments that were promoted because of a cycle.
pub fn build_forest(comments: Vec<CommentWithUser>) -> Forest {
    let arena = dedupe(comments);
    if arena.is_empty() {
        return Forest::default();
    }

    let index: HashMap<i64, usize> = arena
        .iter()
        .enumerate()
        .map(|(pos, c)| (c.comment.id, pos))
        .collect();

    let mut parent = resolve_parents(&arena, &index);
    let broken_cycles = cut_cycles(&arena, &mut parent);

    // Link and order.
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); arena.len()];
    let mut roots: Vec<usize> = Vec::new();
    for (pos, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(pos),
            None => roots.push(pos),
        }
    }
    let by_time = |a: &usize, b: &usize| display_order(&arena[*a], &arena[*b]);
    roots.sort_by(by_time);
    for list in children.iter_mut() {
        list.sort_by(by_time);
    }

    // Post-order walk so every child is finished before its parent.
    let mut order: Vec<usize> = Vec::with_capacity(arena.len());
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|r| (*r, false)).collect();
    while let Some((pos, expanded)) = stack.pop() {
        if expanded {
            order.push(pos);
        } else {
            stack.push((pos, true));
            stack.extend(children[pos].iter().rev().map(|c| (*c, false)));
        }
    }

    let mut slots: Vec<Option<CommentWithUser>> = arena.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentTree>> = (0..slots.len()).map(|_| None).collect();
    for pos in order {
        let replies = children[pos]
            .iter()
            .filter_map(|c| built[*c].take())
            .collect();
        if let Some(comment) = slots[pos].take() {
            built[pos] = Some(CommentTree { comment, replies });
        }
    }

    Forest {
        roots: roots.iter().filter_map(|r| built[*r].take()).collect(),
        broken_cycles,
    }
}

/// Total display order: creation time, then id.
fn display_order(a: &CommentWithUser, b: &CommentWithUser) -> Ordering {
    a.comment
        .created_at
        .cmp(&b.comment.created_at)
        .then(a.comment.id.cmp(&b.comment.id))
}

/// Keeps the first record of each id.
fn dedupe(comments: Vec<CommentWithUser>) -> Vec<CommentWithUser> {
    let mut seen = HashSet::with_capacity(comments.len());
    let mut arena = Vec::with_capacity(comments.len());
    for c in comments {
        if !seen.insert(c.comment.id) {
            tracing::warn!(comment_id = c.comment.id, "Dropping duplicate comment record");
            continue;
        }
        arena.push(c);
    }
    arena
}

/// Arena position of each comment's parent, or `None` for roots and orphans.
fn resolve_parents(arena: &[CommentWithUser], index: &HashMap<i64, usize>) -> Vec<Option<usize>> {
    arena
        .iter()
        .map(|c| {
            let parent_id = c.comment.parent_id?;
            match index.get(&parent_id) {
                Some(&p) if arena[p].comment.post_id == c.comment.post_id => Some(p),
                Some(_) => {
                    tracing::warn!(
                        comment_id = c.comment.id,
                        parent_id,
                        "Parent belongs to another post, treating comment as root"
                    );
                    None
                }
                // Parent deleted or not loaded.
                None => None,
            }
        })
        .collect()
}

/// Finds every loop in the parent graph and detaches its members.
///
/// Each node has at most one parent, so following parents from any node
/// either reaches a root or enters exactly one loop.
fn cut_cycles(arena: &[CommentWithUser], parent: &mut [Option<usize>]) -> Vec<i64> {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNSEEN; parent.len()];
    let mut on_cycle: Vec<usize> = Vec::new();

    for start in 0..parent.len() {
        if state[start] != UNSEEN {
            continue;
        }
        let mut path = Vec::new();
        let mut cursor = Some(start);
        while let Some(pos) = cursor {
            match state[pos] {
                UNSEEN => {
                    state[pos] = ON_PATH;
                    path.push(pos);
                    cursor = parent[pos];
                }
                ON_PATH => {
                    // The loop is the tail of the path starting at `pos`.
                    if let Some(at) = path.iter().position(|p| *p == pos) {
                        on_cycle.extend_from_slice(&path[at..]);
                    }
                    break;
                }
                _ => break,
            }
        }
        for pos in path {
            state[pos] = DONE;
        }
    }

    let mut ids: Vec<i64> = on_cycle
        .into_iter()
        .map(|pos| {
            parent[pos] = None;
            arena[pos].comment.id
        })
        .collect();
    ids.sort_unstable();

    if !ids.is_empty() {
        tracing::error!(
            comment_ids = ?ids,
            "Cyclic reply chain detected, promoting its members to roots"
        );
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::comment::Comment;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0).unwrap()
    }

    fn comment(id: i64, parent_id: Option<i64>, minute: u32) -> CommentWithUser {
        CommentWithUser {
            comment: Comment {
                id,
                post_id: 1,
                parent_id,
                user_id: 10,
                content: format!("comment {}", id),
                created_at: at(minute),
                updated_at: at(minute),
                is_deleted: false,
            },
            user_name: "reader".into(),
            user_avatar_url: None,
        }
    }

    fn ids(nodes: &[CommentTree]) -> Vec<i64> {
        nodes.iter().map(CommentTree::id).collect()
    }

    fn total(nodes: &[CommentTree]) -> usize {
        nodes.iter().map(CommentTree::size).sum()
    }

    #[test]
    fn builds_documented_example() {
        let roots = build_tree(vec![
            comment(1, None, 1),
            comment(2, Some(1), 2),
            comment(3, None, 3),
            comment(4, Some(99), 4),
        ]);

        assert_eq!(ids(&roots), vec![1, 3, 4]);
        assert_eq!(ids(&roots[0].replies), vec![2]);
        assert!(roots[1].replies.is_empty());
        assert!(roots[2].replies.is_empty());
    }

    #[test]
    fn order_does_not_depend_on_input_order() {
        let input = vec![
            comment(5, Some(1), 9),
            comment(3, Some(1), 4),
            comment(1, None, 1),
            comment(4, Some(3), 6),
            comment(2, None, 2),
            comment(6, Some(1), 4),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        let a = build_tree(input);
        let b = build_tree(reversed);
        assert_eq!(a, b);

        assert_eq!(ids(&a), vec![1, 2]);
        // 3 and 6 share a timestamp, so id decides.
        assert_eq!(ids(&a[0].replies), vec![3, 6, 5]);
        assert_eq!(ids(&a[0].replies[0].replies), vec![4]);
        assert_eq!(total(&a), 6);
    }

    #[test]
    fn building_twice_gives_identical_output() {
        let input = vec![comment(1, None, 1), comment(2, Some(1), 2), comment(3, Some(2), 3)];
        assert_eq!(build_tree(input.clone()), build_tree(input));
    }

    #[test]
    fn orphans_are_promoted() {
        let roots = build_tree(vec![comment(2, Some(1), 2), comment(3, Some(2), 3)]);
        assert_eq!(ids(&roots), vec![2]);
        assert_eq!(ids(&roots[0].replies), vec![3]);
    }

    #[test]
    fn parent_on_another_post_is_ignored() {
        let mut other = comment(1, None, 1);
        other.comment.post_id = 2;
        let roots = build_tree(vec![other, comment(2, Some(1), 2)]);
        assert_eq!(ids(&roots), vec![1, 2]);
    }

    #[test]
    fn cycles_terminate_and_keep_every_comment() {
        // 1 -> 2 -> 3 -> 1 loop, 4 hangs off 3, 5 is a regular root, 6 points at itself.
        let forest = build_forest(vec![
            comment(1, Some(3), 1),
            comment(2, Some(1), 2),
            comment(3, Some(2), 3),
            comment(4, Some(3), 4),
            comment(5, None, 5),
            comment(6, Some(6), 6),
        ]);

        assert_eq!(forest.broken_cycles, vec![1, 2, 3, 6]);
        assert_eq!(ids(&forest.roots), vec![1, 2, 3, 5, 6]);
        assert_eq!(ids(&forest.roots[2].replies), vec![4]);
        assert_eq!(total(&forest.roots), 6);
    }

    #[test]
    fn duplicate_ids_keep_first_record() {
        let mut dup = comment(1, None, 5);
        dup.comment.content = "second copy".into();
        let roots = build_tree(vec![comment(1, None, 1), dup]);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].comment.comment.content, "comment 1");
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut input = vec![comment(0, None, 0)];
        for id in 1..5000 {
            input.push(comment(id, Some(id - 1), 0));
        }
        let roots = build_tree(input);
        assert_eq!(roots.len(), 1);
        assert_eq!(total(&roots), 5000);
        // Dropping a 5000-level tree recurses through Vec drops; let it go on a thread with room.
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || drop(roots))
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn empty_input_gives_empty_forest() {
        assert!(build_tree(Vec::new()).is_empty());
    }
}
