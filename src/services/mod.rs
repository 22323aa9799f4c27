// src/services/mod.rs

pub mod comment_tree;
pub mod comments;
pub mod revalidate;
