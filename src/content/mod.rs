//! Content model and the read boundary to the content-management system.
//!
//! The purge engine never owns content. Everything it needs to know about
//! posts, terms and users is read through [`ContentSource`].

mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{ContentFixture, InMemoryContent};

/// Kind of content object a purge is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Post,
    Term,
    User,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Term => "term",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content object identified by kind and numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: u64,
}

impl ObjectRef {
    pub fn post(id: u64) -> Self {
        Self {
            kind: ObjectKind::Post,
            id,
        }
    }

    pub fn term(id: u64) -> Self {
        Self {
            kind: ObjectKind::Term,
            id,
        }
    }

    pub fn user(id: u64) -> Self {
        Self {
            kind: ObjectKind::User,
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    #[serde(default = "default_post_type")]
    pub post_type: String,
    #[serde(default = "default_post_status")]
    pub status: String,
    /// Zero when the post has no author.
    #[serde(default)]
    pub author_id: u64,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub slug: String,
    /// Ids of every term assigned to the post, across taxonomies.
    #[serde(default)]
    pub terms: Vec<u64>,
    #[serde(default)]
    pub permalink: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: u64,
    pub taxonomy: String,
    /// Secondary id of the (term, taxonomy) pair.
    #[serde(default)]
    pub term_taxonomy_id: u64,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub permalink: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

/// Taxonomy registration: which post types expose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub name: String,
    #[serde(default)]
    pub hierarchical: bool,
    #[serde(default)]
    pub post_types: Vec<String>,
}

fn default_post_type() -> String {
    "post".to_string()
}

fn default_post_status() -> String {
    "publish".to_string()
}

/// Read access to the content-management system.
///
/// Lookups are synchronous; implementations backed by a remote store are
/// expected to serve them from a request-local snapshot.
pub trait ContentSource: Send + Sync {
    fn post(&self, id: u64) -> Option<Post>;

    /// Look up a term. When `taxonomy` is given the term must belong to it.
    fn term(&self, id: u64, taxonomy: Option<&str>) -> Option<Term>;

    fn user(&self, id: u64) -> Option<User>;

    /// Taxonomies registered for a post type.
    fn taxonomies_for(&self, post_type: &str) -> Vec<String>;

    /// Terms of one taxonomy assigned to a post.
    fn post_terms(&self, post_id: u64, taxonomy: &str) -> Vec<Term>;

    /// Posts carrying `term`, restricted to the given types and statuses.
    fn posts_with_term(&self, term: &Term, post_types: &[String], statuses: &[String])
    -> Vec<Post>;

    /// Posts written by a user, restricted to the given types and statuses.
    fn posts_by_author(&self, user_id: u64, post_types: &[String], statuses: &[String])
    -> Vec<Post>;

    /// Ancestors of a term, nearest first. Empty for flat taxonomies.
    fn term_ancestors(&self, term: &Term) -> Vec<Term>;

    /// Ancestors of a post, nearest first.
    fn post_ancestors(&self, post: &Post) -> Vec<Post>;

    /// Public URL of an object, if it has one.
    fn permalink(&self, object: ObjectRef) -> Option<String>;

    fn home_url(&self) -> Option<String>;
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content fixture {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse content fixture: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid content fixture: {0}")]
    Invalid(String),
}
