//! Extension points.
//!
//! The set is closed: every hook below is applied at exactly one documented
//! place in the tag builder, the policy or the pipeline, and nowhere else.
//! Each hook receives the current value plus context and returns a
//! same-shaped replacement.

use std::fmt;
use std::sync::Arc;

use crate::content::{ObjectKind, ObjectRef, Post};

use super::context::PurgeContext;

/// Class discriminator of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagKind {
    Post,
    Term,
    Author,
    Template,
    Site,
    /// Passes its name through as the code.
    Custom(String),
}

impl TagKind {
    /// Name used to key code overrides.
    pub fn name(&self) -> &str {
        match self {
            Self::Post => "post",
            Self::Term => "term",
            Self::Author => "author",
            Self::Template => "template",
            Self::Site => "site",
            Self::Custom(name) => name.as_str(),
        }
    }

    pub fn default_code(&self) -> &str {
        match self {
            Self::Post => "p",
            Self::Term => "t",
            Self::Author => "a",
            Self::Template => "tm",
            Self::Site => "s",
            Self::Custom(name) => name.as_str(),
        }
    }
}

/// Point in a purge tag derivation at which `purge_tags` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagStage {
    /// The object's own tag.
    Own,
    /// Author, term and post relations.
    Related,
    /// Always-purged template tags.
    Always,
    /// The assembled list.
    Final,
}

/// What a tag list is being computed for.
#[derive(Debug, Clone, Copy)]
pub struct TagScope<'a> {
    /// `None` for template tags.
    pub object: Option<ObjectRef>,
    /// Post type, taxonomy or first role; `None` when the object is missing.
    pub group: Option<&'a str>,
}

pub type TagCodeHook = Arc<dyn Fn(&TagKind, String) -> String + Send + Sync>;
pub type PurgeTagsHook = Arc<dyn Fn(TagStage, Vec<String>, &TagScope<'_>) -> Vec<String> + Send + Sync>;
pub type EmitTagsHook = Arc<dyn Fn(Vec<String>, &TagScope<'_>) -> Vec<String> + Send + Sync>;
pub type AlwaysPurgedHook = Arc<dyn Fn(Vec<String>) -> Vec<String> + Send + Sync>;
pub type RelatedTaxonomiesHook = Arc<dyn Fn(Vec<String>, &Post) -> Vec<String> + Send + Sync>;
pub type AllowListHook = Arc<dyn Fn(Vec<String>, ObjectKind) -> Vec<String> + Send + Sync>;
pub type DoPurgeHook = Arc<dyn Fn(bool, &mut PurgeContext) -> bool + Send + Sync>;

/// Registered extension hooks. Unset hooks return their input unchanged.
#[derive(Clone, Default)]
pub struct PurgeHooks {
    tag_code: Option<TagCodeHook>,
    purge_tags: Option<PurgeTagsHook>,
    emit_tags: Option<EmitTagsHook>,
    always_purged: Option<AlwaysPurgedHook>,
    related_taxonomies: Option<RelatedTaxonomiesHook>,
    purgeable_statuses: Option<AllowListHook>,
    purgeable_groups: Option<AllowListHook>,
    do_purge: Option<DoPurgeHook>,
}

impl PurgeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the code of a tag kind.
    pub fn with_tag_code(
        mut self,
        hook: impl Fn(&TagKind, String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.tag_code = Some(Arc::new(hook));
        self
    }

    /// Filter purge tags at each [`TagStage`].
    pub fn with_purge_tags(
        mut self,
        hook: impl Fn(TagStage, Vec<String>, &TagScope<'_>) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.purge_tags = Some(Arc::new(hook));
        self
    }

    /// Filter tags emitted in response headers, before dedup and capping.
    pub fn with_emit_tags(
        mut self,
        hook: impl Fn(Vec<String>, &TagScope<'_>) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.emit_tags = Some(Arc::new(hook));
        self
    }

    pub fn with_always_purged(
        mut self,
        hook: impl Fn(Vec<String>) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.always_purged = Some(Arc::new(hook));
        self
    }

    /// Filter the taxonomies whose terms count as relations of a post.
    pub fn with_related_taxonomies(
        mut self,
        hook: impl Fn(Vec<String>, &Post) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.related_taxonomies = Some(Arc::new(hook));
        self
    }

    pub fn with_purgeable_statuses(
        mut self,
        hook: impl Fn(Vec<String>, ObjectKind) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.purgeable_statuses = Some(Arc::new(hook));
        self
    }

    /// Filter the post types (for posts) or taxonomies (for terms) allowed to purge.
    pub fn with_purgeable_groups(
        mut self,
        hook: impl Fn(Vec<String>, ObjectKind) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.purgeable_groups = Some(Arc::new(hook));
        self
    }

    /// Final go/no-go. Runs after the context is fully built and may mutate it.
    pub fn with_do_purge(
        mut self,
        hook: impl Fn(bool, &mut PurgeContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.do_purge = Some(Arc::new(hook));
        self
    }

    pub(crate) fn tag_code(&self, kind: &TagKind) -> String {
        let code = kind.default_code().to_string();
        match &self.tag_code {
            Some(hook) => hook(kind, code),
            None => code,
        }
    }

    pub(crate) fn purge_tags(
        &self,
        stage: TagStage,
        tags: Vec<String>,
        scope: &TagScope<'_>,
    ) -> Vec<String> {
        match &self.purge_tags {
            Some(hook) => hook(stage, tags, scope),
            None => tags,
        }
    }

    pub(crate) fn emit_tags(&self, tags: Vec<String>, scope: &TagScope<'_>) -> Vec<String> {
        match &self.emit_tags {
            Some(hook) => hook(tags, scope),
            None => tags,
        }
    }

    pub(crate) fn always_purged(&self, tags: Vec<String>) -> Vec<String> {
        match &self.always_purged {
            Some(hook) => hook(tags),
            None => tags,
        }
    }

    pub(crate) fn related_taxonomies(&self, taxonomies: Vec<String>, post: &Post) -> Vec<String> {
        match &self.related_taxonomies {
            Some(hook) => hook(taxonomies, post),
            None => taxonomies,
        }
    }

    pub(crate) fn purgeable_statuses(&self, statuses: Vec<String>, kind: ObjectKind) -> Vec<String> {
        match &self.purgeable_statuses {
            Some(hook) => hook(statuses, kind),
            None => statuses,
        }
    }

    pub(crate) fn purgeable_groups(&self, groups: Vec<String>, kind: ObjectKind) -> Vec<String> {
        match &self.purgeable_groups {
            Some(hook) => hook(groups, kind),
            None => groups,
        }
    }

    pub(crate) fn do_purge(&self, decision: bool, context: &mut PurgeContext) -> bool {
        match &self.do_purge {
            Some(hook) => hook(decision, context),
            None => decision,
        }
    }
}

impl fmt::Debug for PurgeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PurgeHooks")
            .field("tag_code", &self.tag_code.is_some())
            .field("purge_tags", &self.purge_tags.is_some())
            .field("emit_tags", &self.emit_tags.is_some())
            .field("always_purged", &self.always_purged.is_some())
            .field("related_taxonomies", &self.related_taxonomies.is_some())
            .field("purgeable_statuses", &self.purgeable_statuses.is_some())
            .field("purgeable_groups", &self.purgeable_groups.is_some())
            .field("do_purge", &self.do_purge.is_some())
            .finish()
    }
}
