//! Cache tag derivation.
//!
//! Every tag has the form `{site-prefix}-{code}-{value}`. Purge tag sets may be
//! large and may contain duplicates; emitted tag sets are deduplicated and
//! capped because they travel in a response header.

use std::collections::HashSet;
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::content::{ContentSource, ObjectKind, ObjectRef, Post, Term, User};
use crate::options::PurgeOptions;

use super::hooks::{PurgeHooks, TagKind, TagScope, TagStage};

/// Response header carrying emitted tags.
pub const CACHE_TAG_HEADER: &str = "Edge-Cache-Tag";

const ALWAYS_PURGED_TEMPLATES: [&str; 4] = ["post", "home", "feed", "404"];

/// Site identity the tag prefix is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteIdentity {
    /// Configured site code; may be blank.
    pub site_code: String,
    pub hostname: String,
    /// Tenant id in multi-tenant mode.
    pub tenant: Option<u64>,
}

impl SiteIdentity {
    pub fn from_options(options: &PurgeOptions, tenant: Option<u64>) -> Self {
        Self {
            site_code: options.unique_sitecode.trim().to_string(),
            hostname: options.hostname.trim().to_string(),
            tenant,
        }
    }
}

/// Objects with a numeric identity.
pub trait Identified {
    fn object_id(&self) -> u64;
}

impl Identified for Post {
    fn object_id(&self) -> u64 {
        self.id
    }
}

impl Identified for Term {
    fn object_id(&self) -> u64 {
        self.id
    }
}

impl Identified for User {
    fn object_id(&self) -> u64 {
        self.id
    }
}

/// An object given either by id or already loaded.
#[derive(Debug)]
pub enum Subject<'a, T> {
    Id(u64),
    Loaded(&'a T),
}

impl<T> Clone for Subject<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Subject<'_, T> {}

impl<T: Identified> Subject<'_, T> {
    pub fn id(&self) -> u64 {
        match self {
            Self::Id(id) => *id,
            Self::Loaded(object) => object.object_id(),
        }
    }
}

impl<T> From<u64> for Subject<'_, T> {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}

impl<'a, T> From<&'a T> for Subject<'a, T> {
    fn from(object: &'a T) -> Self {
        Self::Loaded(object)
    }
}

/// Computes purge and emit tag sets.
///
/// Reads content through [`ContentSource`] and never touches the network.
pub struct TagBuilder {
    site: SiteIdentity,
    content: Arc<dyn ContentSource>,
    hooks: Arc<PurgeHooks>,
    post_types: Vec<String>,
    statuses: Vec<String>,
    emit_limit: usize,
    #[cfg(test)]
    invocations: AtomicUsize,
}

impl TagBuilder {
    pub fn new(
        site: SiteIdentity,
        content: Arc<dyn ContentSource>,
        hooks: Arc<PurgeHooks>,
        options: &PurgeOptions,
    ) -> Self {
        Self {
            site,
            content,
            hooks,
            post_types: options.purgeable_post_types.clone(),
            statuses: options.purgeable_statuses.clone(),
            emit_limit: usize::try_from(options.emit_tag_limit).unwrap_or(usize::MAX),
            #[cfg(test)]
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn site(&self) -> &SiteIdentity {
        &self.site
    }

    pub fn content(&self) -> &Arc<dyn ContentSource> {
        &self.content
    }

    /// Number of tag set computations, for gate ordering tests.
    #[cfg(test)]
    pub(crate) fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn record_invocation(&self) {
        #[cfg(test)]
        self.invocations.fetch_add(1, Ordering::SeqCst);
    }

    /// `"{code}-{value}"`.
    pub fn tag_part(&self, kind: &TagKind, value: impl std::fmt::Display) -> String {
        format!("{}-{value}", self.hooks.tag_code(kind))
    }

    /// The configured site code, or the URL-encoded hostname when blank.
    pub fn site_code(&self) -> String {
        if !self.site.site_code.is_empty() {
            return self.site.site_code.clone();
        }
        url::form_urlencoded::byte_serialize(self.site.hostname.as_bytes()).collect()
    }

    /// Prefix shared by every tag of this tenant.
    pub fn site_prefix(&self) -> String {
        let code = self.site_code();
        match self.site.tenant {
            Some(tenant) => format!("{code}-{}", self.tag_part(&TagKind::Site, tenant)),
            None => code,
        }
    }

    fn tag(&self, kind: &TagKind, value: impl std::fmt::Display) -> String {
        format!("{}-{}", self.site_prefix(), self.tag_part(kind, value))
    }

    pub fn post_tag<'a>(&self, post: impl Into<Subject<'a, Post>>) -> String {
        self.tag(&TagKind::Post, post.into().id())
    }

    pub fn term_tag<'a>(&self, term: impl Into<Subject<'a, Term>>) -> String {
        self.tag(&TagKind::Term, term.into().id())
    }

    pub fn author_tag<'a>(&self, user: impl Into<Subject<'a, User>>) -> String {
        self.tag(&TagKind::Author, user.into().id())
    }

    pub fn template_tag(&self, name: &str) -> String {
        self.tag(&TagKind::Template, name)
    }

    pub fn related_author_tags(&self, post: &Post) -> Vec<String> {
        if post.author_id > 0 {
            vec![self.author_tag(post.author_id)]
        } else {
            Vec::new()
        }
    }

    /// One tag per assigned term across the post type's related taxonomies.
    pub fn related_term_tags(&self, post: &Post) -> Vec<String> {
        self.related_terms(post)
            .iter()
            .map(|term| self.term_tag(term))
            .collect()
    }

    /// One tag per allow-listed post carrying `term`.
    pub fn related_post_tags(&self, term: &Term) -> Vec<String> {
        let (post_types, statuses) = self.post_bounds();
        self.content
            .posts_with_term(term, &post_types, &statuses)
            .iter()
            .map(|post| self.post_tag(post))
            .collect()
    }

    pub fn ancestor_term_tags(&self, term: &Term) -> Vec<String> {
        self.content
            .term_ancestors(term)
            .iter()
            .map(|ancestor| self.term_tag(ancestor))
            .collect()
    }

    pub fn parent_post_tags(&self, post: &Post) -> Vec<String> {
        self.content
            .post_ancestors(post)
            .iter()
            .map(|parent| self.post_tag(parent))
            .collect()
    }

    /// Template tags invalidated by every content purge.
    pub fn always_purged_tags(&self) -> Vec<String> {
        let tags = ALWAYS_PURGED_TEMPLATES
            .iter()
            .map(|name| self.template_tag(name))
            .collect();
        self.hooks.always_purged(tags)
    }

    pub fn tags_for_purge_post<'a>(
        &self,
        post: impl Into<Subject<'a, Post>>,
        related: bool,
        always: bool,
    ) -> Vec<String> {
        self.record_invocation();
        let subject = post.into();
        let post = self.resolve_post(subject);
        let scope = TagScope {
            object: Some(ObjectRef::post(subject.id())),
            group: post.as_ref().map(|post| post.post_type.as_str()),
        };

        let own = post.iter().map(|post| self.post_tag(post)).collect();
        let relations = || {
            post.as_ref()
                .map(|post| self.post_relations(post))
                .unwrap_or_default()
        };
        self.assemble(&scope, post.is_some(), own, related, relations, always)
    }

    pub fn tags_for_purge_term<'a>(
        &self,
        term: impl Into<Subject<'a, Term>>,
        taxonomy: Option<&str>,
        related: bool,
        always: bool,
    ) -> Vec<String> {
        self.record_invocation();
        let subject = term.into();
        let term = self.resolve_term(subject, taxonomy);
        let scope = TagScope {
            object: Some(ObjectRef::term(subject.id())),
            group: term.as_ref().map(|term| term.taxonomy.as_str()),
        };

        let own = term.iter().map(|term| self.term_tag(term)).collect();
        let relations = || {
            term.as_ref()
                .map(|term| {
                    let mut tags = self.ancestor_term_tags(term);
                    tags.extend(self.related_post_tags(term));
                    tags
                })
                .unwrap_or_default()
        };
        self.assemble(&scope, term.is_some(), own, related, relations, always)
    }

    pub fn tags_for_purge_user<'a>(
        &self,
        user: impl Into<Subject<'a, User>>,
        related: bool,
        always: bool,
    ) -> Vec<String> {
        self.record_invocation();
        let subject = user.into();
        let user = self.resolve_user(subject);
        let scope = TagScope {
            object: Some(ObjectRef::user(subject.id())),
            group: user
                .as_ref()
                .and_then(|user| user.roles.first())
                .map(String::as_str),
        };

        let own = user.iter().map(|user| self.author_tag(user)).collect();
        let relations = || {
            user.as_ref()
                .map(|user| {
                    let (post_types, statuses) = self.post_bounds();
                    self.content
                        .posts_by_author(user.id, &post_types, &statuses)
                        .iter()
                        .map(|post| self.post_tag(post))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };
        self.assemble(&scope, user.is_some(), own, related, relations, always)
    }

    /// Tags for a response rendering a single post.
    pub fn tags_for_emit_post<'a>(&self, post: impl Into<Subject<'a, Post>>) -> Vec<String> {
        self.record_invocation();
        let subject = post.into();
        let post = self.resolve_post(subject);
        let scope = TagScope {
            object: Some(ObjectRef::post(subject.id())),
            group: post.as_ref().map(|post| post.post_type.as_str()),
        };

        let mut tags = vec![self.site_prefix()];
        if let Some(post) = &post {
            tags.push(self.post_tag(post));
            tags.extend(self.post_relations(post));
        }
        self.finish_emit(tags, &scope)
    }

    /// Tags for a response rendering a term archive.
    pub fn tags_for_emit_term<'a>(
        &self,
        term: impl Into<Subject<'a, Term>>,
        taxonomy: Option<&str>,
    ) -> Vec<String> {
        self.record_invocation();
        let subject = term.into();
        let term = self.resolve_term(subject, taxonomy);
        let scope = TagScope {
            object: Some(ObjectRef::term(subject.id())),
            group: term.as_ref().map(|term| term.taxonomy.as_str()),
        };

        let mut tags = vec![self.site_prefix()];
        if let Some(term) = &term {
            tags.push(self.term_tag(term));
            tags.extend(self.ancestor_term_tags(term));
        }
        self.finish_emit(tags, &scope)
    }

    /// Tags for a response rendering an author archive.
    pub fn tags_for_emit_user<'a>(&self, user: impl Into<Subject<'a, User>>) -> Vec<String> {
        self.record_invocation();
        let subject = user.into();
        let user = self.resolve_user(subject);
        let scope = TagScope {
            object: Some(ObjectRef::user(subject.id())),
            group: user
                .as_ref()
                .and_then(|user| user.roles.first())
                .map(String::as_str),
        };

        let mut tags = vec![self.site_prefix()];
        if let Some(user) = &user {
            tags.push(self.author_tag(user));
        }
        self.finish_emit(tags, &scope)
    }

    /// Tags for a response rendered from a named template (`home`, `feed`, ...).
    pub fn tags_for_emit_template(&self, name: &str) -> Vec<String> {
        self.record_invocation();
        let scope = TagScope {
            object: None,
            group: Some(name),
        };
        let tags = vec![self.site_prefix(), self.template_tag(name)];
        self.finish_emit(tags, &scope)
    }

    fn assemble(
        &self,
        scope: &TagScope<'_>,
        found: bool,
        own: Vec<String>,
        related: bool,
        relations: impl FnOnce() -> Vec<String>,
        always: bool,
    ) -> Vec<String> {
        let mut tags = self.hooks.purge_tags(TagStage::Own, own, scope);
        if related {
            tags.extend(self.hooks.purge_tags(TagStage::Related, relations(), scope));
        }
        if always {
            let base = if found {
                self.always_purged_tags()
            } else {
                Vec::new()
            };
            tags.extend(self.hooks.purge_tags(TagStage::Always, base, scope));
        }
        self.hooks.purge_tags(TagStage::Final, tags, scope)
    }

    fn finish_emit(&self, tags: Vec<String>, scope: &TagScope<'_>) -> Vec<String> {
        let mut tags = dedup_tags(self.hooks.emit_tags(tags, scope));
        if tags.len() > self.emit_limit {
            warn!(
                object = ?scope.object,
                count = tags.len(),
                limit = self.emit_limit,
                "Emitted cache tags truncated"
            );
            tags.truncate(self.emit_limit);
        }
        tags
    }

    /// Author, terms with their ancestors, and parent posts.
    fn post_relations(&self, post: &Post) -> Vec<String> {
        let mut tags = self.related_author_tags(post);
        for term in self.related_terms(post) {
            tags.push(self.term_tag(&term));
            tags.extend(self.ancestor_term_tags(&term));
        }
        tags.extend(self.parent_post_tags(post));
        tags
    }

    pub(crate) fn related_terms(&self, post: &Post) -> Vec<Term> {
        let taxonomies = self
            .hooks
            .related_taxonomies(self.content.taxonomies_for(&post.post_type), post);
        taxonomies
            .iter()
            .flat_map(|taxonomy| self.content.post_terms(post.id, taxonomy))
            .collect()
    }

    fn post_bounds(&self) -> (Vec<String>, Vec<String>) {
        (
            self.hooks
                .purgeable_groups(self.post_types.clone(), ObjectKind::Post),
            self.hooks
                .purgeable_statuses(self.statuses.clone(), ObjectKind::Post),
        )
    }

    fn resolve_post(&self, subject: Subject<'_, Post>) -> Option<Post> {
        match subject {
            Subject::Id(id) => self.content.post(id),
            Subject::Loaded(post) => self.content.post(post.id).or_else(|| Some(post.clone())),
        }
    }

    fn resolve_term(&self, subject: Subject<'_, Term>, taxonomy: Option<&str>) -> Option<Term> {
        let term = match subject {
            Subject::Id(id) => self.content.term(id, taxonomy),
            Subject::Loaded(term) => self
                .content
                .term(term.id, Some(&term.taxonomy))
                .or_else(|| Some(term.clone())),
        }?;
        taxonomy
            .is_none_or(|wanted| term.taxonomy == wanted)
            .then_some(term)
    }

    fn resolve_user(&self, subject: Subject<'_, User>) -> Option<User> {
        match subject {
            Subject::Id(id) => self.content.user(id),
            Subject::Loaded(user) => self.content.user(user.id).or_else(|| Some(user.clone())),
        }
    }
}

impl std::fmt::Debug for TagBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagBuilder")
            .field("site", &self.site)
            .field("post_types", &self.post_types)
            .field("statuses", &self.statuses)
            .field("emit_limit", &self.emit_limit)
            .finish_non_exhaustive()
    }
}

/// Remove repeated tags, keeping the first occurrence.
pub fn dedup_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Value for the [`CACHE_TAG_HEADER`] header.
pub fn emit_header_value(tags: &[String]) -> String {
    tags.join(",")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::content::InMemoryContent;

    const FIXTURE: &str = r#"
site_url = "https://example.com"

[[taxonomies]]
name = "category"
hierarchical = true
post_types = ["post"]

[[taxonomies]]
name = "post_tag"
post_types = ["post"]

[[posts]]
id = 42
author_id = 7
slug = "hello-world"
terms = [3]

[[posts]]
id = 44
author_id = 7
slug = "second"
terms = [3, 11]

[[posts]]
id = 45
status = "draft"
terms = [3]

[[posts]]
id = 60
post_type = "page"
slug = "child"
parent_id = 59

[[posts]]
id = 59
post_type = "page"
slug = "parent"

[[terms]]
id = 3
taxonomy = "category"
slug = "news"

[[terms]]
id = 11
taxonomy = "category"
slug = "local"
parent_id = 3

[[users]]
id = 7
slug = "ada"
roles = ["author"]
"#;

    fn options(site_code: &str) -> PurgeOptions {
        PurgeOptions {
            unique_sitecode: site_code.to_string(),
            hostname: "www.example.com".to_string(),
            ..PurgeOptions::default()
        }
    }

    fn builder_with(hooks: PurgeHooks, options: &PurgeOptions, tenant: Option<u64>) -> TagBuilder {
        let content = InMemoryContent::from_toml_str(FIXTURE).expect("fixture parses");
        TagBuilder::new(
            SiteIdentity::from_options(options, tenant),
            Arc::new(content),
            Arc::new(hooks),
            options,
        )
    }

    fn builder() -> TagBuilder {
        builder_with(PurgeHooks::new(), &options("tenant"), None)
    }

    fn set(tags: Vec<String>) -> BTreeSet<String> {
        tags.into_iter().collect()
    }

    #[test]
    fn loaded_subject_is_reusable_after_resolution() {
        let builder = builder();
        let post = builder.content().post(42).expect("post exists");
        let subject = Subject::from(&post);
        let copy = subject;

        assert_eq!(subject.id(), 42);
        assert_eq!(copy.id(), 42);
        assert_eq!(builder.resolve_post(subject).map(|post| post.id), Some(42));
        assert_eq!(builder.tags_for_emit_post(copy)[1], "tenant-p-42");
    }

    #[test]
    fn post_tag_is_deterministic_for_ids_and_objects() {
        let builder = builder();
        let post = builder.content().post(42).expect("post exists");

        assert_eq!(builder.post_tag(42_u64), builder.post_tag(42_u64));
        assert_eq!(builder.post_tag(&post), builder.post_tag(42_u64));
        assert_eq!(builder.post_tag(&post), "tenant-p-42");
        assert_eq!(
            builder.tags_for_purge_post(&post, true, true),
            builder.tags_for_purge_post(42_u64, true, true)
        );
    }

    #[test]
    fn site_code_falls_back_to_encoded_hostname() {
        let options = PurgeOptions {
            hostname: "blog.example.com:8080".to_string(),
            ..PurgeOptions::default()
        };
        let builder = builder_with(PurgeHooks::new(), &options, None);
        assert_eq!(builder.site_code(), "blog.example.com%3A8080");
        assert_eq!(builder.template_tag("home"), "blog.example.com%3A8080-tm-home");
    }

    #[test]
    fn tenants_sharing_a_host_get_distinct_prefixes() {
        let options = options("");
        let first = builder_with(PurgeHooks::new(), &options, Some(1));
        let second = builder_with(PurgeHooks::new(), &options, Some(2));

        assert_eq!(first.site_prefix(), "www.example.com-s-1");
        let first_tags = first.tags_for_purge_post(42_u64, true, true);
        let second_tags = second.tags_for_purge_post(42_u64, true, true);
        assert!(
            first_tags
                .iter()
                .all(|tag| tag.starts_with(&format!("{}-", first.site_prefix())))
        );
        assert!(set(first_tags).is_disjoint(&set(second_tags)));
    }

    #[test]
    fn purge_post_matches_reference_scenario() {
        let builder = builder();
        let tags = set(builder.tags_for_purge_post(42_u64, true, true));
        let expected = set(
            [
                "tenant-p-42",
                "tenant-a-7",
                "tenant-t-3",
                "tenant-tm-post",
                "tenant-tm-home",
                "tenant-tm-feed",
                "tenant-tm-404",
            ]
            .map(String::from)
            .to_vec(),
        );
        assert_eq!(tags, expected);
    }

    #[test]
    fn full_purge_set_contains_bare_set_and_always_tags() {
        let builder = builder();
        let full = set(builder.tags_for_purge_post(44_u64, true, true));
        let bare = set(builder.tags_for_purge_post(44_u64, false, false));

        assert_eq!(bare, set(vec!["tenant-p-44".to_string()]));
        assert!(full.is_superset(&bare));
        assert!(full.is_superset(&set(builder.always_purged_tags())));
        assert!(full.contains("tenant-t-11"));
    }

    #[test]
    fn term_purge_includes_ancestors_and_eligible_posts_only() {
        let builder = builder();
        let tags = set(builder.tags_for_purge_term(11_u64, Some("category"), true, false));
        assert_eq!(
            tags,
            set(["tenant-t-11", "tenant-t-3", "tenant-p-44"].map(String::from).to_vec())
        );

        let news = set(builder.tags_for_purge_term(3_u64, None, true, false));
        assert!(news.contains("tenant-p-42"));
        assert!(!news.contains("tenant-p-45"));
    }

    #[test]
    fn term_in_wrong_taxonomy_is_missing() {
        let builder = builder();
        assert!(
            builder
                .tags_for_purge_term(3_u64, Some("post_tag"), true, true)
                .is_empty()
        );
    }

    #[test]
    fn page_relations_include_parent_pages() {
        let builder = builder();
        let tags = builder.tags_for_purge_post(60_u64, true, false);
        assert_eq!(tags, vec!["tenant-p-60", "tenant-p-59"]);
    }

    #[test]
    fn user_purge_covers_authored_posts() {
        let builder = builder();
        let tags = set(builder.tags_for_purge_user(7_u64, true, false));
        assert_eq!(
            tags,
            set(["tenant-a-7", "tenant-p-42", "tenant-p-44"].map(String::from).to_vec())
        );
    }

    #[test]
    fn missing_object_yields_only_hook_output() {
        let builder = builder();
        assert!(builder.tags_for_purge_post(999_u64, true, true).is_empty());

        let hooks = PurgeHooks::new().with_purge_tags(|stage, mut tags, _| {
            if stage == TagStage::Final {
                tags.push("injected".to_string());
            }
            tags
        });
        let builder = builder_with(hooks, &options("tenant"), None);
        assert_eq!(builder.tags_for_purge_post(999_u64, true, true), vec!["injected"]);
    }

    #[test]
    fn purge_tags_hook_sees_each_stage_once() {
        let hooks = PurgeHooks::new().with_purge_tags(|stage, tags, scope| {
            assert_eq!(scope.group, Some("post"));
            match stage {
                TagStage::Related => Vec::new(),
                _ => tags,
            }
        });
        let builder = builder_with(hooks, &options("tenant"), None);
        let tags = builder.tags_for_purge_post(42_u64, true, false);
        assert_eq!(tags, vec!["tenant-p-42"]);
    }

    #[test]
    fn emitted_tags_are_deduplicated_and_prefixed() {
        let hooks = PurgeHooks::new().with_emit_tags(|mut tags, _| {
            tags.push("tenant-p-42".to_string());
            tags
        });
        let builder = builder_with(hooks, &options("tenant"), None);
        let tags = builder.tags_for_emit_post(42_u64);

        assert_eq!(tags.first().map(String::as_str), Some("tenant"));
        assert_eq!(tags.iter().filter(|tag| *tag == "tenant-p-42").count(), 1);
        assert!(!tags.iter().any(|tag| tag.contains("-tm-")));
        assert_eq!(
            emit_header_value(&tags),
            "tenant,tenant-p-42,tenant-a-7,tenant-t-3"
        );
    }

    #[test]
    fn emitted_tags_respect_limit() {
        let options = PurgeOptions {
            emit_tag_limit: 2,
            ..options("tenant")
        };
        let builder = builder_with(PurgeHooks::new(), &options, None);
        assert_eq!(builder.tags_for_emit_post(42_u64), vec!["tenant", "tenant-p-42"]);
        assert_eq!(
            builder.tags_for_emit_template("feed"),
            vec!["tenant", "tenant-tm-feed"]
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let tags = ["s-p-1", "s-p-1", "s-t-2"].map(String::from);
        assert_eq!(dedup_tags(tags), vec!["s-p-1", "s-t-2"]);
    }

    #[test]
    fn related_taxonomies_hook_filters_terms() {
        let hooks = PurgeHooks::new().with_related_taxonomies(|taxonomies, _| {
            taxonomies
                .into_iter()
                .filter(|taxonomy| taxonomy != "category")
                .collect()
        });
        let builder = builder_with(hooks, &options("tenant"), None);
        let post = builder.content().post(42).expect("post exists");
        assert!(builder.related_term_tags(&post).is_empty());
    }
}
