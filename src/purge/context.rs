//! Per-event purge context and its assembly.

use std::collections::BTreeMap;
use std::str::FromStr;

use edgepurge_ccu_types::{PurgeMethod, PurgeNetwork, PurgeType, purge_path};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::content::{ObjectKind, ObjectRef};
use crate::options::PurgeOptions;

use super::tags::{TagBuilder, dedup_tags};

const FALLBACK_PURGE_TYPE: PurgeType = PurgeType::Invalidate;
const FALLBACK_PURGE_METHOD: PurgeMethod = PurgeMethod::Url;
const FALLBACK_PURGE_NETWORK: PurgeNetwork = PurgeNetwork::Staging;

/// Object a change event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PurgeTarget {
    Post {
        id: u64,
    },
    Term {
        id: u64,
        taxonomy: Option<String>,
        term_taxonomy_id: Option<u64>,
    },
    User {
        id: u64,
    },
}

impl PurgeTarget {
    pub fn post(id: u64) -> Self {
        Self::Post { id }
    }

    pub fn term(id: u64, taxonomy: Option<String>) -> Self {
        Self::Term {
            id,
            taxonomy,
            term_taxonomy_id: None,
        }
    }

    pub fn user(id: u64) -> Self {
        Self::User { id }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Post { .. } => ObjectKind::Post,
            Self::Term { .. } => ObjectKind::Term,
            Self::User { .. } => ObjectKind::User,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Self::Post { id } | Self::Term { id, .. } | Self::User { id } => *id,
        }
    }

    pub fn object(&self) -> ObjectRef {
        ObjectRef {
            kind: self.kind(),
            id: self.id(),
        }
    }

    pub fn taxonomy(&self) -> Option<&str> {
        match self {
            Self::Term { taxonomy, .. } => taxonomy.as_deref(),
            _ => None,
        }
    }
}

/// Everything known about one purge, from trigger to request parameters.
///
/// Built once per event, handed mutably to the `do_purge` hook, then
/// discarded once the outcome is returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurgeContext {
    pub action: String,
    pub object_kind: ObjectKind,
    pub object_id: u64,
    /// Post type, taxonomy or user roles.
    pub object_group: Vec<String>,
    pub hostname: String,
    pub purge_type: PurgeType,
    pub purge_method: PurgeMethod,
    pub purge_network: PurgeNetwork,
    /// Tags, URLs or CP codes, depending on the method.
    pub objects: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl PurgeContext {
    /// A context for `action` on `target` with fallback request parameters
    /// and no objects.
    pub fn new(action: impl Into<String>, target: &PurgeTarget) -> Self {
        Self {
            action: action.into(),
            object_kind: target.kind(),
            object_id: target.id(),
            object_group: Vec::new(),
            hostname: String::new(),
            purge_type: FALLBACK_PURGE_TYPE,
            purge_method: FALLBACK_PURGE_METHOD,
            purge_network: FALLBACK_PURGE_NETWORK,
            objects: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// API path for this purge, with wire translation applied.
    pub fn path(&self) -> String {
        purge_path(self.purge_type, self.purge_method, self.purge_network)
    }

    /// Hostname to send with the request; only URL methods carry one.
    pub fn request_hostname(&self) -> Option<&str> {
        self.purge_method.is_url().then_some(self.hostname.as_str())
    }
}

pub(crate) fn resolve_purge_type(options: &PurgeOptions) -> PurgeType {
    resolve(&options.purge_type, "purge-type", FALLBACK_PURGE_TYPE)
}

pub(crate) fn resolve_purge_method(options: &PurgeOptions) -> PurgeMethod {
    resolve(&options.purge_method, "purge-method", FALLBACK_PURGE_METHOD)
}

pub(crate) fn resolve_purge_network(options: &PurgeOptions) -> PurgeNetwork {
    resolve(&options.purge_network, "purge-network", FALLBACK_PURGE_NETWORK)
}

fn resolve<T: FromStr>(raw: &str, key: &'static str, fallback: T) -> T {
    if raw.trim().is_empty() {
        return fallback;
    }
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = raw, "Unrecognised purge option; using fallback");
            fallback
        }
    }
}

/// Assemble the purge context for `action` on `target`.
pub fn purge_info(
    tags: &TagBuilder,
    options: &PurgeOptions,
    action: &str,
    target: &PurgeTarget,
) -> PurgeContext {
    let mut context = PurgeContext::new(action, target);
    context.hostname = options.hostname.trim().to_string();
    context.purge_type = resolve_purge_type(options);
    context.purge_method = resolve_purge_method(options);
    context.purge_network = resolve_purge_network(options);
    context.object_group = object_group(tags, target);

    if let PurgeTarget::Term {
        id,
        taxonomy,
        term_taxonomy_id,
    } = target
    {
        let term = tags.content().term(*id, taxonomy.as_deref());
        let secondary = term_taxonomy_id
            .or_else(|| term.as_ref().map(|t| t.term_taxonomy_id))
            .filter(|secondary| *secondary > 0);
        if let Some(secondary) = secondary {
            context
                .metadata
                .insert("term_taxonomy_id".to_string(), Value::from(secondary));
        }
        if let Some(taxonomy) = taxonomy.clone().or_else(|| term.map(|t| t.taxonomy)) {
            context
                .metadata
                .insert("taxonomy".to_string(), Value::String(taxonomy));
        }
    }

    let related = options.cache_related_tags;
    context.objects = match context.purge_method {
        PurgeMethod::Tags => match target {
            PurgeTarget::Post { id } => tags.tags_for_purge_post(*id, related, true),
            PurgeTarget::Term { id, taxonomy, .. } => {
                tags.tags_for_purge_term(*id, taxonomy.as_deref(), related, true)
            }
            PurgeTarget::User { id } => tags.tags_for_purge_user(*id, related, true),
        },
        PurgeMethod::Url | PurgeMethod::Arl => purge_urls(tags, target, related),
        PurgeMethod::Cpcode => options.cpcodes.clone(),
    };

    context
}

fn object_group(tags: &TagBuilder, target: &PurgeTarget) -> Vec<String> {
    let content = tags.content();
    match target {
        PurgeTarget::Post { id } => content
            .post(*id)
            .map(|post| vec![post.post_type])
            .unwrap_or_default(),
        PurgeTarget::Term { id, taxonomy, .. } => content
            .term(*id, taxonomy.as_deref())
            .map(|term| vec![term.taxonomy])
            .unwrap_or_default(),
        PurgeTarget::User { id } => content
            .user(*id)
            .map(|user| user.roles)
            .unwrap_or_default(),
    }
}

/// Permalinks of the target, its related archives and the home page.
fn purge_urls(tags: &TagBuilder, target: &PurgeTarget, related: bool) -> Vec<String> {
    let content = tags.content();
    let mut urls = Vec::new();
    let mut push = |object: ObjectRef| {
        if let Some(url) = content.permalink(object) {
            urls.push(url);
        }
    };

    match target {
        PurgeTarget::Post { id } => {
            let Some(post) = content.post(*id) else {
                return Vec::new();
            };
            push(ObjectRef::post(post.id));
            if related {
                if post.author_id > 0 {
                    push(ObjectRef::user(post.author_id));
                }
                for term in tags.related_terms(&post) {
                    push(ObjectRef::term(term.id));
                }
            }
        }
        PurgeTarget::Term { id, taxonomy, .. } => {
            let Some(term) = content.term(*id, taxonomy.as_deref()) else {
                return Vec::new();
            };
            push(ObjectRef::term(term.id));
            if related {
                for ancestor in content.term_ancestors(&term) {
                    push(ObjectRef::term(ancestor.id));
                }
            }
        }
        PurgeTarget::User { id } => {
            if content.user(*id).is_none() {
                return Vec::new();
            }
            push(ObjectRef::user(*id));
        }
    }

    urls.extend(content.home_url());
    dedup_tags(urls)
}
