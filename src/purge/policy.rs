//! Whether an event purges at all.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::content::{ObjectKind, Post, Term, User};
use crate::options::PurgeOptions;

use super::context::PurgeContext;
use super::hooks::PurgeHooks;

/// State of one inbound request.
///
/// Tracks which actions already sent a purge so a second trigger of the same
/// action within the request is skipped. Create a fresh scope per request;
/// nothing here is shared across requests.
#[derive(Debug, Clone)]
pub struct RequestScope {
    id: Uuid,
    fired: HashSet<String>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            fired: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_fired(&self, action: &str) -> bool {
        self.fired.contains(action)
    }

    pub fn mark_fired(&mut self, action: &str) {
        self.fired.insert(action.to_string());
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Why an event did not result in a purge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnsubscribedAction,
    AlreadyFired,
    NotFound,
    StatusNotPurgeable,
    GroupNotPurgeable,
    NoObjects,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsubscribedAction => "unsubscribed_action",
            Self::AlreadyFired => "already_fired",
            Self::NotFound => "not_found",
            Self::StatusNotPurgeable => "status_not_purgeable",
            Self::GroupNotPurgeable => "group_not_purgeable",
            Self::NoObjects => "no_objects",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loaded object under consideration.
#[derive(Debug, Clone, Copy)]
pub enum Candidate<'a> {
    Post(&'a Post),
    Term(&'a Term),
    User(&'a User),
}

impl Candidate<'_> {
    fn kind(&self) -> ObjectKind {
        match self {
            Self::Post(_) => ObjectKind::Post,
            Self::Term(_) => ObjectKind::Term,
            Self::User(_) => ObjectKind::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurgePolicy {
    purge_on_update: bool,
    statuses: Vec<String>,
    post_types: Vec<String>,
    taxonomies: Vec<String>,
    hooks: Arc<PurgeHooks>,
}

impl PurgePolicy {
    pub fn from_options(options: &PurgeOptions, hooks: Arc<PurgeHooks>) -> Self {
        Self {
            purge_on_update: options.purge_on_update,
            statuses: options.purgeable_statuses.clone(),
            post_types: options.purgeable_post_types.clone(),
            taxonomies: options.purgeable_taxonomies.clone(),
            hooks,
        }
    }

    /// Run the eligibility gates in order, stopping at the first failure:
    /// already fired in this scope, missing object, status, then post type or
    /// taxonomy.
    ///
    /// Terms carry no status and users neither status nor group, so those
    /// gates pass for them.
    pub fn check_eligible(
        &self,
        scope: &RequestScope,
        action: &str,
        candidate: Option<Candidate<'_>>,
    ) -> Result<(), SkipReason> {
        if scope.has_fired(action) {
            return Err(SkipReason::AlreadyFired);
        }

        let candidate = candidate.ok_or(SkipReason::NotFound)?;
        let kind = candidate.kind();

        if let Candidate::Post(post) = candidate {
            let statuses = self.hooks.purgeable_statuses(self.statuses.clone(), kind);
            if !statuses.contains(&post.status) {
                return Err(SkipReason::StatusNotPurgeable);
            }
        }

        let group = match candidate {
            Candidate::Post(post) => Some((&post.post_type, &self.post_types)),
            Candidate::Term(term) => Some((&term.taxonomy, &self.taxonomies)),
            Candidate::User(_) => None,
        };
        if let Some((group, allowed)) = group {
            let allowed = self.hooks.purgeable_groups(allowed.clone(), kind);
            if !allowed.contains(group) {
                return Err(SkipReason::GroupNotPurgeable);
            }
        }

        Ok(())
    }

    /// Final go/no-go, seeded from `purge-on-update`. The `do_purge` hook sees
    /// the fully built context and may change it.
    pub fn do_purge(&self, context: &mut PurgeContext) -> bool {
        self.hooks.do_purge(self.purge_on_update, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::purge::context::PurgeTarget;

    fn post(status: &str, post_type: &str) -> Post {
        Post {
            id: 42,
            post_type: post_type.to_string(),
            status: status.to_string(),
            author_id: 7,
            parent_id: None,
            slug: "hello-world".to_string(),
            terms: vec![3],
            permalink: None,
        }
    }

    fn policy(hooks: PurgeHooks) -> PurgePolicy {
        PurgePolicy::from_options(&PurgeOptions::default(), Arc::new(hooks))
    }

    #[test]
    fn published_post_is_eligible() {
        let policy = policy(PurgeHooks::new());
        let post = post("publish", "post");
        assert_eq!(
            policy.check_eligible(&RequestScope::new(), "update", Some(Candidate::Post(&post))),
            Ok(())
        );
    }

    #[test]
    fn gates_run_in_order() {
        let policy = policy(PurgeHooks::new());
        let draft_product = post("draft", "product");
        let mut scope = RequestScope::new();

        assert_eq!(
            policy.check_eligible(&scope, "update", Some(Candidate::Post(&draft_product))),
            Err(SkipReason::StatusNotPurgeable)
        );
        scope.mark_fired("update");
        assert_eq!(
            policy.check_eligible(&scope, "update", Some(Candidate::Post(&draft_product))),
            Err(SkipReason::AlreadyFired)
        );
        assert_eq!(
            policy.check_eligible(&scope, "update", None),
            Err(SkipReason::AlreadyFired)
        );
        assert_eq!(
            policy.check_eligible(&scope, "trash", None),
            Err(SkipReason::NotFound)
        );

        let product = post("publish", "product");
        assert_eq!(
            policy.check_eligible(&scope, "trash", Some(Candidate::Post(&product))),
            Err(SkipReason::GroupNotPurgeable)
        );
    }

    #[test]
    fn hooks_extend_allow_lists() {
        let policy = policy(
            PurgeHooks::new()
                .with_purgeable_statuses(|mut statuses, _| {
                    statuses.push("draft".to_string());
                    statuses
                })
                .with_purgeable_groups(|mut groups, kind| {
                    if kind == ObjectKind::Term {
                        groups.push("product_cat".to_string());
                    }
                    groups
                }),
        );
        let draft = post("draft", "post");
        let term = Term {
            id: 3,
            taxonomy: "product_cat".to_string(),
            term_taxonomy_id: 3,
            slug: "shoes".to_string(),
            parent_id: None,
            permalink: None,
        };
        let scope = RequestScope::new();

        assert!(
            policy
                .check_eligible(&scope, "update", Some(Candidate::Post(&draft)))
                .is_ok()
        );
        assert!(
            policy
                .check_eligible(&scope, "edit", Some(Candidate::Term(&term)))
                .is_ok()
        );
    }

    #[test]
    fn do_purge_hook_can_veto_or_force() {
        let mut context = PurgeContext::new("update", &PurgeTarget::post(42));

        let veto = policy(PurgeHooks::new().with_do_purge(|_, _| false));
        assert!(!veto.do_purge(&mut context));

        let options = PurgeOptions {
            purge_on_update: false,
            ..PurgeOptions::default()
        };
        let force = PurgePolicy::from_options(
            &options,
            Arc::new(PurgeHooks::new().with_do_purge(|_, context| {
                context.objects.push("forced".to_string());
                true
            })),
        );
        assert!(force.do_purge(&mut context));
        assert_eq!(context.objects, vec!["forced"]);

        let plain = PurgePolicy::from_options(&options, Arc::new(PurgeHooks::new()));
        assert!(!plain.do_purge(&mut context));
    }

    #[test]
    fn scopes_are_independent() {
        let mut first = RequestScope::new();
        first.mark_fired("update");
        let second = RequestScope::new();
        assert!(first.has_fired("update"));
        assert!(!second.has_fired("update"));
        assert_ne!(first.id(), second.id());
    }
}
