//! Purge pipeline.
//!
//! Runs one change event through subscription check, eligibility gates, tag
//! derivation, context assembly, the final go/no-go and the API call. The
//! pipeline itself holds no per-event state; the caller passes the
//! [`RequestScope`] of the inbound request it is handling.

use std::sync::Arc;

use edgepurge_ccu_types::{PurgeMethod, purge_path};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::content::ContentSource;
use crate::options::PurgeOptions;

use super::client::{PurgeClient, PurgeResponse};
use super::context::{
    PurgeContext, PurgeTarget, purge_info, resolve_purge_network, resolve_purge_type,
};
use super::error::PurgeError;
use super::events::{ChangeEvent, Subscriptions};
use super::hooks::PurgeHooks;
use super::policy::{Candidate, PurgePolicy, RequestScope, SkipReason};
use super::tags::{SiteIdentity, TagBuilder, dedup_tags};

const METRIC_PURGE_SKIPPED_TOTAL: &str = "edgepurge_purge_skipped_total";

/// How one event ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurgeOutcome {
    /// Stopped before a context was built.
    Skipped { reason: SkipReason },
    /// The go/no-go decision was negative.
    Vetoed { context: PurgeContext },
    /// A request went out; `response` says how it went.
    Sent {
        context: PurgeContext,
        response: PurgeResponse,
    },
}

impl PurgeOutcome {
    pub fn response(&self) -> Option<&PurgeResponse> {
        match self {
            Self::Sent { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// Owns the purge services. Build once and share.
///
/// # Usage
///
/// ```ignore
/// let mut scope = RequestScope::new();
/// let outcome = pipeline.post_changed(&mut scope, post.id, "update").await;
/// ```
pub struct PurgePipeline {
    options: PurgeOptions,
    tags: TagBuilder,
    policy: PurgePolicy,
    client: PurgeClient,
    subscriptions: Subscriptions,
}

pub struct PurgePipelineBuilder {
    options: PurgeOptions,
    content: Arc<dyn ContentSource>,
    client: PurgeClient,
    hooks: PurgeHooks,
    tenant: Option<u64>,
}

impl PurgePipelineBuilder {
    pub fn hooks(mut self, hooks: PurgeHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Run in multi-tenant mode as `tenant`.
    pub fn tenant(mut self, tenant: Option<u64>) -> Self {
        self.tenant = tenant;
        self
    }

    pub fn build(self) -> PurgePipeline {
        let hooks = Arc::new(self.hooks);
        let tags = TagBuilder::new(
            SiteIdentity::from_options(&self.options, self.tenant),
            self.content,
            Arc::clone(&hooks),
            &self.options,
        );
        let policy = PurgePolicy::from_options(&self.options, hooks);
        let client = self.client.with_request_logging(self.options.log_purge);

        PurgePipeline {
            subscriptions: Subscriptions::from_options(&self.options),
            options: self.options,
            tags,
            policy,
            client,
        }
    }
}

impl PurgePipeline {
    pub fn builder(
        options: PurgeOptions,
        content: Arc<dyn ContentSource>,
        client: PurgeClient,
    ) -> PurgePipelineBuilder {
        PurgePipelineBuilder {
            options,
            content,
            client,
            hooks: PurgeHooks::default(),
            tenant: None,
        }
    }

    pub fn options(&self) -> &PurgeOptions {
        &self.options
    }

    pub fn tags(&self) -> &TagBuilder {
        &self.tags
    }

    pub fn policy(&self) -> &PurgePolicy {
        &self.policy
    }

    pub fn client(&self) -> &PurgeClient {
        &self.client
    }

    pub fn purge_info(&self, action: &str, target: &PurgeTarget) -> PurgeContext {
        purge_info(&self.tags, &self.options, action, target)
    }

    /// Run `event` to completion within `scope`.
    #[instrument(
        skip_all,
        fields(event_id = %event.id, scope_id = %scope.id(), action = event.kind.action())
    )]
    pub async fn handle(&self, scope: &mut RequestScope, event: &ChangeEvent) -> PurgeOutcome {
        let kind = &event.kind;
        let action = kind.action();

        if !self.subscriptions.is_subscribed(kind) {
            return skipped(SkipReason::UnsubscribedAction);
        }

        let target = kind.target();
        if let Err(reason) = self.check_eligible(scope, action, &target) {
            return skipped(reason);
        }

        let mut context = self.purge_info(action, &target);
        debug!(
            object_kind = %context.object_kind,
            object_id = context.object_id,
            objects = context.objects.len(),
            "Purge context assembled"
        );

        if !self.policy.do_purge(&mut context) {
            info!(
                object_kind = %context.object_kind,
                object_id = context.object_id,
                "Purge vetoed"
            );
            return PurgeOutcome::Vetoed { context };
        }

        if context.objects.is_empty() {
            return skipped(SkipReason::NoObjects);
        }

        let response = self
            .client
            .purge(
                context.purge_method,
                &context.path(),
                &context.objects,
                context.request_hostname(),
            )
            .await;
        scope.mark_fired(action);

        match response.error() {
            None => info!(
                object_kind = %context.object_kind,
                object_id = context.object_id,
                method = %context.purge_method,
                network = %context.purge_network,
                objects = context.objects.len(),
                "Purge request sent"
            ),
            Some(error) => warn!(
                object_kind = %context.object_kind,
                object_id = context.object_id,
                error,
                "Purge request failed"
            ),
        }

        PurgeOutcome::Sent { context, response }
    }

    pub async fn post_changed(
        &self,
        scope: &mut RequestScope,
        post_id: u64,
        action: &str,
    ) -> PurgeOutcome {
        self.handle(scope, &ChangeEvent::post_changed(post_id, action))
            .await
    }

    pub async fn term_changed(
        &self,
        scope: &mut RequestScope,
        term_id: u64,
        action: &str,
        term_taxonomy_id: u64,
        taxonomy: &str,
    ) -> PurgeOutcome {
        let event = ChangeEvent::term_changed(term_id, action, term_taxonomy_id, taxonomy);
        self.handle(scope, &event).await
    }

    pub async fn user_changed(
        &self,
        scope: &mut RequestScope,
        user_id: u64,
        action: &str,
    ) -> PurgeOutcome {
        self.handle(scope, &ChangeEvent::user_changed(user_id, action))
            .await
    }

    /// Purge every object of this tenant through the bare site prefix tag.
    #[instrument(skip_all)]
    pub async fn purge_all(&self) -> PurgeResponse {
        let path = purge_path(
            resolve_purge_type(&self.options),
            PurgeMethod::Tags,
            resolve_purge_network(&self.options),
        );
        let objects = vec![self.tags.site_prefix()];
        info!(prefix = %objects[0], "Purging all objects of site");
        self.client
            .purge(PurgeMethod::Tags, &path, &objects, None)
            .await
    }

    /// Purge explicit URLs.
    #[instrument(skip_all, fields(count = urls.len()))]
    pub async fn purge_urls(&self, urls: &[String]) -> PurgeResponse {
        let path = purge_path(
            resolve_purge_type(&self.options),
            PurgeMethod::Url,
            resolve_purge_network(&self.options),
        );
        let objects = dedup_tags(
            urls.iter()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
        );
        if objects.is_empty() {
            let error = PurgeError::configuration("no URLs to purge");
            warn!(error = %error, "Purge request not attempted");
            return PurgeResponse::failed(error.to_string(), None);
        }
        self.client
            .purge(
                PurgeMethod::Url,
                &path,
                &objects,
                Some(self.options.hostname.as_str()),
            )
            .await
    }

    pub async fn test_creds(&self) -> PurgeResponse {
        self.client.test_creds().await
    }

    fn check_eligible(
        &self,
        scope: &RequestScope,
        action: &str,
        target: &PurgeTarget,
    ) -> Result<(), SkipReason> {
        let content = self.tags.content();
        match target {
            PurgeTarget::Post { id } => {
                let post = content.post(*id);
                self.policy
                    .check_eligible(scope, action, post.as_ref().map(Candidate::Post))
            }
            PurgeTarget::Term { id, taxonomy, .. } => {
                let term = content.term(*id, taxonomy.as_deref());
                self.policy
                    .check_eligible(scope, action, term.as_ref().map(Candidate::Term))
            }
            PurgeTarget::User { id } => {
                let user = content.user(*id);
                self.policy
                    .check_eligible(scope, action, user.as_ref().map(Candidate::User))
            }
        }
    }
}

impl std::fmt::Debug for PurgePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgePipeline")
            .field("tags", &self.tags)
            .field("policy", &self.policy)
            .field("client", &self.client)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

fn skipped(reason: SkipReason) -> PurgeOutcome {
    debug!(reason = %reason, "Purge skipped");
    counter!(METRIC_PURGE_SKIPPED_TOTAL, "reason" => reason.as_str()).increment(1);
    PurgeOutcome::Skipped { reason }
}
