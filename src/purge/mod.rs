//! Purge engine.
//!
//! Turns content change events into Fast Purge requests:
//!
//! - **Tags** ([`TagBuilder`]): canonical cache tags for an object and its
//!   relations, in the form `{site-prefix}-{code}-{value}`
//! - **Policy** ([`PurgePolicy`]): eligibility gates and the final go/no-go
//! - **Context** ([`PurgeContext`]): everything one purge needs, open to the
//!   `do_purge` hook before the request goes out
//! - **Client** ([`PurgeClient`]): request construction, signing and response
//!   normalization
//! - **Pipeline** ([`PurgePipeline`]): wires the above together per event
//!
//! ## Tag codes
//!
//! | kind     | code | value     |
//! |----------|------|-----------|
//! | post     | `p`  | post id   |
//! | term     | `t`  | term id   |
//! | author   | `a`  | user id   |
//! | template | `tm` | name      |
//! | site     | `s`  | tenant id |

mod client;
mod context;
mod error;
mod events;
mod hooks;
mod pipeline;
mod policy;
mod signer;
mod tags;
#[cfg(test)]
mod test_support;
mod transport;

pub use client::{PurgeClient, PurgeResponse, normalize_response, user_agent};
pub use context::{PurgeContext, PurgeTarget, purge_info};
pub use error::PurgeError;
pub use events::{ChangeEvent, EventKind, Subscriptions};
pub use hooks::{PurgeHooks, TagKind, TagScope, TagStage};
pub use pipeline::{PurgeOutcome, PurgePipeline, PurgePipelineBuilder};
pub use policy::{Candidate, PurgePolicy, RequestScope, SkipReason};
pub use signer::{SignableRequest, Signer, SignerError, StaticAuthorization};
pub use tags::{
    CACHE_TAG_HEADER, Identified, SiteIdentity, Subject, TagBuilder, dedup_tags,
    emit_header_value,
};
pub use transport::{OutboundRequest, RawResponse, Transport, TransportError};
