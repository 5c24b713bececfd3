//! Explicit request context.

use chrono::{DateTime, NaiveDate, Utc};

use crate::id::{TenantId, UserId};

/// Who is acting, for which tenant, and at what time.
///
/// Built once at the edge (HTTP headers, CLI flags, test fixtures) and passed by
/// value into every application service call. Nothing below the edge reads
/// ambient session state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub actor: Option<UserId>,
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, actor: Option<UserId>) -> Self {
        Self {
            tenant_id,
            actor,
            now: Utc::now(),
        }
    }

    /// Pin the business time (tests, replays).
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}
