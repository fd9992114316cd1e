//! Ordered matcher-to-manager composition
//!
//! The composed manager walks its entries in registration order; the first
//! entry whose matcher selects the resource decides, and no later entry is
//! consulted. A resource matched by no entry is denied: any resource
//! reachable by no explicit rule must be inaccessible, not silently open.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::decision::Decision;
use crate::error::{AuthzError, Result};
use crate::manager::{
    AsyncPrincipalSupplier, AuthorizationEventPublisher, AuthorizationManager, PrincipalSupplier,
};
use crate::matcher::ResourceMatcher;
use crate::resource::ResourceDescriptor;

const NO_MATCHING_RULE: &str = "no matching rule";

/// One ordered (matcher, manager) pair
pub struct MatcherEntry {
    matcher: Arc<dyn ResourceMatcher>,
    manager: Arc<dyn AuthorizationManager>,
}

/// Composes an ordered entry list into one manager.
///
/// The list is built once at configuration time and is immutable
/// thereafter; iteration takes no lock.
pub struct DelegatingAuthorizationManager {
    entries: Vec<MatcherEntry>,
    publisher: Option<Arc<dyn AuthorizationEventPublisher>>,
}

impl DelegatingAuthorizationManager {
    pub fn builder() -> DelegatingAuthorizationManagerBuilder {
        DelegatingAuthorizationManagerBuilder {
            entries: Vec::new(),
            publisher: None,
        }
    }

    fn select(&self, resource: &ResourceDescriptor) -> Option<(usize, &MatcherEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.matcher.matches(resource))
    }

    fn publish(&self, resource: &ResourceDescriptor, decision: &Decision) {
        if let Some(publisher) = &self.publisher {
            publisher.decision_made(resource, decision);
        }
    }
}

#[async_trait(?Send)]
impl AuthorizationManager for DelegatingAuthorizationManager {
    fn check(
        &self,
        principal: &dyn PrincipalSupplier,
        resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        let decision = match self.select(resource) {
            Some((position, entry)) => {
                debug!(position, "matcher selected entry");
                entry.manager.check(principal, resource)?
            }
            None => {
                debug!("no entry matched; denying by default");
                Decision::denied(NO_MATCHING_RULE)
            }
        };
        self.publish(resource, &decision);
        Ok(decision)
    }

    async fn check_async(
        &self,
        principal: &dyn AsyncPrincipalSupplier,
        resource: &ResourceDescriptor,
    ) -> Result<Decision> {
        let decision = match self.select(resource) {
            Some((position, entry)) => {
                debug!(position, "matcher selected entry");
                entry.manager.check_async(principal, resource).await?
            }
            None => {
                debug!("no entry matched; denying by default");
                Decision::denied(NO_MATCHING_RULE)
            }
        };
        self.publish(resource, &decision);
        Ok(decision)
    }
}

/// Builder for [`DelegatingAuthorizationManager`]
pub struct DelegatingAuthorizationManagerBuilder {
    entries: Vec<MatcherEntry>,
    publisher: Option<Arc<dyn AuthorizationEventPublisher>>,
}

impl DelegatingAuthorizationManagerBuilder {
    /// Append an entry. Registration order is evaluation order.
    ///
    /// Re-registering the same matcher instance is rejected; overlapping
    /// matchers are fine and resolved purely by order.
    pub fn add(
        mut self,
        matcher: Arc<dyn ResourceMatcher>,
        manager: Arc<dyn AuthorizationManager>,
    ) -> Result<Self> {
        if self
            .entries
            .iter()
            .any(|entry| Arc::ptr_eq(&entry.matcher, &matcher))
        {
            return Err(AuthzError::InvalidConfiguration(
                "matcher instance registered twice".to_string(),
            ));
        }
        self.entries.push(MatcherEntry { matcher, manager });
        Ok(self)
    }

    /// Publish every composed decision to the given publisher
    pub fn with_event_publisher(mut self, publisher: Arc<dyn AuthorizationEventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> DelegatingAuthorizationManager {
        info!(entries = self.entries.len(), "composed authorization manager");
        DelegatingAuthorizationManager {
            entries: self.entries,
            publisher: self.publisher,
        }
    }
}
