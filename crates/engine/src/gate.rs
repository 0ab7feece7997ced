use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use dropgate_core::{BatchId, UserId};

use crate::transport::MembershipChecker;

/// Outcome of an access request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The requester is a member; deliver now.
    Granted(BatchId),
    /// Not a member (or the lookup failed). The intended batch is
    /// remembered; the requester should join and confirm.
    MustJoin,
}

/// Channel-membership gate in front of delivery.
///
/// Requesters who are not yet members get their intended batch id parked in
/// a single per-requester slot (later attempts overwrite it). Once they
/// confirm membership the slot is taken, so a parked batch is delivered at
/// most once. Membership-lookup errors fail closed: an error never grants
/// access.
pub struct AccessGate {
    checker: Arc<dyn MembershipChecker>,
    parked: DashMap<UserId, BatchId>,
}

impl AccessGate {
    /// Create a gate over the given membership checker.
    pub fn new(checker: Arc<dyn MembershipChecker>) -> Self {
        Self {
            checker,
            parked: DashMap::new(),
        }
    }

    /// Decide whether `requester` may receive `batch` right now.
    pub async fn request(&self, batch: BatchId, requester: UserId) -> GateDecision {
        if self.is_member(requester).await {
            self.parked.remove(&requester);
            return GateDecision::Granted(batch);
        }
        debug!(%requester, %batch, "requester gated, parking intended batch");
        self.parked.insert(requester, batch);
        GateDecision::MustJoin
    }

    /// Follow-up after the requester claims to have joined. On confirmed
    /// membership the parked batch id is taken (removed) and returned;
    /// otherwise `None` and the slot is kept for another attempt.
    pub async fn confirm(&self, requester: UserId) -> Option<BatchId> {
        if !self.is_member(requester).await {
            return None;
        }
        self.parked.remove(&requester).map(|(_, batch)| batch)
    }

    async fn is_member(&self, requester: UserId) -> bool {
        match self.checker.is_member(requester).await {
            Ok(member) => member,
            Err(e) => {
                // Fail closed.
                warn!(%requester, error = %e, "membership lookup failed, treating as non-member");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::StaticMembership;

    const REQUESTER: UserId = UserId::new(500);

    fn batch(token: &str) -> BatchId {
        BatchId::new(token)
    }

    #[tokio::test]
    async fn member_is_granted_directly() {
        let membership = Arc::new(StaticMembership::new());
        membership.add(REQUESTER);
        let gate = AccessGate::new(membership);

        let decision = gate.request(batch("b1"), REQUESTER).await;
        assert_eq!(decision, GateDecision::Granted(batch("b1")));
    }

    #[tokio::test]
    async fn non_member_is_parked_and_confirmed_once() {
        let membership = Arc::new(StaticMembership::new());
        let gate = AccessGate::new(membership.clone());

        assert_eq!(gate.request(batch("b1"), REQUESTER).await, GateDecision::MustJoin);

        // Still not a member: nothing delivered, slot kept.
        assert_eq!(gate.confirm(REQUESTER).await, None);

        membership.add(REQUESTER);
        assert_eq!(gate.confirm(REQUESTER).await, Some(batch("b1")));
        // The slot was taken; a second confirm delivers nothing.
        assert_eq!(gate.confirm(REQUESTER).await, None);
    }

    #[tokio::test]
    async fn later_attempts_overwrite_the_parked_batch() {
        let membership = Arc::new(StaticMembership::new());
        let gate = AccessGate::new(membership.clone());

        gate.request(batch("old"), REQUESTER).await;
        gate.request(batch("new"), REQUESTER).await;

        membership.add(REQUESTER);
        assert_eq!(gate.confirm(REQUESTER).await, Some(batch("new")));
    }

    #[tokio::test]
    async fn lookup_errors_fail_closed() {
        let membership = Arc::new(StaticMembership::new());
        membership.add(REQUESTER);
        membership.set_failing(true);
        let gate = AccessGate::new(membership.clone());

        assert_eq!(gate.request(batch("b1"), REQUESTER).await, GateDecision::MustJoin);
        assert_eq!(gate.confirm(REQUESTER).await, None);

        membership.set_failing(false);
        assert_eq!(gate.confirm(REQUESTER).await, Some(batch("b1")));
    }
}
