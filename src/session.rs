use crate::error::ClaimError;
use crate::resolver::{Eligibility, EligibilityResolver, EligibilityStatus, HolderRecord};
use crate::submitter::ClaimSubmitter;
use crate::tracker::ClaimTracker;
use alloy::primitives::TxHash;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Where a single claim attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimState {
    Idle,
    Checking,
    NotEligible(HolderRecord),
    AlreadyClaimed {
        holder: HolderRecord,
        amount: u128,
    },
    Eligible(Eligibility),
    Approving(Eligibility),
    Submitting(Eligibility),
    Confirming {
        eligibility: Eligibility,
        tx_hash: TxHash,
    },
    Claimed {
        holder: HolderRecord,
        tx_hash: TxHash,
    },
    /// `eligibility` is kept when the failure happened after a successful
    /// check, which is what makes `claim()` retryable from here. `tx_hash` is
    /// a broadcast claim that was never seen mined or reverted; a retry polls
    /// it again before sending anything new.
    Failed {
        reason: ClaimError,
        eligibility: Option<Eligibility>,
        tx_hash: Option<TxHash>,
    },
}

impl ClaimState {
    /// A transaction may be in flight; the session must not be reset.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ClaimState::Approving(_) | ClaimState::Submitting(_) | ClaimState::Confirming { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClaimState::Claimed { .. }
                | ClaimState::NotEligible(_)
                | ClaimState::AlreadyClaimed { .. }
        )
    }
}

/// Drives one wallet through check → approve → claim → confirm.
///
/// Every transition is published on a watch channel so a front end can render
/// it. A claim attempt runs on its own task from the first approval request to
/// the final receipt, so it settles even if the caller stops waiting.
pub struct ClaimSession {
    resolver: Arc<EligibilityResolver>,
    submitter: Arc<ClaimSubmitter>,
    tracker: Arc<ClaimTracker>,
    state: Arc<watch::Sender<ClaimState>>,
}

impl ClaimSession {
    pub fn new(
        resolver: Arc<EligibilityResolver>,
        submitter: Arc<ClaimSubmitter>,
        tracker: Arc<ClaimTracker>,
    ) -> Self {
        let (state, _) = watch::channel(ClaimState::Idle);
        Self {
            resolver,
            submitter,
            tracker,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> ClaimState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClaimState> {
        self.state.subscribe()
    }

    /// Back to `Idle`, e.g. when the view is left. Ignored while a
    /// transaction is in flight.
    pub fn reset(&self) {
        let current = self.state();
        if current.is_busy() {
            warn!("Not resetting claim session while {:?}", current);
            return;
        }
        self.state.send_replace(ClaimState::Idle);
    }

    /// Resolves eligibility for the connected wallet. Also the retry after a
    /// failed check.
    pub async fn check(&self) -> ClaimState {
        let current = self.state();
        if current.is_busy() {
            return current;
        }
        self.state.send_replace(ClaimState::Checking);

        let account = self.submitter.account();
        let next = match self.resolver.resolve_address(account).await {
            Ok(eligibility) => match eligibility.status {
                EligibilityStatus::NotEligible => ClaimState::NotEligible(eligibility.holder),
                EligibilityStatus::AlreadyClaimed { amount } => ClaimState::AlreadyClaimed {
                    holder: eligibility.holder,
                    amount,
                },
                EligibilityStatus::Eligible if self.tracker.has_claimed(&account) => {
                    // chain has not caught up with a claim confirmed here
                    info!("{} has a local claim record; not prompting again", account);
                    ClaimState::AlreadyClaimed {
                        holder: eligibility.holder,
                        amount: eligibility.holder.claimable_amount,
                    }
                }
                EligibilityStatus::Eligible => ClaimState::Eligible(eligibility),
            },
            Err(reason) => {
                error!("Eligibility check failed: {:?}", reason);
                ClaimState::Failed {
                    reason,
                    eligibility: None,
                    tx_hash: None,
                }
            }
        };
        self.state.send_replace(next.clone());
        next
    }

    /// Runs approval (when needed), submission and confirmation and returns
    /// the state the attempt settled in.
    pub async fn claim(&self) -> ClaimState {
        let mut start = None;
        // the busy state is taken in the same step as the check so two callers
        // cannot both start an attempt
        self.state.send_if_modified(|current| {
            let (eligibility, unconfirmed) = match current {
                ClaimState::Eligible(eligibility) => (*eligibility, None),
                ClaimState::Failed {
                    eligibility: Some(eligibility),
                    tx_hash,
                    ..
                } => (*eligibility, *tx_hash),
                _ => return false,
            };
            *current = match unconfirmed {
                Some(tx_hash) => ClaimState::Confirming {
                    eligibility,
                    tx_hash,
                },
                None if self.submitter.needs_approval(&eligibility)
                    && !self.submitter.is_approved() =>
                {
                    ClaimState::Approving(eligibility)
                }
                None => ClaimState::Submitting(eligibility),
            };
            start = Some((eligibility, unconfirmed));
            true
        });
        let Some((eligibility, unconfirmed)) = start else {
            let current = self.state();
            warn!("Claim not available in state {:?}", current);
            return current;
        };

        let attempt = ClaimAttempt {
            submitter: Arc::clone(&self.submitter),
            tracker: Arc::clone(&self.tracker),
            state: Arc::clone(&self.state),
        };
        match tokio::spawn(attempt.run(eligibility, unconfirmed)).await {
            Ok(next) => next,
            Err(e) => {
                error!("Claim task aborted: {}", e);
                self.state()
            }
        }
    }
}

/// One approve → claim → confirm run, owned by its own task.
struct ClaimAttempt {
    submitter: Arc<ClaimSubmitter>,
    tracker: Arc<ClaimTracker>,
    state: Arc<watch::Sender<ClaimState>>,
}

impl ClaimAttempt {
    async fn run(self, eligibility: Eligibility, unconfirmed: Option<TxHash>) -> ClaimState {
        let next = self.drive(eligibility, unconfirmed).await;
        self.state.send_replace(next.clone());
        next
    }

    async fn drive(&self, eligibility: Eligibility, unconfirmed: Option<TxHash>) -> ClaimState {
        if let Some(tx_hash) = unconfirmed {
            info!("Polling earlier claim {} before sending another", tx_hash);
            match self.submitter.confirm(tx_hash).await {
                Ok(()) => return self.confirmed(eligibility, tx_hash),
                Err(ClaimError::ContractReverted(_)) => {
                    warn!("Earlier claim {} reverted; submitting again", tx_hash);
                }
                Err(reason) => return failed(eligibility, reason, Some(tx_hash)),
            }
        }

        if self.submitter.needs_approval(&eligibility) && !self.submitter.is_approved() {
            self.state.send_replace(ClaimState::Approving(eligibility));
            if let Err(reason) = self.submitter.ensure_approval(&eligibility).await {
                return failed(eligibility, reason, None);
            }
        }

        self.state.send_replace(ClaimState::Submitting(eligibility));
        let tx_hash = match self.submitter.send_claim(&eligibility).await {
            Ok(tx_hash) => tx_hash,
            Err(reason) => return failed(eligibility, reason, None),
        };
        self.state.send_replace(ClaimState::Confirming {
            eligibility,
            tx_hash,
        });

        match self.submitter.confirm(tx_hash).await {
            Ok(()) => self.confirmed(eligibility, tx_hash),
            Err(reason @ ClaimError::ContractReverted(_)) => failed(eligibility, reason, None),
            Err(reason) => failed(eligibility, reason, Some(tx_hash)),
        }
    }

    fn confirmed(&self, eligibility: Eligibility, tx_hash: TxHash) -> ClaimState {
        if let Err(e) = self
            .tracker
            .record_claim(&eligibility.holder.address, Some(tx_hash))
        {
            warn!("Claim {} confirmed but not recorded: {}", tx_hash, e);
        }
        info!("Claim confirmed {}", tx_hash);
        ClaimState::Claimed {
            holder: eligibility.holder,
            tx_hash,
        }
    }
}

fn failed(eligibility: Eligibility, reason: ClaimError, tx_hash: Option<TxHash>) -> ClaimState {
    if reason == ClaimError::UserRejected {
        info!("User rejected the request");
        return ClaimState::Eligible(eligibility);
    }
    error!("Claim failed: {:?}", reason);
    ClaimState::Failed {
        reason,
        eligibility: Some(eligibility),
        tx_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::{Call, FakeChain};
    use crate::chain::ClaimParams;
    use crate::index::TokenIndex;
    use crate::state::{ClaimConfig, ContractVersion};
    use alloy::primitives::Address;
    use std::time::Duration;

    fn wallet() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn session_with(
        chain: Arc<FakeChain>,
        version: ContractVersion,
    ) -> (ClaimSession, Arc<ClaimTracker>) {
        session_with_limit(chain, version, Duration::from_secs(5))
    }

    fn session_with_limit(
        chain: Arc<FakeChain>,
        version: ContractVersion,
        confirmation_timeout: Duration,
    ) -> (ClaimSession, Arc<ClaimTracker>) {
        let tracker = Arc::new(ClaimTracker::in_memory());
        let resolver = Arc::new(EligibilityResolver::new(
            chain.clone(),
            ClaimConfig::default(),
            Duration::from_secs(1),
        ));
        let submitter = Arc::new(
            ClaimSubmitter::new(
                chain,
                Arc::new(TokenIndex::default()),
                version,
                Address::repeat_byte(0xcc),
                Duration::from_secs(1),
                confirmation_timeout,
            )
            .with_poll_interval(Duration::from_millis(5)),
        );
        (
            ClaimSession::new(resolver, submitter, tracker.clone()),
            tracker,
        )
    }

    fn approval_version() -> ContractVersion {
        ContractVersion {
            requires_token_id_params: false,
            requires_approval_check: true,
        }
    }

    #[tokio::test]
    async fn test_full_claim_then_already_claimed() {
        let mut chain = FakeChain::new(wallet());
        chain.primary.insert(wallet(), 136);
        let chain = Arc::new(chain);
        let (session, tracker) = session_with(chain.clone(), approval_version());

        assert_eq!(session.state(), ClaimState::Idle);
        let checked = session.check().await;
        match &checked {
            ClaimState::Eligible(eligibility) => {
                assert_eq!(eligibility.holder.claimable_amount, 3_400_000)
            }
            other => panic!("unexpected {other:?}"),
        }

        let claimed = session.claim().await;
        assert!(matches!(claimed, ClaimState::Claimed { .. }));
        assert!(claimed.is_terminal());
        assert!(tracker.has_claimed(&wallet()));
        assert_eq!(chain.calls(), vec![Call::Claim(ClaimParams::Balance)]);

        session.reset();
        assert!(matches!(
            session.check().await,
            ClaimState::AlreadyClaimed {
                amount: 3_400_000,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_not_eligible_offers_no_claim() {
        let chain = Arc::new(FakeChain::new(wallet()));
        let (session, _) = session_with(chain.clone(), approval_version());

        assert!(matches!(session.check().await, ClaimState::NotEligible(_)));
        assert!(matches!(session.claim().await, ClaimState::NotEligible(_)));
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_approval_returns_to_eligible() {
        let mut chain = FakeChain::new(wallet());
        chain.secondary.insert(wallet(), 3);
        chain.approval_error = Some(ClaimError::UserRejected);
        let chain = Arc::new(chain);
        let (session, tracker) = session_with(chain.clone(), approval_version());

        session.check().await;
        assert!(matches!(session.claim().await, ClaimState::Eligible(_)));
        assert!(chain.calls().is_empty());
        assert!(!tracker.has_claimed(&wallet()));
    }

    #[tokio::test]
    async fn test_failed_claim_can_be_retried() {
        let mut chain = FakeChain::new(wallet());
        chain.secondary.insert(wallet(), 3);
        let chain = Arc::new(chain);
        chain
            .claim_errors
            .lock()
            .unwrap()
            .push(ClaimError::InsufficientFunds);
        let (session, _) = session_with(chain.clone(), approval_version());

        session.check().await;
        match session.claim().await {
            ClaimState::Failed {
                reason,
                eligibility,
                tx_hash,
            } => {
                assert_eq!(reason, ClaimError::InsufficientFunds);
                assert!(eligibility.is_some());
                assert_eq!(tx_hash, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(session.claim().await, ClaimState::Claimed { .. }));
        let approvals = chain
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::Approval(_)))
            .count();
        assert_eq!(approvals, 1);
    }

    #[tokio::test]
    async fn test_failed_check_is_retryable() {
        let mut chain = FakeChain::new(wallet());
        chain.primary.insert(wallet(), 1);
        chain.read_delay = Some(Duration::from_secs(5));
        let chain = Arc::new(chain);
        let tracker = Arc::new(ClaimTracker::in_memory());
        let resolver = Arc::new(EligibilityResolver::new(
            chain.clone(),
            ClaimConfig::default(),
            Duration::from_millis(20),
        ));
        let submitter = Arc::new(ClaimSubmitter::new(
            chain,
            Arc::new(TokenIndex::default()),
            ContractVersion::default(),
            Address::repeat_byte(0xcc),
            Duration::from_millis(20),
            Duration::from_secs(1),
        ));
        let session = ClaimSession::new(resolver, submitter, tracker.clone());

        match session.check().await {
            ClaimState::Failed {
                reason: ClaimError::Network(_),
                eligibility: None,
                tx_hash: None,
            } => {}
            other => panic!("unexpected {other:?}"),
        }
        // nothing to claim from a failed check
        assert!(matches!(session.claim().await, ClaimState::Failed { .. }));
        assert!(!tracker.has_claimed(&wallet()));
    }

    #[tokio::test]
    async fn test_local_record_suppresses_prompt() {
        let mut chain = FakeChain::new(wallet());
        chain.primary.insert(wallet(), 4);
        let (session, tracker) = session_with(Arc::new(chain), approval_version());
        tracker.record_claim(&wallet(), None).unwrap();

        assert!(matches!(
            session.check().await,
            ClaimState::AlreadyClaimed {
                amount: 100_000,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_confirmation_outlives_dropped_claim() {
        let mut chain = FakeChain::new(wallet());
        chain.primary.insert(wallet(), 2);
        chain.confirm_after_polls = 20;
        let chain = Arc::new(chain);
        let (session, tracker) = session_with(chain, approval_version());
        session.check().await;

        let mut rx = session.subscribe();
        let abandoned = tokio::time::timeout(Duration::from_millis(20), session.claim()).await;
        assert!(abandoned.is_err());
        assert!(matches!(session.state(), ClaimState::Confirming { .. }));

        // reset is refused while the transaction is in flight
        session.reset();
        assert!(session.state().is_busy());

        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|state| matches!(state, ClaimState::Claimed { .. })),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(tracker.has_claimed(&wallet()));
    }

    #[tokio::test]
    async fn test_approval_outlives_dropped_claim() {
        let mut chain = FakeChain::new(wallet());
        chain.secondary.insert(wallet(), 3);
        chain.confirm_after_polls = 20;
        let chain = Arc::new(chain);
        let (session, tracker) = session_with(chain.clone(), approval_version());
        session.check().await;

        let mut rx = session.subscribe();
        let abandoned = tokio::time::timeout(Duration::from_millis(20), session.claim()).await;
        assert!(abandoned.is_err());
        assert!(matches!(session.state(), ClaimState::Approving(_)));

        session.reset();
        assert!(session.state().is_busy());

        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|state| matches!(state, ClaimState::Claimed { .. })),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(
            chain.calls(),
            vec![
                Call::Approval(Address::repeat_byte(0xcc)),
                Call::Claim(ClaimParams::Balance)
            ]
        );
        assert!(tracker.has_claimed(&wallet()));

        session.reset();
        assert_eq!(session.state(), ClaimState::Idle);
    }

    #[tokio::test]
    async fn test_second_claim_is_refused_while_first_runs() {
        let mut chain = FakeChain::new(wallet());
        chain.primary.insert(wallet(), 1);
        chain.confirm_after_polls = 10;
        let chain = Arc::new(chain);
        let (session, _) = session_with(chain.clone(), approval_version());
        session.check().await;

        let (first, second) = tokio::join!(session.claim(), session.claim());

        assert!(matches!(first, ClaimState::Claimed { .. }));
        assert!(second.is_busy());
        assert_eq!(chain.calls(), vec![Call::Claim(ClaimParams::Balance)]);
    }

    #[tokio::test]
    async fn test_retry_polls_unconfirmed_claim_instead_of_resending() {
        let mut chain = FakeChain::new(wallet());
        chain.primary.insert(wallet(), 2);
        chain.confirm_after_polls = 1_000;
        let chain = Arc::new(chain);
        let (session, tracker) =
            session_with_limit(chain.clone(), approval_version(), Duration::from_millis(100));
        session.check().await;

        let pending = match session.claim().await {
            ClaimState::Failed {
                reason: ClaimError::Network(_),
                eligibility: Some(_),
                tx_hash: Some(tx_hash),
            } => tx_hash,
            other => panic!("unexpected {other:?}"),
        };

        // still pending: the retry keeps watching the same transaction
        match session.claim().await {
            ClaimState::Failed { tx_hash, .. } => assert_eq!(tx_hash, Some(pending)),
            other => panic!("unexpected {other:?}"),
        }

        // the transaction lands; the next retry picks it up
        chain.statuses.lock().unwrap().get_mut(&pending).unwrap().1 = 0;
        assert_eq!(
            session.claim().await,
            ClaimState::Claimed {
                holder: HolderRecord::new(wallet(), 2, 0, 25_000),
                tx_hash: pending,
            }
        );
        assert_eq!(chain.calls(), vec![Call::Claim(ClaimParams::Balance)]);
        assert_eq!(tracker.get(&wallet()).unwrap().tx_hash, Some(pending));
    }

    #[tokio::test]
    async fn test_retry_after_reverted_claim_sends_again() {
        let mut chain = FakeChain::new(wallet());
        chain.primary.insert(wallet(), 2);
        chain.revert_claims = true;
        let chain = Arc::new(chain);
        let (session, _) = session_with(chain.clone(), approval_version());
        session.check().await;

        match session.claim().await {
            ClaimState::Failed {
                reason: ClaimError::ContractReverted(None),
                tx_hash: None,
                ..
            } => {}
            other => panic!("unexpected {other:?}"),
        }
        session.claim().await;
        assert_eq!(
            chain.calls(),
            vec![
                Call::Claim(ClaimParams::Balance),
                Call::Claim(ClaimParams::Balance)
            ]
        );
    }
}
