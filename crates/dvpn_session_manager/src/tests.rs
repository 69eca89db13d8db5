use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use claims::assert_ok;
use dvpn_common::db::{
    Id,
    models::{ModelError, Session},
};
use tokio_util::sync::CancellationToken;

use crate::{
    JobIntervals, SessionManager,
    chain::{Bandwidth, ChainClient, ChainSession, ChainStatus, ChainSubscription},
    error::{ChainError, PeerControlError, SessionManagerError},
    ledger::SessionLedger,
    peer::{Peer, PeerControl},
    peer_quota::PeerQuotaSummary,
};

#[derive(Default)]
struct FakePeersState {
    peers: Vec<Peer>,
    removed: Vec<String>,
    fail_list: bool,
}

#[derive(Clone, Default)]
struct FakePeers(Arc<Mutex<FakePeersState>>);

impl FakePeers {
    fn with_peers(peers: Vec<Peer>) -> Self {
        Self(Arc::new(Mutex::new(FakePeersState {
            peers,
            ..Default::default()
        })))
    }

    fn removed(&self) -> Vec<String> {
        self.0.lock().unwrap().removed.clone()
    }
}

impl PeerControl for FakePeers {
    async fn list_peers(&self) -> Result<Vec<Peer>, PeerControlError> {
        let state = self.0.lock().unwrap();
        if state.fail_list {
            return Err(PeerControlError::CommandError("interface is down".into()));
        }
        Ok(state.peers.clone())
    }

    async fn remove_peer(&self, key: &str) -> Result<(), PeerControlError> {
        let mut state = self.0.lock().unwrap();
        state.peers.retain(|peer| peer.key != key);
        state.removed.push(key.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct FakeLedgerState {
    sessions: Vec<Session<Id>>,
    writes: usize,
    fail_updates: bool,
}

#[derive(Clone, Default)]
struct FakeLedger(Arc<Mutex<FakeLedgerState>>);

impl FakeLedger {
    fn with_sessions(sessions: Vec<Session<Id>>) -> Self {
        Self(Arc::new(Mutex::new(FakeLedgerState {
            sessions,
            ..Default::default()
        })))
    }

    fn session(&self, id: Id) -> Option<Session<Id>> {
        self.0
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|session| session.id == id)
            .cloned()
    }

    fn writes(&self) -> usize {
        self.0.lock().unwrap().writes
    }
}

impl SessionLedger for FakeLedger {
    async fn find_by_key(&self, key: &str) -> Result<Option<Session<Id>>, ModelError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|session| session.key == key && !session.is_closed())
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<Session<Id>>, ModelError> {
        Ok(self.0.lock().unwrap().sessions.clone())
    }

    async fn update_counters(
        &self,
        id: Id,
        upload: u64,
        download: u64,
    ) -> Result<bool, ModelError> {
        let mut state = self.0.lock().unwrap();
        if state.fail_updates {
            return Err(ModelError::DbError(sqlx::Error::PoolTimedOut));
        }
        state.writes += 1;
        match state
            .sessions
            .iter_mut()
            .find(|session| session.id == id && !session.is_closed())
        {
            Some(session) => {
                session.upload = upload;
                session.download = download;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_address(&self, id: Id, address: &str) -> Result<(), ModelError> {
        let mut state = self.0.lock().unwrap();
        state.writes += 1;
        let session = state
            .sessions
            .iter_mut()
            .find(|session| session.id == id)
            .ok_or(ModelError::NotFound(id))?;
        session.address = address.to_string();
        Ok(())
    }

    async fn delete_closed(&self) -> Result<u64, ModelError> {
        let mut state = self.0.lock().unwrap();
        let before = state.sessions.len();
        state.sessions.retain(|session| !session.is_closed());
        Ok((before - state.sessions.len()) as u64)
    }
}

#[derive(Default)]
struct FakeChainState {
    sessions: HashMap<Id, ChainSession>,
    subscriptions: HashMap<Id, ChainSubscription>,
    status_updates: usize,
    pushed: Vec<Vec<Id>>,
    fail_status: bool,
}

#[derive(Clone, Default)]
struct FakeChain(Arc<Mutex<FakeChainState>>);

impl FakeChain {
    fn add_session(&self, id: Id, upload: u64, status: ChainStatus, status_at: DateTime<Utc>) {
        self.0.lock().unwrap().sessions.insert(
            id,
            ChainSession {
                id,
                // one subscription per session keeps fixtures simple
                subscription_id: id + 100,
                status,
                bandwidth: Bandwidth {
                    upload,
                    download: 0,
                },
                status_at,
            },
        );
    }

    fn add_subscription(&self, session_id: Id, status: ChainStatus) {
        let id = session_id + 100;
        self.0
            .lock()
            .unwrap()
            .subscriptions
            .insert(id, ChainSubscription { id, status });
    }

    fn pushed(&self) -> Vec<Vec<Id>> {
        self.0.lock().unwrap().pushed.clone()
    }
}

impl ChainClient for FakeChain {
    async fn query_session(&self, id: Id) -> Result<ChainSession, ChainError> {
        self.0
            .lock()
            .unwrap()
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("Session {id}")))
    }

    async fn query_subscription(&self, id: Id) -> Result<ChainSubscription, ChainError> {
        self.0
            .lock()
            .unwrap()
            .subscriptions
            .get(&id)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("Subscription {id}")))
    }

    async fn update_node_status(&self) -> Result<(), ChainError> {
        let mut state = self.0.lock().unwrap();
        if state.fail_status {
            return Err(ChainError::RequestError("connection refused".into()));
        }
        state.status_updates += 1;
        Ok(())
    }

    async fn update_sessions(&self, sessions: &[Session<Id>]) -> Result<(), ChainError> {
        assert!(!sessions.is_empty(), "empty session batch pushed to chain");
        self.0
            .lock()
            .unwrap()
            .pushed
            .push(sessions.iter().map(|session| session.id).collect());
        Ok(())
    }
}

fn test_session(id: Id, key: &str, upload: u64, download: u64, available: u64) -> Session<Id> {
    Session {
        id,
        key: key.into(),
        address: "sent1abc".into(),
        available,
        upload,
        download,
        created_at: Utc::now() - TimeDelta::minutes(30),
    }
}

fn peer(key: &str, upload: u64, download: u64) -> Peer {
    Peer {
        key: key.into(),
        upload,
        download,
    }
}

type TestManager = SessionManager<FakePeers, FakeLedger, FakeChain>;

fn manager(peers: &FakePeers, ledger: &FakeLedger, chain: &FakeChain) -> TestManager {
    SessionManager::new(peers.clone(), ledger.clone(), chain.clone())
}

#[tokio::test]
async fn test_unknown_peer_is_removed_without_ledger_write() {
    let peers = FakePeers::with_peers(vec![peer("k1", 10, 10), peer("intruder", 5, 5)]);
    let ledger = FakeLedger::with_sessions(vec![test_session(1, "k1", 0, 0, 200)]);
    let chain = FakeChain::default();

    let summary = manager(&peers, &ledger, &chain)
        .enforce_peer_quotas()
        .await
        .unwrap();

    assert_eq!(peers.removed(), vec!["intruder".to_string()]);
    assert_eq!(summary.unknown_removed, 1);
    // only the known peer caused a ledger write
    assert_eq!(ledger.writes(), 1);
}

#[tokio::test]
async fn test_counters_refreshed_under_quota() {
    let peers = FakePeers::with_peers(vec![peer("k1", 120, 60)]);
    let ledger = FakeLedger::with_sessions(vec![test_session(1, "k1", 100, 50, 200)]);
    let chain = FakeChain::default();

    let summary = manager(&peers, &ledger, &chain)
        .enforce_peer_quotas()
        .await
        .unwrap();

    let session = ledger.session(1).unwrap();
    assert_eq!((session.upload, session.download), (120, 60));
    assert!(peers.removed().is_empty());
    assert_eq!(
        summary,
        PeerQuotaSummary {
            peers: 1,
            counters_updated: 1,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn test_peer_over_quota_is_removed_after_counter_refresh() {
    let peers = FakePeers::with_peers(vec![peer("k1", 150, 60)]);
    let ledger = FakeLedger::with_sessions(vec![test_session(1, "k1", 100, 50, 200)]);
    let chain = FakeChain::default();

    let summary = manager(&peers, &ledger, &chain)
        .enforce_peer_quotas()
        .await
        .unwrap();

    let session = ledger.session(1).unwrap();
    assert_eq!((session.upload, session.download), (150, 60));
    assert!(!session.is_closed());
    assert_eq!(peers.removed(), vec!["k1".to_string()]);
    assert_eq!(summary.quota_removed, 1);
}

#[tokio::test]
async fn test_failed_counter_write_does_not_stop_quota_check() {
    let peers = FakePeers::with_peers(vec![peer("k1", 150, 60), peer("k2", 1, 1)]);
    let ledger = FakeLedger::with_sessions(vec![
        test_session(1, "k1", 100, 50, 200),
        test_session(2, "k2", 0, 0, 200),
    ]);
    ledger.0.lock().unwrap().fail_updates = true;
    let chain = FakeChain::default();

    let summary = manager(&peers, &ledger, &chain)
        .enforce_peer_quotas()
        .await
        .unwrap();

    assert_eq!(summary.failed_ledger_ops, 2);
    assert_eq!(summary.quota_removed, 1);
    assert_eq!(peers.removed(), vec!["k1".to_string()]);
}

#[tokio::test]
async fn test_peer_of_closed_session_is_unknown() {
    let peers = FakePeers::with_peers(vec![peer("k1", 10, 10)]);
    let mut closed = test_session(1, "k1", 0, 0, 200);
    closed.address = String::new();
    let ledger = FakeLedger::with_sessions(vec![closed]);
    let chain = FakeChain::default();

    manager(&peers, &ledger, &chain)
        .enforce_peer_quotas()
        .await
        .unwrap();

    assert_eq!(peers.removed(), vec!["k1".to_string()]);
    assert_eq!(ledger.writes(), 0);
}

#[tokio::test]
async fn test_peer_listing_failure_is_fatal() {
    let peers = FakePeers::default();
    peers.0.lock().unwrap().fail_list = true;
    let ledger = FakeLedger::default();
    let chain = FakeChain::default();

    let result = manager(&peers, &ledger, &chain)
        .run_peer_quota_job(Duration::from_secs(10), CancellationToken::new())
        .await;
    assert!(matches!(
        result,
        Err(SessionManagerError::PeerControlError(_))
    ));
}

#[tokio::test]
async fn test_stale_session_is_skipped_and_peer_removed() {
    let peers = FakePeers::with_peers(vec![peer("k1", 0, 0)]);
    let ledger = FakeLedger::with_sessions(vec![test_session(1, "k1", 10, 50, 200)]);
    let chain = FakeChain::default();
    chain.add_session(1, 50, ChainStatus::Active, Utc::now() - TimeDelta::minutes(1));
    chain.add_subscription(1, ChainStatus::Active);

    let summary = manager(&peers, &ledger, &chain)
        .reconcile_sessions()
        .await
        .unwrap();

    assert_eq!(summary.stale, 1);
    assert_eq!(peers.removed(), vec!["k1".to_string()]);
    assert!(!ledger.session(1).unwrap().is_closed());
    // nothing left to push
    assert!(chain.pushed().is_empty());
}

#[tokio::test]
async fn test_inactive_subscription_closes_and_sweeps_session() {
    let peers = FakePeers::default();
    let ledger = FakeLedger::with_sessions(vec![
        test_session(1, "k1", 10, 50, 200),
        test_session(2, "k2", 10, 70, 200),
    ]);
    let chain = FakeChain::default();
    let status_at = Utc::now() - TimeDelta::minutes(1);
    chain.add_session(1, 40, ChainStatus::Active, status_at);
    chain.add_subscription(1, ChainStatus::Inactive);
    chain.add_session(2, 60, ChainStatus::Active, status_at);
    chain.add_subscription(2, ChainStatus::Active);

    let summary = manager(&peers, &ledger, &chain)
        .reconcile_sessions()
        .await
        .unwrap();

    assert_eq!(peers.removed(), vec!["k1".to_string()]);
    assert_eq!(chain.pushed(), vec![vec![2]]);
    assert_eq!(summary.closed, 1);
    assert_eq!(summary.swept, 1);
    assert!(ledger.session(1).is_none());
    assert!(ledger.session(2).is_some());
}

#[tokio::test]
async fn test_pending_subscription_removes_peer_but_keeps_session() {
    let peers = FakePeers::default();
    let ledger = FakeLedger::with_sessions(vec![test_session(1, "k1", 10, 50, 200)]);
    let chain = FakeChain::default();
    chain.add_session(1, 40, ChainStatus::Active, Utc::now());
    chain.add_subscription(1, ChainStatus::InactivePending);

    let summary = manager(&peers, &ledger, &chain)
        .reconcile_sessions()
        .await
        .unwrap();

    assert_eq!(summary.invalid_subscription, 1);
    assert_eq!(peers.removed(), vec!["k1".to_string()]);
    assert!(!ledger.session(1).unwrap().is_closed());
    assert_eq!(chain.pushed(), vec![vec![1]]);
}

#[tokio::test]
async fn test_invalid_session_status_removes_peer() {
    let peers = FakePeers::default();
    let ledger = FakeLedger::with_sessions(vec![test_session(1, "k1", 10, 50, 200)]);
    let chain = FakeChain::default();
    chain.add_session(1, 40, ChainStatus::InactivePending, Utc::now());
    chain.add_subscription(1, ChainStatus::Active);

    let summary = manager(&peers, &ledger, &chain)
        .reconcile_sessions()
        .await
        .unwrap();

    assert_eq!(summary.invalid_session, 1);
    assert_eq!(peers.removed(), vec!["k1".to_string()]);
    assert_eq!(summary.closed, 0);
    assert_eq!(chain.pushed(), vec![vec![1]]);
}

#[tokio::test]
async fn test_healthy_sessions_pushed_in_insertion_order() {
    let peers = FakePeers::default();
    let ledger = FakeLedger::with_sessions(vec![
        test_session(1, "k1", 10, 50, 200),
        test_session(2, "k2", 10, 60, 200),
        test_session(3, "k3", 10, 70, 200),
    ]);
    let chain = FakeChain::default();
    for id in 1..=3 {
        chain.add_session(id, 0, ChainStatus::Active, Utc::now());
        chain.add_subscription(id, ChainStatus::Active);
    }

    let summary = manager(&peers, &ledger, &chain)
        .reconcile_sessions()
        .await
        .unwrap();

    assert_eq!(chain.pushed(), vec![vec![1, 2, 3]]);
    assert_eq!(summary.pushed, 3);
    assert!(peers.removed().is_empty());
}

#[tokio::test]
async fn test_closed_sessions_are_swept_without_push() {
    let peers = FakePeers::default();
    let mut closed = test_session(1, "k1", 10, 50, 200);
    closed.address = String::new();
    let ledger = FakeLedger::with_sessions(vec![closed]);
    let chain = FakeChain::default();

    let summary = manager(&peers, &ledger, &chain)
        .reconcile_sessions()
        .await
        .unwrap();

    assert!(chain.pushed().is_empty());
    assert_eq!(summary.swept, 1);
    assert!(ledger.session(1).is_none());
}

#[tokio::test]
async fn test_chain_query_failure_is_fatal() {
    let peers = FakePeers::default();
    let ledger = FakeLedger::with_sessions(vec![test_session(1, "k1", 10, 50, 200)]);
    let chain = FakeChain::default();

    let result = manager(&peers, &ledger, &chain).reconcile_sessions().await;
    assert!(matches!(
        result,
        Err(SessionManagerError::ChainError(ChainError::NotFound(_)))
    ));
    assert!(chain.pushed().is_empty());
}

#[tokio::test]
async fn test_both_jobs_removing_same_peer() {
    let peers = FakePeers::with_peers(vec![peer("k1", 150, 60)]);
    let ledger = FakeLedger::with_sessions(vec![test_session(1, "k1", 100, 50, 200)]);
    let chain = FakeChain::default();
    chain.add_session(1, 0, ChainStatus::Active, Utc::now());
    chain.add_subscription(1, ChainStatus::InactivePending);
    let manager = manager(&peers, &ledger, &chain);

    let (quota, reconcile) = tokio::join!(
        manager.enforce_peer_quotas(),
        manager.reconcile_sessions()
    );
    assert_ok!(quota);
    assert_ok!(reconcile);
    assert_eq!(peers.removed(), vec!["k1".to_string(), "k1".to_string()]);
}

#[tokio::test]
async fn test_cancelled_manager_stops_cleanly() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let intervals = JobIntervals {
        set_sessions: Duration::from_secs(10),
        update_status: Duration::from_secs(10),
        update_sessions: Duration::from_secs(10),
    };

    let chain = FakeChain::default();
    let manager = manager(&FakePeers::default(), &FakeLedger::default(), &chain);
    assert_ok!(manager.run(intervals, cancel).await);
    assert_eq!(chain.0.lock().unwrap().status_updates, 0);
}

#[tokio::test]
async fn test_status_push_failure_stops_manager() {
    let intervals = JobIntervals {
        set_sessions: Duration::from_secs(3600),
        update_status: Duration::from_secs(3600),
        update_sessions: Duration::from_secs(3600),
    };
    let chain = FakeChain::default();
    chain.0.lock().unwrap().fail_status = true;

    let result = crate::run_session_manager(
        FakePeers::default(),
        FakeLedger::default(),
        chain,
        intervals,
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(SessionManagerError::ChainError(ChainError::RequestError(_)))
    ));
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let intervals = JobIntervals {
        set_sessions: Duration::from_secs(10),
        update_status: Duration::ZERO,
        update_sessions: Duration::from_secs(10),
    };
    let manager = manager(
        &FakePeers::default(),
        &FakeLedger::default(),
        &FakeChain::default(),
    );

    let result = manager.run(intervals, CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(SessionManagerError::InvalidInterval("update_status"))
    ));
}
