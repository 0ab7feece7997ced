//! End-to-end scenarios: upload, gated access, delivery, and retraction
//! against the in-memory store and a recording transport.

use std::sync::Arc;
use std::time::Duration;

use dropgate_core::{BatchId, ChatId, MessageId, StoredItemRef, UserId};
use dropgate_engine::testing::{RecordingTransport, StaticMembership};
use dropgate_engine::{
    AccessGate, BatchAssembler, DeliveryOrchestrator, EngineError, GateDecision,
    RetractionScheduler,
};
use dropgate_store::ArchiveStore;
use dropgate_store_memory::MemoryArchiveStore;

const UPLOADER: UserId = UserId::new(1);
const ARCHIVE: ChatId = ChatId::new(-100);
const DELAY: Duration = Duration::from_secs(600);

struct Harness {
    store: Arc<MemoryArchiveStore>,
    transport: Arc<RecordingTransport>,
    membership: Arc<StaticMembership>,
    assembler: BatchAssembler,
    gate: AccessGate,
    orchestrator: DeliveryOrchestrator,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryArchiveStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let membership = Arc::new(StaticMembership::new());
        let scheduler = Arc::new(RetractionScheduler::new(store.clone(), transport.clone()));
        let orchestrator = DeliveryOrchestrator::new(
            store.clone(),
            transport.clone(),
            scheduler,
            "auto-deletes soon, save or forward",
            DELAY,
        );
        Self {
            assembler: BatchAssembler::new(store.clone()),
            gate: AccessGate::new(membership.clone()),
            store,
            transport,
            membership,
            orchestrator,
        }
    }

    /// Stage `count` items and finalize, as an authorized uploader would.
    async fn upload_batch(&self, count: i64, caption: Option<&str>) -> BatchId {
        for msg in 1..=count {
            self.assembler
                .add_item(
                    UPLOADER,
                    StoredItemRef::new(ARCHIVE, MessageId::new(msg)),
                    caption.map(str::to_owned),
                )
                .await;
        }
        self.assembler.finalize(UPLOADER).await.unwrap()
    }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// Scenario A: upload three items with a caption, finalize, read back.
#[tokio::test]
async fn scenario_a_upload_and_finalize() {
    let h = Harness::new();
    let id = h.upload_batch(3, Some("c")).await;

    let batch = h.store.get_batch(&id).await.unwrap().unwrap();
    assert_eq!(batch.items.len(), 3);
    assert_eq!(
        batch.items,
        vec![
            StoredItemRef::new(ARCHIVE, MessageId::new(1)),
            StoredItemRef::new(ARCHIVE, MessageId::new(2)),
            StoredItemRef::new(ARCHIVE, MessageId::new(3)),
        ]
    );
    assert_eq!(batch.caption.as_deref(), Some("c"));
}

// Scenario B: two member requesters open the batch; opens and uniques track.
#[tokio::test(start_paused = true)]
async fn scenario_b_two_requesters_update_stats() {
    let h = Harness::new();
    let id = h.upload_batch(3, Some("c")).await;

    let r1 = UserId::new(100);
    let r2 = UserId::new(200);
    h.membership.add(r1);
    h.membership.add(r2);

    let GateDecision::Granted(granted) = h.gate.request(id.clone(), r1).await else {
        panic!("member should be granted");
    };
    let receipt = h
        .orchestrator
        .deliver(&granted, r1, ChatId::new(1000))
        .await
        .unwrap();
    // 1 banner + 3 items.
    assert_eq!(receipt.handles.len(), 4);

    let stats = h.store.get_stats(&id).await.unwrap().unwrap();
    assert_eq!((stats.opens, stats.unique_visitors), (1, 1));

    let GateDecision::Granted(granted) = h.gate.request(id.clone(), r2).await else {
        panic!("member should be granted");
    };
    h.orchestrator
        .deliver(&granted, r2, ChatId::new(2000))
        .await
        .unwrap();

    let stats = h.store.get_stats(&id).await.unwrap().unwrap();
    assert_eq!((stats.opens, stats.unique_visitors), (2, 2));
}

// Scenario C: a non-member is gated with no side effects, then delivered
// exactly once after joining.
#[tokio::test(start_paused = true)]
async fn scenario_c_gated_requester_delivered_once_after_joining() {
    let h = Harness::new();
    let id = h.upload_batch(2, None).await;
    let requester = UserId::new(300);

    assert_eq!(
        h.gate.request(id.clone(), requester).await,
        GateDecision::MustJoin
    );
    // Gated: nothing sent, no stats mutation.
    assert!(h.transport.sent().is_empty());
    let stats = h.store.get_stats(&id).await.unwrap().unwrap();
    assert_eq!(stats.opens, 0);

    // Still not joined: confirm does nothing.
    assert_eq!(h.gate.confirm(requester).await, None);

    h.membership.add(requester);
    let granted = h.gate.confirm(requester).await.unwrap();
    assert_eq!(granted, id);
    h.orchestrator
        .deliver(&granted, requester, ChatId::new(3000))
        .await
        .unwrap();

    let stats = h.store.get_stats(&id).await.unwrap().unwrap();
    assert_eq!((stats.opens, stats.unique_visitors), (1, 1));

    // The parked slot was consumed; no double delivery.
    assert_eq!(h.gate.confirm(requester).await, None);
}

// Scenario D: all delivered messages are retracted after the delay, even
// when one delete call fails.
#[tokio::test(start_paused = true)]
async fn scenario_d_delivery_is_retracted_after_the_delay() {
    let h = Harness::new();
    let id = h.upload_batch(3, None).await;
    let requester = UserId::new(400);
    let chat = ChatId::new(4000);

    let receipt = h.orchestrator.deliver(&id, requester, chat).await.unwrap();
    assert_eq!(receipt.handles.len(), 4);

    // One delete will fail; the other three must still go through.
    h.transport.fail_delete_of(receipt.handles[1]);

    // Before the delay: nothing retracted.
    tokio::time::sleep(DELAY - Duration::from_secs(1)).await;
    settle().await;
    assert!(h.transport.deleted().is_empty());

    // Past the delay (plus scheduling jitter): everything attempted.
    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    let deleted = h.transport.deleted();
    assert_eq!(deleted.len(), 3);
    for handle in [receipt.handles[0], receipt.handles[2], receipt.handles[3]] {
        assert!(deleted.contains(&(chat, handle)));
    }
    // The job is terminal despite the partial failure.
    assert!(h.store.pending_jobs().await.unwrap().is_empty());
}

// Finalizing with nothing staged fails and leaves no trace.
#[tokio::test]
async fn finalize_without_items_is_rejected() {
    let h = Harness::new();
    assert!(matches!(
        h.assembler.finalize(UPLOADER).await,
        Err(EngineError::EmptyBatch)
    ));
    assert_eq!(h.store.report().await.unwrap().total_batches, 0);
}

// A restart between delivery and the fire time: a fresh scheduler recovers
// the persisted job and the retraction still happens.
#[tokio::test(start_paused = true)]
async fn restart_between_delivery_and_retraction_still_retracts() {
    let h = Harness::new();
    let id = h.upload_batch(1, None).await;
    let chat = ChatId::new(5000);

    let receipt = h
        .orchestrator
        .deliver(&id, UserId::new(500), chat)
        .await
        .unwrap();

    // "Restart": a fresh scheduler instance knows only what was persisted.
    // It re-arms the pending job alongside the original timer; the duplicate
    // attempt is harmless because deleting an absent message is a no-op.
    let fresh = RetractionScheduler::new(h.store.clone(), h.transport.clone());
    assert_eq!(fresh.recover().await.unwrap(), 1);

    tokio::time::sleep(DELAY + Duration::from_secs(5)).await;
    settle().await;
    let deleted = h.transport.deleted();
    for handle in &receipt.handles {
        assert!(deleted.contains(&(chat, *handle)));
    }
    assert!(h.store.pending_jobs().await.unwrap().is_empty());
}
