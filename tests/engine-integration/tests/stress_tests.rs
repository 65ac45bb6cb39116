//! Concurrent operations against one crop. Each test races real tasks on a
//! multi-threaded runtime and then checks quantity and mirror invariants.

use std::sync::Arc;

use cropmart_common::interest::InterestStatus;
use cropmart_engine::{Database, Engine, EngineConfig, EngineError, InterestStore};
use cropmart_engine_integration::harness::{MemoryEngine, TestMarket};
use cropmart_engine_integration::{buyer, init_tracing, make_crop_draft, make_request, seller};
use futures::future::join_all;

const ROUNDS: usize = 20;

/// Two 6-unit acceptances on a listing of 10 both succeed; the second is
/// floored and the stored quantity never goes negative or loses an update.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptances_floor_at_zero() {
    init_tracing();
    for _ in 0..ROUNDS {
        let m = TestMarket::new();
        let gary = seller("Gary");
        let crop = m.list_crop(&gary, "Carrots", 10).await;

        let mut ids = Vec::new();
        for name in ["Alice", "Bob"] {
            let interest = m
                .engine
                .create_interest(make_request(&crop.id, &buyer(name), 6))
                .await
                .unwrap();
            ids.push(interest.id);
        }

        let handles = ids.into_iter().map(|id| {
            let engine = Arc::clone(&m.engine);
            let gary = gary.clone();
            tokio::spawn(async move {
                engine
                    .update_interest_status(&id, InterestStatus::Accepted, &gary)
                    .await
            })
        });
        for result in join_all(handles).await {
            result.unwrap().unwrap();
        }

        let crop = m.crop(&crop.id).await;
        assert_eq!(crop.quantity_available, 0);
        assert!(crop
            .interests
            .iter()
            .all(|s| s.status == InterestStatus::Accepted));
        m.assert_consistent().await;
    }
}

/// Two buyers ask for 6 of 10 at the same time. Creation reserves nothing, so
/// both are checked against the full 10 and the quantity is untouched.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_do_not_reserve_stock() {
    for _ in 0..ROUNDS {
        let m = TestMarket::new();
        let gary = seller("Gary");
        let crop = m.list_crop(&gary, "Carrots", 10).await;

        let handles = ["Alice", "Bob"].map(|name| {
            let engine = Arc::clone(&m.engine);
            let request = make_request(&crop.id, &buyer(name), 6);
            tokio::spawn(async move { engine.create_interest(request).await })
        });
        for result in join_all(handles).await {
            let interest = result.unwrap().unwrap();
            assert_eq!(interest.status, InterestStatus::Pending);
        }

        let crop = m.crop(&crop.id).await;
        assert_eq!(crop.quantity_available, 10);
        assert_eq!(crop.interests.len(), 2);
        m.assert_consistent().await;
    }
}

/// Many small acceptances race; every one of them is counted exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_small_acceptances_lose_no_update() {
    let m = TestMarket::with_config(EngineConfig {
        max_quantity_retries: 64,
    });
    let gary = seller("Gary");
    let crop = m.list_crop(&gary, "Potatoes", 100).await;

    let mut ids = Vec::new();
    for n in 0..30 {
        let interest = m
            .engine
            .create_interest(make_request(&crop.id, &buyer(&format!("buyer{n}")), 3))
            .await
            .unwrap();
        ids.push(interest.id);
    }

    let handles = ids.into_iter().map(|id| {
        let engine = Arc::clone(&m.engine);
        let gary = gary.clone();
        tokio::spawn(async move {
            engine
                .update_interest_status(&id, InterestStatus::Accepted, &gary)
                .await
        })
    });
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    assert_eq!(m.crop(&crop.id).await.quantity_available, 10);
    m.assert_consistent().await;
}

/// The same interest accepted twice at once: exactly one acceptance wins and
/// the quantity is drawn down once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_double_accept_applies_once() {
    for _ in 0..ROUNDS {
        let m = TestMarket::new();
        let gary = seller("Gary");
        let crop = m.list_crop(&gary, "Carrots", 10).await;
        let interest = m
            .engine
            .create_interest(make_request(&crop.id, &buyer("Alice"), 6))
            .await
            .unwrap();

        let handles = (0..2).map(|_| {
            let engine = Arc::clone(&m.engine);
            let gary = gary.clone();
            let id = interest.id.clone();
            tokio::spawn(async move {
                engine
                    .update_interest_status(&id, InterestStatus::Accepted, &gary)
                    .await
            })
        });
        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(EngineError::InvalidTransition {
                from: InterestStatus::Accepted,
                to: InterestStatus::Accepted
            })
        )));
        assert_eq!(m.crop(&crop.id).await.quantity_available, 4);
        m.assert_consistent().await;
    }
}

/// One buyer fires several creates at once; only one becomes pending.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_creates_yield_one_pending() {
    for _ in 0..ROUNDS {
        let m = TestMarket::new();
        let gary = seller("Gary");
        let alice = buyer("Alice");
        let crop = m.list_crop(&gary, "Carrots", 10).await;

        let handles = (0..5).map(|_| {
            let engine = Arc::clone(&m.engine);
            let request = make_request(&crop.id, &alice, 2);
            tokio::spawn(async move { engine.create_interest(request).await })
        });
        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, EngineError::Conflict(_))));

        let canonical = m
            .engine
            .interest_store()
            .find_by_crop(&crop.id)
            .await
            .unwrap();
        assert_eq!(canonical.len(), 1);
        assert_eq!(m.crop(&crop.id).await.interests.len(), 1);
        m.assert_consistent().await;
    }
}

/// Deleting a crop while buyers are raising interests in it never leaves an
/// interest behind for the deleted crop.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_crop_racing_creates_leaves_no_orphans() {
    for _ in 0..ROUNDS {
        let m = TestMarket::new();
        let gary = seller("Gary");
        let crop = m.list_crop(&gary, "Carrots", 50).await;

        let creates: Vec<_> = (0..8)
            .map(|n| {
                let engine = Arc::clone(&m.engine);
                let request = make_request(&crop.id, &buyer(&format!("buyer{n}")), 1);
                tokio::spawn(async move { engine.create_interest(request).await })
            })
            .collect();
        let delete = {
            let engine = Arc::clone(&m.engine);
            let crop_id = crop.id.clone();
            let gary = gary.clone();
            tokio::spawn(async move { engine.delete_crop(&crop_id, &gary).await })
        };

        delete.await.unwrap().unwrap();
        for result in join_all(creates).await {
            match result.unwrap() {
                Ok(_) | Err(EngineError::NotFound { .. }) => {}
                Err(other) => panic!("unexpected create error: {other:?}"),
            }
        }

        assert!(m
            .engine
            .interest_store()
            .find_by_crop(&crop.id)
            .await
            .unwrap()
            .is_empty());
        m.assert_consistent().await;
    }
}

/// Buyers withdraw while the seller decides; both copies stay in step.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withdrawals_and_decisions_stay_mirrored() {
    let m = TestMarket::new();
    let gary = seller("Gary");
    let crop = m.list_crop(&gary, "Pumpkins", 40).await;

    let mut interests = Vec::new();
    for n in 0..12 {
        let buyer = buyer(&format!("buyer{n}"));
        let interest = m
            .engine
            .create_interest(make_request(&crop.id, &buyer, 2))
            .await
            .unwrap();
        interests.push((interest.id, buyer));
    }

    let handles = interests.into_iter().enumerate().map(|(n, (id, buyer))| {
        let engine = Arc::clone(&m.engine);
        let gary = gary.clone();
        tokio::spawn(async move {
            match n % 3 {
                0 => engine.delete_interest(&id, &buyer).await.map(|_| ()),
                1 => engine
                    .update_interest_status(&id, InterestStatus::Accepted, &gary)
                    .await
                    .map(|_| ()),
                _ => engine
                    .update_interest_status(&id, InterestStatus::Rejected, &gary)
                    .await
                    .map(|_| ()),
            }
        })
    });
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    let crop = m.crop(&crop.id).await;
    assert_eq!(crop.interests.len(), 8);
    // Four acceptances of 2 each.
    assert_eq!(crop.quantity_available, 32);
    m.assert_consistent().await;
}

/// Race one acceptance from each of two engines and report how many won.
async fn accept_from_both(
    first: Arc<MemoryEngine>,
    second: Arc<MemoryEngine>,
    db: &Database,
) -> (usize, u32) {
    let gary = seller("Gary");
    let crop = first
        .create_crop(&gary, make_crop_draft("Carrots", 10))
        .await
        .unwrap();
    let interest = first
        .create_interest(make_request(&crop.id, &buyer("Alice"), 3))
        .await
        .unwrap();

    let handles = [first, second].map(|engine| {
        let gary = gary.clone();
        let id = interest.id.clone();
        tokio::spawn(async move {
            engine
                .update_interest_status(&id, InterestStatus::Accepted, &gary)
                .await
        })
    });
    let mut wins = 0;
    for result in join_all(handles).await {
        match result.unwrap() {
            Ok(_) => wins += 1,
            Err(EngineError::InvalidTransition {
                from: InterestStatus::Accepted,
                ..
            }) => {}
            Err(other) => panic!("unexpected decision error: {other:?}"),
        }
    }
    let quantity = db
        .engine(EngineConfig::default())
        .get_crop(&crop.id)
        .await
        .unwrap()
        .quantity_available;
    (wins, quantity)
}

/// Two engines handed out by one database decide an interest once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engines_from_one_database_accept_once() {
    for _ in 0..ROUNDS {
        let db = Database::in_memory();
        let first = Arc::new(db.engine(EngineConfig::default()));
        let second = Arc::new(db.engine(EngineConfig::default()));

        let (wins, quantity) = accept_from_both(first, second, &db).await;
        assert_eq!(wins, 1);
        assert_eq!(quantity, 7);
    }
}

/// Engines that share only the stores, not the lock table, still decide an
/// interest once: the transition itself is conditional at the store.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engines_sharing_only_stores_accept_once() {
    for _ in 0..ROUNDS {
        let db = Database::in_memory();
        let independent = || {
            Arc::new(Engine::new(
                db.crops().clone(),
                db.interests().clone(),
                EngineConfig::default(),
            ))
        };
        let (first, second) = (independent(), independent());

        let (wins, quantity) = accept_from_both(first, second, &db).await;
        assert_eq!(wins, 1);
        assert_eq!(quantity, 7);
        assert!(db
            .engine(EngineConfig::default())
            .audit()
            .await
            .unwrap()
            .is_empty());
    }
}
