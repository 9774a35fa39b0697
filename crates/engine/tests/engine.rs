use std::sync::Arc;

use engine::{
    BalanceCause, Coins, EconomySettings, Engine, EngineError, Ledger, TransferSettings,
};
use uuid::Uuid;

mod common;

use common::ScriptedStore;

fn engine_over(store: Arc<ScriptedStore>, settings: EconomySettings) -> Engine {
    Engine::builder()
        .store(store)
        .settings(settings)
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_adds_are_not_lost() {
    let store = Arc::new(ScriptedStore::new());
    let engine = Arc::new(engine_over(
        store.clone(),
        EconomySettings {
            starting_liquid: Coins::ZERO,
            ..EconomySettings::default()
        },
    ));
    let id = Uuid::new_v4();

    let tasks: Vec<_> = (0..100)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.add_liquid(id, Coins::whole(10)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.liquid(id).await.unwrap(), Coins::whole(1000));
    assert_eq!(store.loads(), 1);
}

#[tokio::test]
async fn transfer_with_fee_conserves_all_but_the_fee() {
    let store = Arc::new(ScriptedStore::new());
    let engine = engine_over(
        store,
        EconomySettings {
            transfer: TransferSettings {
                fee_percentage: Coins::whole(5),
                ..TransferSettings::default()
            },
            ..EconomySettings::default()
        },
    );
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    engine.set_liquid(alice, Coins::whole(500)).await.unwrap();
    engine.set_liquid(bob, Coins::ZERO).await.unwrap();
    let mut events = engine.subscribe();

    let receipt = engine.transfer(alice, bob, Coins::whole(100)).await.unwrap();

    assert_eq!(receipt.fee, Coins::whole(5));
    assert_eq!(engine.liquid(alice).await.unwrap(), Coins::whole(395));
    assert_eq!(engine.liquid(bob).await.unwrap(), Coins::whole(100));

    let sent = events.recv().await.unwrap();
    let received = events.recv().await.unwrap();
    assert_eq!((sent.account, sent.cause), (alice, BalanceCause::Transfer));
    assert_eq!(sent.difference(), Coins::whole(-105));
    assert_eq!(received.account, bob);
    assert_eq!(received.new, Coins::whole(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_transfers_do_not_deadlock() {
    let engine = Arc::new(engine_over(
        Arc::new(ScriptedStore::new()),
        EconomySettings::default(),
    ));
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    engine.set_liquid(a, Coins::whole(1000)).await.unwrap();
    engine.set_liquid(b, Coins::whole(1000)).await.unwrap();

    let tasks: Vec<_> = (0..200)
        .map(|i| {
            let engine = engine.clone();
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            tokio::spawn(async move { engine.transfer(from, to, Coins::whole(1)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let total = engine.liquid(a).await.unwrap() + engine.liquid(b).await.unwrap();
    assert_eq!(total, Coins::whole(2000));
}

#[tokio::test]
async fn add_clamps_while_remove_rejects() {
    let engine = engine_over(
        Arc::new(ScriptedStore::new()),
        EconomySettings {
            max_vault: Coins::whole(100),
            ..EconomySettings::default()
        },
    );
    let id = Uuid::new_v4();

    let added = engine.add_vault(id, Coins::whole(150)).await.unwrap();
    assert!(added.capped());
    assert_eq!(engine.vault(id).await.unwrap(), Coins::whole(100));

    let err = engine.remove_vault(id, Coins::whole(150)).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(engine.vault(id).await.unwrap(), Coins::whole(100));
}

#[tokio::test]
async fn balances_stay_within_bounds() {
    let settings = EconomySettings {
        max_liquid: Coins::whole(300),
        max_vault: Coins::whole(200),
        ..EconomySettings::default()
    };
    let engine = engine_over(Arc::new(ScriptedStore::new()), settings.clone());
    let id = Uuid::new_v4();

    for step in 0..200i64 {
        let amount = Coins::new((step * 7919) % 25_000 + 1);
        // Failures are expected; only the bounds matter here.
        let _ = match step % 6 {
            0 => engine.add_liquid(id, amount).await.map(drop),
            1 => engine.remove_liquid(id, amount).await.map(drop),
            2 => engine.deposit(id, amount).await.map(drop),
            3 => engine.withdraw(id, amount).await.map(drop),
            4 => engine.add_vault(id, amount).await.map(drop),
            _ => engine.set_liquid(id, amount).await.map(drop),
        };
        let snapshot = engine.account(id).await.unwrap();
        assert!(snapshot.liquid >= Coins::ZERO && snapshot.liquid <= settings.max_liquid);
        assert!(snapshot.vault >= Coins::ZERO && snapshot.vault <= settings.max_vault);
    }
}

#[tokio::test]
async fn evicted_account_is_reloaded_before_mutation() {
    let store = Arc::new(ScriptedStore::new());
    let engine = engine_over(store.clone(), EconomySettings::default());
    let id = Uuid::new_v4();
    engine.add_liquid(id, Coins::whole(50)).await.unwrap();

    assert_eq!(engine.cache().clear().await, 1);
    engine.add_liquid(id, Coins::whole(1)).await.unwrap();

    assert_eq!(engine.liquid(id).await.unwrap(), Coins::whole(151));
    assert_eq!(store.loads(), 2);
}

#[tokio::test]
async fn leaderboard_includes_unsaved_state() {
    let store = Arc::new(ScriptedStore::new());
    let engine = engine_over(store, EconomySettings::default());
    let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    for (rank, id) in ids.iter().enumerate() {
        engine
            .cache()
            .load_named(*id, &format!("player{rank}"))
            .await;
        engine
            .set_vault(*id, Coins::whole(rank as i64 * 10))
            .await
            .unwrap();
    }

    let top = engine.top(3, Ledger::Vault).await.unwrap();

    let names: Vec<_> = top.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["player4", "player3", "player2"]);
}

#[tokio::test]
async fn dropped_subscriber_does_not_block_mutations() {
    let engine = engine_over(Arc::new(ScriptedStore::new()), EconomySettings::default());
    let id = Uuid::new_v4();
    drop(engine.subscribe());
    let mut live = engine.subscribe();

    engine.add_liquid(id, Coins::whole(1)).await.unwrap();

    assert_eq!(live.recv().await.unwrap().cause, BalanceCause::Add);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn events_of_one_account_arrive_in_applied_order() {
    let engine = Arc::new(engine_over(
        Arc::new(ScriptedStore::new()),
        EconomySettings {
            starting_liquid: Coins::ZERO,
            ..EconomySettings::default()
        },
    ));
    let id = Uuid::new_v4();
    let mut events = engine.subscribe();

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                if i % 3 == 0 {
                    engine.deposit(id, Coins::whole(1)).await.map(drop)
                } else {
                    engine.add_liquid(id, Coins::whole(2)).await.map(drop)
                }
            })
        })
        .collect();
    for task in tasks {
        // Early deposits may find an empty liquid balance.
        let _ = task.await.unwrap();
    }

    let mut last = [Coins::ZERO, Coins::ZERO];
    while let Ok(event) = events.try_recv() {
        let slot = match event.ledger {
            Ledger::Liquid => 0,
            Ledger::Vault => 1,
        };
        assert_eq!(event.old, last[slot]);
        last[slot] = event.new;
    }
    assert_eq!(last[0], engine.liquid(id).await.unwrap());
    assert_eq!(last[1], engine.vault(id).await.unwrap());
}
