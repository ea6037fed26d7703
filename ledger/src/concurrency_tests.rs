//! Concurrency tests for the ledger.
//!
//! These verify that per-user serialization loses no updates, that opposing
//! referrals cannot deadlock, and that the supply identity (remaining supply
//! plus all balances equals the initial supply) holds under mixed traffic.
//! Joins are wrapped in timeouts so a deadlock fails the test instead of
//! hanging it.

#[cfg(test)]
mod tests {
    use crate::store::Memory;
    use crate::Ledger;
    use punchcoin_types::{Task, INITIAL_SUPPLY, MAX_LEVEL, REFERRAL_REWARD};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

    async fn open_shared() -> Arc<Ledger<Memory>> {
        Arc::new(Ledger::open(Memory::default()).await.expect("open ledger"))
    }

    #[tokio::test]
    async fn test_concurrent_earns_lose_no_updates() {
        let ledger = open_shared().await;
        ledger.register("alice").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..100 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move { ledger.earn("alice").await }));
        }
        for handle in handles {
            timeout(JOIN_TIMEOUT, handle)
                .await
                .expect("earn deadlocked")
                .unwrap()
                .unwrap();
        }

        assert_eq!(ledger.balance("alice").await.unwrap(), 100);
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY - 100);
        assert_eq!(
            ledger.store().snapshot()["alice"].coins,
            100,
            "persisted image must match the committed table"
        );
    }

    #[tokio::test]
    async fn test_concurrent_registration_creates_once() {
        let ledger = open_shared().await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move { ledger.register("alice").await }));
        }
        let mut created = 0;
        for handle in handles {
            let registration = timeout(JOIN_TIMEOUT, handle)
                .await
                .expect("register deadlocked")
                .unwrap()
                .unwrap();
            if registration.created {
                created += 1;
            }
        }

        assert_eq!(created, 1, "exactly one call may create the record");
        assert_eq!(ledger.store().save_count(), 1);
    }

    #[tokio::test]
    async fn test_parallel_earns_across_users() {
        let ledger = open_shared().await;
        let users: Vec<String> = (0..8).map(|i| format!("user{i}")).collect();
        for user in &users {
            ledger.register(user).await.unwrap();
        }

        // Each user claims a different number of earns so lost or crossed
        // updates would show up as a wrong balance somewhere.
        let mut handles = Vec::new();
        for (index, user) in users.iter().enumerate() {
            let ledger = Arc::clone(&ledger);
            let user = user.clone();
            let claims = (index as u64 + 1) * 5;
            handles.push(tokio::spawn(async move {
                for _ in 0..claims {
                    ledger.earn(&user).await.unwrap();
                }
            }));
        }
        for handle in handles {
            timeout(JOIN_TIMEOUT, handle)
                .await
                .expect("earns deadlocked")
                .unwrap();
        }

        let mut total = 0;
        for (index, user) in users.iter().enumerate() {
            let expected = (index as u64 + 1) * 5;
            assert_eq!(ledger.balance(user).await.unwrap(), expected);
            total += expected;
        }
        assert_eq!(ledger.total_supply(), INITIAL_SUPPLY - total as i64);
    }

    #[tokio::test]
    async fn test_cross_referrals_do_not_deadlock() {
        let ledger = open_shared().await;
        ledger.register("alice").await.unwrap();
        ledger.register("bob").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let ledger = Arc::clone(&ledger);
            // Alternate directions so opposing lock acquisitions overlap.
            let (referrer, referee) = if i % 2 == 0 {
                ("alice", "bob")
            } else {
                ("bob", "alice")
            };
            handles.push(tokio::spawn(async move {
                ledger.complete_referral(referrer, referee).await
            }));
        }
        for handle in handles {
            timeout(JOIN_TIMEOUT, handle)
                .await
                .expect("opposing referrals deadlocked")
                .unwrap()
                .unwrap();
        }

        let table = ledger.snapshot();
        assert_eq!(table["alice"].referral_count, 25);
        assert_eq!(table["bob"].referral_count, 25);
        // Every referral credits both sides once.
        assert_eq!(table["alice"].coins, 50 * REFERRAL_REWARD);
        assert_eq!(table["bob"].coins, 50 * REFERRAL_REWARD);
        assert_eq!(
            ledger.total_supply(),
            INITIAL_SUPPLY - (100 * REFERRAL_REWARD) as i64
        );
        // 25 referrals is past the whole ladder.
        assert_eq!(table["alice"].level, MAX_LEVEL);
        assert_eq!(table["bob"].level, MAX_LEVEL);
        for record in table.values() {
            record.validate().expect("invariants hold under contention");
        }
    }

    #[tokio::test]
    async fn test_concurrent_same_pair_referrals_serialize() {
        let ledger = open_shared().await;
        ledger.register("alice").await.unwrap();
        ledger.register("bob").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.complete_referral("alice", "bob").await
            }));
        }
        let mut level_ups = 0;
        for handle in handles {
            let receipt = timeout(JOIN_TIMEOUT, handle)
                .await
                .expect("referrals deadlocked")
                .unwrap()
                .unwrap();
            if receipt.level_up.is_some() {
                level_ups += 1;
            }
        }

        let table = ledger.snapshot();
        assert_eq!(table["alice"].referral_count, 10);
        assert_eq!(table["alice"].coins, 10 * REFERRAL_REWARD);
        assert_eq!(table["bob"].coins, 10 * REFERRAL_REWARD);
        assert_eq!(level_ups, 1, "only the threshold referral levels up");
        assert_eq!(table["alice"].level, 2);
    }

    #[tokio::test]
    async fn test_mixed_traffic_preserves_supply_identity() {
        let ledger = open_shared().await;
        let users: Vec<String> = (0..5).map(|i| format!("user{i}")).collect();
        for user in &users {
            ledger.register(user).await.unwrap();
        }

        let mut handles = Vec::new();
        for user in &users {
            let ledger = Arc::clone(&ledger);
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    ledger.earn(&user).await.unwrap();
                }
                ledger.complete_task(&user, "Instagram").await.unwrap();
            }));
        }
        {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    ledger.complete_referral("user0", "user1").await.unwrap();
                }
                for _ in 0..3 {
                    // Self-referral mixed in.
                    ledger.complete_referral("user2", "user2").await.unwrap();
                }
                ledger.complete_task("user3", "YouTube").await.unwrap();
                ledger.complete_task("user3", "Telegram").await.unwrap();
            }));
        }
        for handle in handles {
            timeout(JOIN_TIMEOUT, handle)
                .await
                .expect("mixed traffic deadlocked")
                .unwrap();
        }

        let table = ledger.snapshot();
        let issued: i64 = table.values().map(|record| record.coins as i64).sum();
        assert_eq!(
            ledger.total_supply(),
            INITIAL_SUPPLY - issued,
            "supply identity must hold after mixed traffic"
        );
        for record in table.values() {
            record.validate().expect("invariants hold after mixed traffic");
        }
        assert!(table["user3"].has_completed(Task::YouTube));
        assert_eq!(
            ledger.store().snapshot(),
            table,
            "persisted image converges to the committed table"
        );
    }
}
