//! Property tests: the engine agrees with a simple balance model over
//! arbitrary operation sequences, and every account reconciles.

use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;
use rust_decimal::Decimal;

use wallet_common::{AccountId, WalletError};
use wallet_ledger::{
    AccountProfile, Direction, InMemoryAccountStore, LedgerConfig, LedgerEngine, TransactionKind,
};

const ACCOUNTS: usize = 3;

#[derive(Debug, Clone)]
enum Op {
    TopUp { account: usize, cents: i64 },
    Payment { account: usize, cents: i64 },
    Transfer { from: usize, to: usize, cents: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let account = 0..ACCOUNTS;
    let cents = 1i64..50_000;
    prop_oneof![
        (account.clone(), cents.clone()).prop_map(|(account, cents)| Op::TopUp { account, cents }),
        (account.clone(), cents.clone())
            .prop_map(|(account, cents)| Op::Payment { account, cents }),
        (account.clone(), account, cents)
            .prop_map(|(from, to, cents)| Op::Transfer { from, to, cents }),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_engine_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let outcome: TestCaseResult = runtime().block_on(async {
            let engine = LedgerEngine::new(
                Arc::new(InMemoryAccountStore::default()),
                LedgerConfig::default(),
            );

            let mut ids: Vec<AccountId> = Vec::new();
            for i in 0..ACCOUNTS {
                let account = engine
                    .open_account(AccountProfile::new("P", "T", format!("+64{i}"), "Model St"))
                    .await
                    .unwrap();
                ids.push(account.id);
            }
            let mut model = vec![Decimal::ZERO; ACCOUNTS];
            let mut expected_records = 0usize;

            for op in &ops {
                match *op {
                    Op::TopUp { account, cents } => {
                        let amount = Decimal::new(cents, 2);
                        let receipt = engine.top_up(ids[account], amount).await.unwrap();
                        prop_assert_eq!(receipt.balance_before, model[account]);
                        model[account] += amount;
                        prop_assert_eq!(receipt.balance_after, model[account]);
                        expected_records += 1;
                    }
                    Op::Payment { account, cents } => {
                        let amount = Decimal::new(cents, 2);
                        let result = engine.payment(ids[account], amount, "model").await;
                        if model[account] >= amount {
                            let receipt = result.unwrap();
                            model[account] -= amount;
                            prop_assert_eq!(receipt.balance_after, model[account]);
                            expected_records += 1;
                        } else {
                            let insufficient = matches!(result, Err(WalletError::InsufficientBalance { .. }));
                            prop_assert!(insufficient);
                        }
                    }
                    Op::Transfer { from, to, cents } => {
                        let amount = Decimal::new(cents, 2);
                        let result = engine.transfer(ids[from], ids[to], amount, "model").await;
                        if from == to {
                            prop_assert_eq!(result.unwrap_err(), WalletError::SelfTransfer(ids[from]));
                        } else if model[from] >= amount {
                            let receipt = result.unwrap();
                            model[from] -= amount;
                            model[to] += amount;
                            prop_assert_eq!(receipt.balance_after, model[from]);

                            let credit = engine.transaction(receipt.credit_leg_id).await.unwrap();
                            prop_assert_eq!(credit.reference, Some(receipt.record.id));
                            prop_assert_eq!(credit.direction, Direction::Credit);
                            prop_assert_eq!(credit.kind, TransactionKind::Transfer);
                            expected_records += 2;
                        } else {
                            let insufficient = matches!(result, Err(WalletError::InsufficientBalance { .. }));
                            prop_assert!(insufficient);
                        }
                    }
                }
            }

            prop_assert_eq!(engine.store().record_count(), expected_records);
            for (i, id) in ids.iter().enumerate() {
                let reconciliation = engine.reconcile(*id).await.unwrap();
                prop_assert!(reconciliation.is_consistent());
                prop_assert_eq!(reconciliation.balance, model[i]);
            }
            Ok(())
        });
        outcome?;
    }

    #[test]
    fn prop_history_pages_are_bounded_and_ordered(
        top_ups in 0usize..30,
        page in 0u32..5,
        limit in 0u32..150,
    ) {
        let outcome: TestCaseResult = runtime().block_on(async {
            let engine = LedgerEngine::new(
                Arc::new(InMemoryAccountStore::default()),
                LedgerConfig::default(),
            );
            let id = engine
                .open_account(AccountProfile::new("P", "T", "+650", "Page St"))
                .await
                .unwrap()
                .id;
            for _ in 0..top_ups {
                engine.top_up(id, Decimal::ONE).await.unwrap();
            }

            let result = engine.get_account_transactions(id, page, limit).await.unwrap();
            let effective_limit = result.pagination.limit as usize;

            prop_assert!(result.pagination.page >= 1);
            prop_assert!((1..=100).contains(&effective_limit));
            prop_assert!(result.len() <= effective_limit);
            prop_assert!(result.items.windows(2).all(|w| w[0].created_at >= w[1].created_at));

            let offset = (result.pagination.page as usize - 1) * effective_limit;
            prop_assert_eq!(result.len(), top_ups.saturating_sub(offset).min(effective_limit));
            Ok(())
        });
        outcome?;
    }
}
