mod common;

use anyhow::Result;
use common::TestLedger;
use remit::application::AppError;
use uuid::Uuid;

#[tokio::test]
async fn test_transfer_moves_exact_amounts() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let (sender, sender_id) = ledger.user("sender", 50_000).await?;
    let (_, recipient_id) = ledger.user("recipient", 5_000).await?;

    let receipt = ledger
        .service
        .transfer(&sender, recipient_id, 20_000)
        .await?;

    assert_eq!(receipt.sender, sender_id);
    assert_eq!(receipt.recipient, recipient_id);
    assert_eq!(receipt.amount, 20_000);
    assert_eq!(receipt.sender_balance, 30_000);
    assert_eq!(receipt.recipient_balance, 25_000);
    assert_eq!(ledger.balance(sender_id).await?, 30_000);
    assert_eq!(ledger.balance(recipient_id).await?, 25_000);

    Ok(())
}

#[tokio::test]
async fn test_insufficient_balance_leaves_both_unchanged() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let (sender, sender_id) = ledger.user("sender", 10_000).await?;
    let (_, recipient_id) = ledger.user("recipient", 300).await?;

    let result = ledger.service.transfer(&sender, recipient_id, 10_001).await;

    assert!(matches!(
        result,
        Err(AppError::InsufficientBalance {
            balance: 10_000,
            required: 10_001
        })
    ));
    assert_eq!(ledger.balance(sender_id).await?, 10_000);
    assert_eq!(ledger.balance(recipient_id).await?, 300);

    Ok(())
}

#[tokio::test]
async fn test_unknown_recipient_leaves_sender_unchanged() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let (sender, sender_id) = ledger.user("sender", 10_000).await?;
    let nobody = Uuid::new_v4();

    let result = ledger.service.transfer(&sender, nobody, 100).await;

    assert!(matches!(result, Err(AppError::RecipientNotFound(id)) if id == nobody));
    assert_eq!(ledger.balance(sender_id).await?, 10_000);

    Ok(())
}

#[tokio::test]
async fn test_principal_without_account_is_sender_not_found() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let (_, recipient_id) = ledger.user("recipient", 0).await?;
    let stranger = remit::domain::Principal::assume(Uuid::new_v4());

    let result = ledger.service.transfer(&stranger, recipient_id, 100).await;

    assert!(matches!(result, Err(AppError::SenderNotFound(_))));
    assert_eq!(ledger.balance(recipient_id).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_invalid_amounts_and_self_transfer_are_rejected() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let (sender, sender_id) = ledger.user("sender", 1_000).await?;
    let (_, recipient_id) = ledger.user("recipient", 0).await?;

    for amount in [0, -100] {
        let result = ledger.service.transfer(&sender, recipient_id, amount).await;
        assert!(matches!(result, Err(AppError::InvalidAmount(_))));
    }

    let result = ledger.service.transfer(&sender, sender_id, 100).await;
    assert!(matches!(result, Err(AppError::SelfTransfer)));
    assert!(!AppError::SelfTransfer.is_retryable());

    assert_eq!(ledger.balance(sender_id).await?, 1_000);
    Ok(())
}

#[tokio::test]
async fn test_whole_balance_can_be_sent() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let (sender, sender_id) = ledger.user("sender", 4_242).await?;
    let (_, recipient_id) = ledger.user("recipient", 0).await?;

    ledger.service.transfer(&sender, recipient_id, 4_242).await?;

    assert_eq!(ledger.balance(sender_id).await?, 0);
    assert_eq!(ledger.balance(recipient_id).await?, 4_242);

    let again = ledger.service.transfer(&sender, recipient_id, 1).await;
    assert!(matches!(again, Err(AppError::InsufficientBalance { balance: 0, .. })));
    Ok(())
}

#[tokio::test]
async fn test_scenario_500_to_50() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let (sender, sender_id) = ledger.user("sender", 500).await?;
    let (_, recipient_id) = ledger.user("recipient", 50).await?;

    ledger.service.transfer(&sender, recipient_id, 200).await?;

    assert_eq!(ledger.balance(sender_id).await?, 300);
    assert_eq!(ledger.balance(recipient_id).await?, 250);
    Ok(())
}

#[tokio::test]
async fn test_sequential_transfers_conserve_total() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let (alice, alice_id) = ledger.user("alice", 10_000).await?;
    let (bob, bob_id) = ledger.user("bob", 2_500).await?;
    let (carol, carol_id) = ledger.user("carol", 0).await?;
    let total_before = ledger.service.total_balance().await?;

    ledger.service.transfer(&alice, bob_id, 1_234).await?;
    ledger.service.transfer(&bob, carol_id, 3_000).await?;
    ledger.service.transfer(&carol, alice_id, 999).await?;
    let _ = ledger.service.transfer(&carol, bob_id, 1_000_000).await;

    assert_eq!(ledger.service.total_balance().await?, total_before);
    assert_eq!(ledger.balance(alice_id).await?, 10_000 - 1_234 + 999);
    assert_eq!(ledger.balance(bob_id).await?, 2_500 + 1_234 - 3_000);
    assert_eq!(ledger.balance(carol_id).await?, 3_000 - 999);
    Ok(())
}

#[tokio::test]
async fn test_balance_of_unknown_user() -> Result<()> {
    let ledger = TestLedger::new().await?;
    let nobody = Uuid::new_v4();

    let result = ledger.service.get_balance(nobody).await;

    assert!(matches!(result, Err(AppError::AccountNotFound(id)) if id == nobody));
    Ok(())
}
