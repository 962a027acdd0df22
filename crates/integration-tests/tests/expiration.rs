//! Lazy expiration semantics.
//!
//! Nothing sweeps expired cards in the background: a card whose date has
//! passed is flipped to `expired` by the next read, and that flip is
//! persisted, audited as a system action, and never repeated. A stored
//! `expired` status is terminal even if the date says otherwise.
//!
//! Run with: cargo test -p stagedoor-integration-tests

use chrono::Duration;
use stagedoor_core::{CardCode, GiftCardStatus};
use stagedoor_giftcards::audit::AuditAction;
use stagedoor_giftcards::{DeclineReason, GiftCard, GiftCardError, GiftCardStore};
use stagedoor_integration_tests::{TestHarness, redeem_request, self_request, start_instant};

// ============================================================================
// Lazy Refresh Tests
// ============================================================================

#[tokio::test]
async fn test_lookup_flips_an_expired_card_and_persists_it() {
    let h = TestHarness::new();
    let card = h
        .service
        .create(self_request(300))
        .await
        .expect("Failed to create gift card");
    h.clock.set(card.expires_at + Duration::days(1));

    let seen = h
        .service
        .lookup_by_code(card.code.as_str())
        .await
        .expect("Expired cards still resolve");
    assert_eq!(seen.status, GiftCardStatus::Expired);
    assert_eq!(seen.balance.units(), 300, "Expiration strands the balance, it does not erase it");
    assert_eq!(seen.version, 2);

    // the flip reached the store, not just the returned copy
    let stored = h
        .store
        .find_by_id(card.id)
        .await
        .expect("Failed to read card")
        .expect("Card must exist");
    assert_eq!(stored.status, GiftCardStatus::Expired);
    assert_eq!(stored.version, 2);

    let records = h.audit.records().await;
    let flips: Vec<_> = records
        .iter()
        .filter(|r| r.action == AuditAction::Expired)
        .collect();
    assert_eq!(flips.len(), 1);
    let flip = flips.first().expect("Filtered above");
    assert_eq!(flip.actor.to_string(), "system");
    assert_eq!(flip.entity_id, card.id);
}

#[tokio::test]
async fn test_second_read_does_not_flip_again() {
    let h = TestHarness::new();
    let card = h
        .service
        .create(self_request(300))
        .await
        .expect("Failed to create gift card");
    h.clock.set(card.expires_at + Duration::days(1));

    h.service
        .lookup_by_code(card.code.as_str())
        .await
        .expect("Failed to look up card");
    let again = h
        .service
        .lookup_by_code(card.code.as_str())
        .await
        .expect("Failed to look up card twice");
    assert_eq!(again.status, GiftCardStatus::Expired);
    assert_eq!(again.version, 2, "Terminal cards stop moving");

    let records = h.audit.records().await;
    let flips = records
        .iter()
        .filter(|r| r.action == AuditAction::Expired)
        .count();
    assert_eq!(flips, 1);
}

#[tokio::test]
async fn test_partially_used_card_expires_with_its_remainder_stranded() {
    let h = TestHarness::new();
    let card = h
        .service
        .create(self_request(500))
        .await
        .expect("Failed to create gift card");
    h.service
        .redeem(redeem_request(card.code.as_str(), 200))
        .await
        .expect("Failed to redeem");

    h.clock.set(card.expires_at + Duration::days(1));
    let seen = h
        .service
        .lookup_by_code(card.code.as_str())
        .await
        .expect("Failed to look up card");
    assert_eq!(seen.status, GiftCardStatus::Expired);
    assert_eq!(seen.balance.units(), 300);
    assert_eq!(seen.usage_history.len(), 1, "The ledger survives expiration");

    let records = h.audit.records().await;
    let flip = records
        .iter()
        .find(|r| r.action == AuditAction::Expired)
        .expect("Expiration must be audited");
    assert!(flip.summary.contains("300 ILS unspent"));
}

// ============================================================================
// Decline Tests
// ============================================================================

#[tokio::test]
async fn test_expired_card_declines_spend_and_validation() {
    let h = TestHarness::new();
    let card = h
        .service
        .create(self_request(300))
        .await
        .expect("Failed to create gift card");
    h.clock.set(card.expires_at + Duration::days(1));

    let err = h
        .service
        .redeem(redeem_request(card.code.as_str(), 100))
        .await
        .unwrap_err();
    assert!(matches!(err, GiftCardError::Expired { .. }));

    let validation = h
        .service
        .validate(card.code.as_str())
        .await
        .expect("Validation must not error");
    assert!(!validation.valid);
    assert_eq!(validation.reason, Some(DeclineReason::Expired));
    assert_eq!(
        validation.card.map(|c| c.status),
        Some(GiftCardStatus::Expired)
    );
}

#[tokio::test]
async fn test_spend_at_the_exact_expiry_instant_is_honored() {
    let h = TestHarness::new();
    let card = h
        .service
        .create(self_request(300))
        .await
        .expect("Failed to create gift card");

    // cards expire strictly after their date, not at it
    h.clock.set(card.expires_at);
    let updated = h
        .service
        .redeem(redeem_request(card.code.as_str(), 100))
        .await
        .expect("A card is still spendable at its expiry instant");
    assert_eq!(updated.balance.units(), 200);
}

#[tokio::test]
async fn test_stored_expired_status_is_terminal_even_with_a_future_date() {
    let h = TestHarness::new();
    let code = CardCode::parse("EXPD-AAAA-BBBB-2222").expect("Fixed code is well-formed");
    let mut card =
        GiftCard::issue(self_request(300), code, start_instant()).expect("Failed to issue card");
    card.status = GiftCardStatus::Expired;
    h.store.insert(&card).await.expect("Failed to insert card");

    // the date has not passed, but the stored status already has the card out
    let err = h
        .service
        .redeem(redeem_request(card.code.as_str(), 100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GiftCardError::NotActive {
            status: GiftCardStatus::Expired
        }
    ));

    let validation = h
        .service
        .validate(card.code.as_str())
        .await
        .expect("Validation must not error");
    assert!(!validation.valid);
    assert_eq!(validation.reason, Some(DeclineReason::NotActive));
}
