//! Type-specific draft validation rules
//!
//! Each `EntryType` constrains the fund flow, the context variant, and a
//! few per-type fields beyond the basic shape checks.

use crate::entry::{Disposition, EntryDraft, EntryType};
use crate::error::LedgerError;

/// Validation result with detailed error
pub type ValidationResult = Result<(), LedgerError>;

/// Validate a draft before it reaches the commit path
pub fn validate_draft(draft: &EntryDraft) -> ValidationResult {
    if draft.user_id.as_str().is_empty() {
        return Err(LedgerError::EmptyUserId);
    }

    validate_flow(draft)?;
    validate_context(draft)?;
    validate_amount(draft)?;

    match draft.entry_type {
        EntryType::Purchase | EntryType::Refund => validate_external_ref(draft),
        EntryType::GiftSent | EntryType::GiftReceived => validate_counterparty(draft),
        _ => Ok(()),
    }
}

/// The draft's source/destination must match the type's flow table
fn validate_flow(draft: &EntryDraft) -> ValidationResult {
    let (source, destination) = draft.entry_type.flow();
    if draft.source != source || draft.destination != destination {
        return Err(LedgerError::InvalidFlow {
            entry_type: draft.entry_type,
            fund_source: draft.source,
            destination: draft.destination,
        });
    }
    Ok(())
}

/// The context variant must be the one keyed by the type
fn validate_context(draft: &EntryDraft) -> ValidationResult {
    if !draft.context.matches(draft.entry_type) {
        return Err(LedgerError::ContextMismatch {
            entry_type: draft.entry_type,
            context: draft.context.kind(),
        });
    }
    Ok(())
}

/// Failure records are zero-amount; everything else must move coins,
/// except game settlements which may legitimately settle at zero.
fn validate_amount(draft: &EntryDraft) -> ValidationResult {
    if draft.disposition == Disposition::RecordFailure {
        if !draft.amount.is_zero() {
            return Err(LedgerError::NonZeroFailureAmount {
                amount: draft.amount,
            });
        }
        return Ok(());
    }

    let zero_allowed = matches!(
        draft.entry_type,
        EntryType::GameWin | EntryType::GameLoss | EntryType::Refund
    );
    if draft.amount.is_zero() && !zero_allowed {
        return Err(LedgerError::ZeroAmount {
            entry_type: draft.entry_type,
        });
    }
    Ok(())
}

/// Purchases and refunds are anchored to a provider payment
fn validate_external_ref(draft: &EntryDraft) -> ValidationResult {
    if draft.external_payment_id.is_none() {
        return Err(LedgerError::MissingExternalPaymentId {
            entry_type: draft.entry_type,
        });
    }
    Ok(())
}

/// Gifts always involve a second user
fn validate_counterparty(draft: &EntryDraft) -> ValidationResult {
    if draft.counterparty_id.is_none() {
        return Err(LedgerError::MissingCounterparty {
            entry_type: draft.entry_type,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryContext, FundDestination, FundSource};
    use glowcast_core::Coins;

    fn purchase_draft() -> EntryDraft {
        EntryDraft::new(
            "alice",
            EntryType::Purchase,
            Coins::new(1000),
            EntryContext::Purchase {
                payment_id: "pay_1".to_string(),
                payment_gateway: "stripe".to_string(),
            },
        )
        .external_payment_id("pay_1")
    }

    #[test]
    fn test_valid_purchase() {
        assert!(validate_draft(&purchase_draft()).is_ok());
    }

    #[test]
    fn test_flow_mismatch_rejected() {
        let draft = purchase_draft().with_flow(FundSource::Wallet, FundDestination::Game);
        let result = validate_draft(&draft);
        assert!(matches!(result, Err(LedgerError::InvalidFlow { .. })));
    }

    #[test]
    fn test_context_mismatch_rejected() {
        let mut draft = purchase_draft();
        draft.context = EntryContext::Game {
            game_id: "wheel".to_string(),
            session_id: None,
        };
        let result = validate_draft(&draft);
        assert!(matches!(result, Err(LedgerError::ContextMismatch { .. })));
    }

    #[test]
    fn test_purchase_requires_external_payment_id() {
        let mut draft = purchase_draft();
        draft.external_payment_id = None;
        let result = validate_draft(&draft);
        assert!(matches!(
            result,
            Err(LedgerError::MissingExternalPaymentId { .. })
        ));
    }

    #[test]
    fn test_gift_requires_counterparty() {
        let draft = EntryDraft::new(
            "alice",
            EntryType::GiftSent,
            Coins::new(50),
            EntryContext::Gift {
                gift_id: "rose".to_string(),
                stream_id: None,
            },
        );
        let result = validate_draft(&draft);
        assert!(matches!(result, Err(LedgerError::MissingCounterparty { .. })));

        let draft = draft.counterparty("bob");
        assert!(validate_draft(&draft).is_ok());
    }

    #[test]
    fn test_zero_amount_rejected_for_purchase() {
        let mut draft = purchase_draft();
        draft.amount = Coins::ZERO;
        let result = validate_draft(&draft);
        assert!(matches!(result, Err(LedgerError::ZeroAmount { .. })));
    }

    #[test]
    fn test_failure_record_must_be_zero() {
        let mut draft = purchase_draft().disposition(Disposition::RecordFailure);
        draft.amount = Coins::new(10);
        let result = validate_draft(&draft);
        assert!(matches!(
            result,
            Err(LedgerError::NonZeroFailureAmount { .. })
        ));

        draft.amount = Coins::ZERO;
        assert!(validate_draft(&draft).is_ok());
    }
}
