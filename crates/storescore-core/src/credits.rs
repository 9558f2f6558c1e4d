//! Credit balance bookkeeping.
//!
//! Each operation mutates `User::credits` and returns the ledger entry that
//! explains the change. Callers persist both with [`commit`] under the account
//! lock, so the balance always equals the sum of the user's ledger deltas.

use chrono::Utc;
use tracing::warn;

use crate::{new_id, CreditEntry, CreditReason, Db, Error, Result, User};

pub fn grant(
    user: &mut User,
    amount: i64,
    reason: CreditReason,
    reference: Option<String>,
) -> Result<CreditEntry> {
    if amount <= 0 {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(apply(user, amount, reason, reference))
}

/// Take `amount` credits. Fails without touching the balance when it is too low.
pub fn debit(user: &mut User, amount: i64, reference: Option<String>) -> Result<CreditEntry> {
    if amount <= 0 {
        return Err(Error::InvalidAmount(amount));
    }
    if user.credits < amount {
        return Err(Error::InsufficientCredits {
            needed: amount,
            available: user.credits,
        });
    }
    Ok(apply(user, -amount, CreditReason::AnalysisDebit, reference))
}

pub fn refund(user: &mut User, amount: i64, reference: Option<String>) -> Result<CreditEntry> {
    grant(user, amount, CreditReason::AnalysisRefund, reference)
}

fn apply(user: &mut User, delta: i64, reason: CreditReason, reference: Option<String>) -> CreditEntry {
    user.credits += delta;
    CreditEntry {
        id: new_id(),
        user_id: user.id.clone(),
        delta,
        reason,
        reference,
        balance_after: user.credits,
        created_at: Utc::now(),
    }
}

/// Persist a balance change: the ledger entry first, then the user. When the
/// user write fails the entry is removed again, so the ledger keeps summing to
/// the stored balance.
pub fn commit(db: &Db, user: &User, entry: Option<&CreditEntry>) -> Result<()> {
    if let Some(entry) = entry {
        db.put(entry)?;
    }
    if let Err(e) = db.put(user) {
        if let Some(entry) = entry {
            if let Err(undo) = db.delete::<CreditEntry>(&entry.id) {
                warn!("could not roll back credit entry {}: {}", entry.id, undo);
            }
        }
        return Err(e);
    }
    Ok(())
}

pub fn ledger_balance(entries: &[CreditEntry]) -> i64 {
    entries.iter().map(|e| e.delta).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("a@b.co", "A", "hash".into())
    }

    #[test]
    fn debit_and_refund_track_balance() {
        let mut u = user();
        let mut ledger = vec![grant(&mut u, 3, CreditReason::TrialGrant, None).unwrap()];
        ledger.push(debit(&mut u, 1, Some("analysis-1".into())).unwrap());
        ledger.push(refund(&mut u, 1, Some("analysis-1".into())).unwrap());
        ledger.push(debit(&mut u, 2, None).unwrap());

        assert_eq!(u.credits, 1);
        assert_eq!(ledger.last().unwrap().balance_after, 1);
        assert_eq!(ledger_balance(&ledger), u.credits);
        assert_eq!(ledger[2].reason, CreditReason::AnalysisRefund);
    }

    #[test]
    fn overdraft_is_rejected_untouched() {
        let mut u = user();
        grant(&mut u, 1, CreditReason::Adjustment, None).unwrap();
        let err = debit(&mut u, 2, None).unwrap_err();
        assert!(matches!(err, Error::InsufficientCredits { needed: 2, available: 1 }));
        assert_eq!(u.credits, 1);
    }

    #[test]
    fn commit_rolls_back_entry_when_user_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path()).unwrap();
        let mut u = user();
        let entry = grant(&mut u, 5, CreditReason::TrialGrant, None).unwrap();
        commit(&db, &u, Some(&entry)).unwrap();
        assert_eq!(db.require::<User>(&u.id).unwrap().credits, 5);

        // A plain file where the users collection should be makes every user write fail.
        let other_dir = tempfile::tempdir().unwrap();
        let broken = Db::open(other_dir.path()).unwrap();
        std::fs::write(other_dir.path().join("users"), "not a directory").unwrap();
        let entry = debit(&mut u, 2, Some("analysis-9".into())).unwrap();
        assert!(commit(&broken, &u, Some(&entry)).is_err());
        assert!(broken.list::<CreditEntry>().unwrap().is_empty());
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let mut u = user();
        assert!(matches!(grant(&mut u, 0, CreditReason::Adjustment, None), Err(Error::InvalidAmount(0))));
        assert!(matches!(debit(&mut u, -3, None), Err(Error::InvalidAmount(-3))));
    }
}
