use std::sync::Arc;

use tracing::error;

use callbook_db::Database;
use callbook_types::{
    Account, EligibilityReport, IneligibilityReason, MembershipInfo, MembershipTier,
};

use crate::clock::Clock;

/// Decides whether an account may book private calls. Read-only.
pub struct EligibilityGate {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl EligibilityGate {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Never fails: unknown users and store errors both yield an ineligible
    /// report.
    pub fn check_eligibility(&self, user_id: &str) -> EligibilityReport {
        match self.db.get_account(user_id) {
            Ok(Some(account)) => self.evaluate(&account),
            Ok(None) => EligibilityReport::refused(IneligibilityReason::UserNotFound),
            Err(e) => {
                error!("Eligibility lookup failed for {}: {:#}", user_id, e);
                EligibilityReport::refused(IneligibilityReason::Error)
            }
        }
    }

    fn evaluate(&self, account: &Account) -> EligibilityReport {
        let now = self.clock.now();
        let mut reasons = Vec::new();

        if !account.age_verified {
            reasons.push(IneligibilityReason::AgeNotVerified);
        }
        if account.terms_accepted_at.is_none() {
            reasons.push(IneligibilityReason::TermsNotAccepted);
        }
        if account.is_restricted {
            reasons.push(IneligibilityReason::UserRestricted);
        }
        if !account.private_calls_enabled {
            reasons.push(IneligibilityReason::PrivateCallsDisabled);
        }
        match account.membership_tier {
            MembershipTier::Free => reasons.push(IneligibilityReason::MembershipRequired),
            MembershipTier::Prime => {
                // No expiry means a lifetime membership.
                if account.membership_expires_at.is_some_and(|exp| exp < now) {
                    reasons.push(IneligibilityReason::MembershipExpired);
                }
            }
        }

        EligibilityReport {
            eligible: reasons.is_empty(),
            reasons,
            membership: MembershipInfo {
                tier: Some(account.membership_tier),
                expires_at: account.membership_expires_at,
            },
            is_restricted: account.is_restricted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn gate() -> (EligibilityGate, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc.with_ymd_and_hms(2026, 10, 20, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        (EligibilityGate::new(db.clone(), clock), db)
    }

    fn account(user_id: &str) -> Account {
        Account {
            user_id: user_id.to_string(),
            age_verified: true,
            terms_accepted_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            is_restricted: false,
            private_calls_enabled: true,
            membership_tier: MembershipTier::Prime,
            membership_expires_at: None,
            language: "en".to_string(),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn lifetime_prime_is_eligible() {
        let (gate, db) = gate();
        db.upsert_account(&account("u1")).unwrap();
        let report = gate.check_eligibility("u1");
        assert!(report.eligible);
        assert!(report.reasons.is_empty());
        assert_eq!(report.membership.tier, Some(MembershipTier::Prime));
    }

    #[test]
    fn reasons_accumulate() {
        let (gate, db) = gate();
        let mut acc = account("u2");
        acc.age_verified = false;
        acc.terms_accepted_at = None;
        acc.is_restricted = true;
        acc.membership_tier = MembershipTier::Free;
        db.upsert_account(&acc).unwrap();

        let report = gate.check_eligibility("u2");
        assert!(!report.eligible);
        assert!(report.is_restricted);
        assert_eq!(
            report.reasons,
            vec![
                IneligibilityReason::AgeNotVerified,
                IneligibilityReason::TermsNotAccepted,
                IneligibilityReason::UserRestricted,
                IneligibilityReason::MembershipRequired,
            ]
        );
    }

    #[test]
    fn lapsed_prime_is_expired() {
        let (gate, db) = gate();
        let mut acc = account("u3");
        acc.membership_expires_at = Some(gate.clock.now() - Duration::days(1));
        db.upsert_account(&acc).unwrap();
        assert_eq!(
            gate.check_eligibility("u3").reasons,
            vec![IneligibilityReason::MembershipExpired]
        );
    }

    #[test]
    fn unknown_user_fails_closed() {
        let (gate, _db) = gate();
        let report = gate.check_eligibility("ghost");
        assert!(!report.eligible);
        assert_eq!(report.reasons, vec![IneligibilityReason::UserNotFound]);
    }
}
