use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PlanStatus {
    #[default]
    Free,
    Trialing,
    Active,
    PastDue,
    Canceled,
    /// Reported by [`PlanState::effective_status`] only.
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanState {
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub trial_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
}

impl PlanState {
    /// One trial per account, and only before any paid plan.
    pub fn start_trial(&mut self, now: DateTime<Utc>, days: i64) -> Result<()> {
        if self.trial_used {
            return Err(Error::InvalidTransition("trial already used".into()));
        }
        if self.status != PlanStatus::Free {
            return Err(Error::InvalidTransition(format!(
                "cannot start a trial from {:?}",
                self.status
            )));
        }
        self.status = PlanStatus::Trialing;
        self.trial_used = true;
        self.trial_ends_at = Some(now + Duration::days(days));
        Ok(())
    }

    pub fn activate(
        &mut self,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        period_end: Option<DateTime<Utc>>,
    ) {
        self.status = PlanStatus::Active;
        if customer_id.is_some() {
            self.stripe_customer_id = customer_id;
        }
        if subscription_id.is_some() {
            self.stripe_subscription_id = subscription_id;
        }
        if period_end.is_some() {
            self.current_period_end = period_end;
        }
    }

    /// Apply a Stripe subscription status. Unknown statuses leave the plan as is.
    pub fn set_status_from_stripe(&mut self, status: &str) {
        self.status = match status {
            "active" | "trialing" => PlanStatus::Active,
            "past_due" | "unpaid" => PlanStatus::PastDue,
            "canceled" | "incomplete_expired" => PlanStatus::Canceled,
            _ => return,
        };
    }

    pub fn cancel(&mut self) {
        self.status = PlanStatus::Canceled;
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> PlanStatus {
        match (self.status, self.trial_ends_at) {
            (PlanStatus::Trialing, Some(end)) if end <= now => PlanStatus::Expired,
            (status, _) => status,
        }
    }

    pub fn can_analyze(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.effective_status(now),
            PlanStatus::Trialing | PlanStatus::Active
        )
    }

    /// Whole days left in a running trial, rounded up.
    pub fn trial_days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.effective_status(now) != PlanStatus::Trialing {
            return None;
        }
        let end = self.trial_ends_at?;
        let secs = (end - now).num_seconds().max(0);
        Some((secs + 86_399) / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_runs_once_then_expires() {
        let now = Utc::now();
        let mut plan = PlanState::default();
        assert!(!plan.can_analyze(now));

        plan.start_trial(now, 7).unwrap();
        assert!(plan.can_analyze(now));
        assert_eq!(plan.trial_days_remaining(now), Some(7));

        let later = now + Duration::days(8);
        assert_eq!(plan.effective_status(later), PlanStatus::Expired);
        assert!(!plan.can_analyze(later));
        assert_eq!(plan.trial_days_remaining(later), None);

        assert!(matches!(plan.start_trial(later, 7), Err(Error::InvalidTransition(_))));
    }

    #[test]
    fn no_trial_after_subscribing() {
        let mut plan = PlanState::default();
        plan.activate(Some("cus_1".into()), Some("sub_1".into()), None);
        assert!(plan.start_trial(Utc::now(), 7).is_err());
        assert_eq!(plan.stripe_customer_id.as_deref(), Some("cus_1"));
    }

    #[test]
    fn stripe_status_mapping() {
        let mut plan = PlanState::default();
        plan.set_status_from_stripe("trialing");
        assert_eq!(plan.status, PlanStatus::Active);
        plan.set_status_from_stripe("past_due");
        assert_eq!(plan.status, PlanStatus::PastDue);
        assert!(!plan.can_analyze(Utc::now()));
        plan.set_status_from_stripe("incomplete");
        assert_eq!(plan.status, PlanStatus::PastDue);
        plan.set_status_from_stripe("canceled");
        assert_eq!(plan.status, PlanStatus::Canceled);
    }

    #[test]
    fn activate_keeps_known_ids() {
        let mut plan = PlanState::default();
        plan.activate(Some("cus_1".into()), Some("sub_1".into()), None);
        plan.cancel();
        plan.activate(None, None, None);
        assert_eq!(plan.status, PlanStatus::Active);
        assert_eq!(plan.stripe_subscription_id.as_deref(), Some("sub_1"));
    }
}
