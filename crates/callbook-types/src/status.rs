//! Lifecycle and classification enums.
//!
//! Every enum here is persisted as its snake_case text form, so `as_str` and
//! `FromStr` must stay in sync with the serde names. The `text_enum!` macro
//! keeps the three in one place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $( $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Booking lifecycle. `draft → held → awaiting_payment → confirmed →
    /// {completed, no_show}`, with cancellation and expiry side exits.
    BookingStatus as "booking status" {
        Draft => "draft",
        Held => "held",
        AwaitingPayment => "awaiting_payment",
        Confirmed => "confirmed",
        Completed => "completed",
        NoShow => "no_show",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

impl BookingStatus {
    /// The exhaustive transition table. Anything not listed is a state violation.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Draft, Held)
                | (Held, Held)
                | (Held, AwaitingPayment)
                | (AwaitingPayment, AwaitingPayment)
                | (AwaitingPayment, Confirmed)
                | (Confirmed, Completed)
                | (Confirmed, NoShow)
                | (Draft | Held | AwaitingPayment | Confirmed, Cancelled)
                | (Draft | Held | AwaitingPayment, Expired)
        )
    }

    /// Every status from which `next` is reachable in one step.
    pub fn sources_of(next: BookingStatus) -> Vec<BookingStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed
                | BookingStatus::NoShow
                | BookingStatus::Cancelled
                | BookingStatus::Expired
        )
    }

    /// Statuses that occupy the performer's calendar once paid for or held.
    pub fn is_occupying(self) -> bool {
        matches!(
            self,
            BookingStatus::Held | BookingStatus::AwaitingPayment | BookingStatus::Confirmed
        )
    }

    /// Statuses that block another booking of the same range. Drafts claim
    /// too, until the draft TTL sweeps them.
    pub fn claims_slot(self) -> bool {
        self == BookingStatus::Draft || self.is_occupying()
    }

    pub fn claiming() -> Vec<BookingStatus> {
        Self::ALL.iter().copied().filter(|s| s.claims_slot()).collect()
    }
}

text_enum! {
    /// Meeting session lifecycle: `scheduled → live → ended → destroyed`.
    SessionStatus as "session status" {
        Scheduled => "scheduled",
        Live => "live",
        Ended => "ended",
        Destroyed => "destroyed",
    }
}

impl SessionStatus {
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Scheduled, Live) | (Live, Ended) | (Scheduled | Live | Ended, Destroyed)
        )
    }

    pub fn sources_of(next: SessionStatus) -> Vec<SessionStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        self == SessionStatus::Destroyed
    }
}

text_enum! {
    PaymentStatus as "payment status" {
        Pending => "pending",
        Paid => "paid",
        Expired => "expired",
        Failed => "failed",
    }
}

impl PaymentStatus {
    /// A paid webhook may still land after the sweep expired the link; the
    /// provider took the money, so `expired → paid` is honoured.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid | Expired | Failed) | (Expired, Paid)
        )
    }

    pub fn sources_of(next: PaymentStatus) -> Vec<PaymentStatus> {
        Self::ALL
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

text_enum! {
    NotificationStatus as "notification status" {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    NotificationKind as "notification type" {
        Reminder60 => "reminder_60",
        Reminder15 => "reminder_15",
        Reminder5 => "reminder_5",
        Followup => "followup",
        FeedbackRequest => "feedback_request",
    }
}

impl NotificationKind {
    /// Minutes before the call start, for the reminder kinds.
    pub fn lead_minutes(self) -> Option<i64> {
        match self {
            NotificationKind::Reminder60 => Some(60),
            NotificationKind::Reminder15 => Some(15),
            NotificationKind::Reminder5 => Some(5),
            _ => None,
        }
    }

    pub fn is_reminder(self) -> bool {
        self.lead_minutes().is_some()
    }

    pub fn reminder_for(minutes: i64) -> Option<NotificationKind> {
        match minutes {
            60 => Some(NotificationKind::Reminder60),
            15 => Some(NotificationKind::Reminder15),
            5 => Some(NotificationKind::Reminder5),
            _ => None,
        }
    }
}

text_enum! {
    CallType as "call type" {
        Video => "video",
        Audio => "audio",
    }
}

text_enum! {
    PerformerStatus as "performer status" {
        Active => "active",
        Inactive => "inactive",
    }
}

text_enum! {
    /// How a performer's bookable windows are derived.
    AvailabilityMode as "availability mode" {
        WorkingHours => "working_hours",
        ExplicitSlots => "explicit_slots",
    }
}

text_enum! {
    CancelledBy as "cancel actor" {
        User => "user",
        Performer => "performer",
        Admin => "admin",
        System => "system",
    }
}

text_enum! {
    MembershipTier as "membership tier" {
        Free => "free",
        Prime => "prime",
    }
}

text_enum! {
    IneligibilityReason as "eligibility reason" {
        AgeNotVerified => "age_not_verified",
        TermsNotAccepted => "terms_not_accepted",
        UserRestricted => "user_restricted",
        PrivateCallsDisabled => "private_calls_disabled",
        MembershipRequired => "membership_required",
        MembershipExpired => "membership_expired",
        UserNotFound => "user_not_found",
        Error => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_happy_path_is_allowed() {
        use BookingStatus::*;
        let path = [Draft, Held, AwaitingPayment, Confirmed, Completed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Held.can_transition_to(Held));
    }

    #[test]
    fn terminal_booking_states_are_sinks() {
        for from in BookingStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in BookingStatus::ALL {
                assert!(!from.can_transition_to(*to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn confirmed_cannot_expire_or_go_back() {
        use BookingStatus::*;
        assert!(!Confirmed.can_transition_to(Expired));
        assert!(!Confirmed.can_transition_to(AwaitingPayment));
        assert!(!Draft.can_transition_to(Confirmed));
    }

    #[test]
    fn sources_follow_the_table() {
        use BookingStatus::*;
        assert_eq!(BookingStatus::sources_of(Expired), vec![Draft, Held, AwaitingPayment]);
        assert_eq!(
            BookingStatus::sources_of(Cancelled),
            vec![Draft, Held, AwaitingPayment, Confirmed]
        );
        assert_eq!(
            SessionStatus::sources_of(SessionStatus::Destroyed),
            vec![SessionStatus::Scheduled, SessionStatus::Live, SessionStatus::Ended]
        );
    }

    #[test]
    fn claiming_set_includes_drafts() {
        assert!(BookingStatus::Draft.claims_slot());
        assert!(!BookingStatus::Draft.is_occupying());
        assert!(!BookingStatus::Expired.claims_slot());
        assert_eq!(BookingStatus::claiming().len(), 4);
    }

    #[test]
    fn text_forms_parse_back() {
        assert_eq!("awaiting_payment".parse::<BookingStatus>().unwrap(), BookingStatus::AwaitingPayment);
        assert_eq!("reminder_15".parse::<NotificationKind>().unwrap(), NotificationKind::Reminder15);
        let err = "bogus".parse::<SessionStatus>().unwrap_err();
        assert_eq!(err.kind, "session status");
        assert_eq!(
            serde_json::to_string(&BookingStatus::NoShow).unwrap(),
            "\"no_show\""
        );
    }

    #[test]
    fn late_paid_webhook_is_honoured() {
        assert!(PaymentStatus::Expired.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Paid));
    }
}
