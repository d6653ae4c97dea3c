//! Daily brushing streaks.
//!
//! Each completed session may be claimed once per day. Claiming the day after
//! the previous claim extends the streak; skipping a day restarts it at one.
//! Kept in memory only.

use serde::{Deserialize, Serialize};

use crate::error::StreakError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakLedger {
    pub streak: u32,
    /// `None` until the first claim.
    pub last_day_claimed: Option<i64>,
    pub total_claims: u32,
}

impl StreakLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a claim for `day` (days since the Unix epoch).
    pub fn claim(&mut self, day: i64) -> Result<(), StreakError> {
        match self.last_day_claimed {
            None => self.streak = 1,
            Some(last) if day == last => return Err(StreakError::AlreadyClaimedToday(day)),
            Some(last) if day < last => return Err(StreakError::InvalidDay { day, last }),
            Some(last) if day == last + 1 => self.streak = self.streak.saturating_add(1),
            Some(_) => self.streak = 1,
        }
        self.last_day_claimed = Some(day);
        self.total_claims = self.total_claims.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_starts_streak() {
        let mut ledger = StreakLedger::new();
        ledger.claim(100).unwrap();
        assert_eq!(ledger.streak, 1);
        assert_eq!(ledger.last_day_claimed, Some(100));
        assert_eq!(ledger.total_claims, 1);
    }

    #[test]
    fn consecutive_days_extend_and_gaps_restart() {
        let mut ledger = StreakLedger::new();
        for day in 10..15 {
            ledger.claim(day).unwrap();
        }
        assert_eq!(ledger.streak, 5);

        ledger.claim(17).unwrap();
        assert_eq!(ledger.streak, 1);
        assert_eq!(ledger.total_claims, 6);
    }

    #[test]
    fn same_day_and_past_days_are_rejected() {
        let mut ledger = StreakLedger::new();
        ledger.claim(20).unwrap();
        assert_eq!(ledger.claim(20), Err(StreakError::AlreadyClaimedToday(20)));
        assert_eq!(
            ledger.claim(19),
            Err(StreakError::InvalidDay { day: 19, last: 20 })
        );
        assert_eq!(ledger.streak, 1);
        assert_eq!(ledger.total_claims, 1);
    }
}
