use serde::{Deserialize, Serialize};

use crate::inquiry::InquiryStatus;

/// Per-stage aggregate counts plus the unfiltered total.
///
/// Adjusted incrementally as change events arrive and replaced wholesale by
/// each authoritative count fetch; decrements clamp at zero so a replayed
/// event can never drive a bucket negative.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: u64,
    pub contacted: u64,
    pub qualified: u64,
    pub won: u64,
    pub bad: u64,
    pub lost: u64,
    pub total: u64,
}

impl StatusCounts {
    pub fn get(&self, status: InquiryStatus) -> u64 {
        match status {
            InquiryStatus::New => self.new,
            InquiryStatus::Contacted => self.contacted,
            InquiryStatus::Qualified => self.qualified,
            InquiryStatus::Won => self.won,
            InquiryStatus::Bad => self.bad,
            InquiryStatus::Lost => self.lost,
        }
    }

    pub fn bucket_mut(&mut self, status: InquiryStatus) -> &mut u64 {
        match status {
            InquiryStatus::New => &mut self.new,
            InquiryStatus::Contacted => &mut self.contacted,
            InquiryStatus::Qualified => &mut self.qualified,
            InquiryStatus::Won => &mut self.won,
            InquiryStatus::Bad => &mut self.bad,
            InquiryStatus::Lost => &mut self.lost,
        }
    }

    /// A row appeared with the given stage.
    pub fn record_insert(&mut self, status: InquiryStatus) {
        *self.bucket_mut(status) += 1;
        self.total += 1;
    }

    /// A row with the given stage went away.
    pub fn record_delete(&mut self, status: InquiryStatus) {
        let bucket = self.bucket_mut(status);
        *bucket = bucket.saturating_sub(1);
        self.total = self.total.saturating_sub(1);
    }

    /// A row moved between stages. Total is unchanged.
    pub fn record_transition(&mut self, from: InquiryStatus, to: InquiryStatus) {
        if from == to {
            return;
        }
        let old = self.bucket_mut(from);
        *old = old.saturating_sub(1);
        *self.bucket_mut(to) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_bumps_bucket_and_total() {
        let mut counts = StatusCounts::default();
        counts.record_insert(InquiryStatus::New);
        counts.record_insert(InquiryStatus::New);
        counts.record_insert(InquiryStatus::Won);
        assert_eq!(counts.new, 2);
        assert_eq!(counts.won, 1);
        assert_eq!(counts.total, 3);
    }

    #[test]
    fn delete_clamps_at_zero() {
        let mut counts = StatusCounts::default();
        counts.record_delete(InquiryStatus::Lost);
        assert_eq!(counts.lost, 0);
        assert_eq!(counts.total, 0);
    }

    #[test]
    fn transition_moves_one_between_buckets() {
        let mut counts = StatusCounts {
            new: 2,
            total: 2,
            ..Default::default()
        };
        counts.record_transition(InquiryStatus::New, InquiryStatus::Contacted);
        assert_eq!(counts.new, 1);
        assert_eq!(counts.contacted, 1);
        assert_eq!(counts.total, 2);
    }

    #[test]
    fn transition_to_same_stage_is_noop() {
        let mut counts = StatusCounts {
            won: 0,
            total: 1,
            ..Default::default()
        };
        counts.record_transition(InquiryStatus::Won, InquiryStatus::Won);
        assert_eq!(counts.won, 0);
        assert_eq!(counts.total, 1);
    }

    #[test]
    fn transition_clamps_source_bucket() {
        let mut counts = StatusCounts::default();
        counts.record_transition(InquiryStatus::New, InquiryStatus::Won);
        assert_eq!(counts.new, 0);
        assert_eq!(counts.won, 1);
    }
}
