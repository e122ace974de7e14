//! Send-slot computation for scheduled outreach.
//!
//! Slots keep a minimum gap between a campaign's messages and respect the
//! per-channel daily cap; when a day is full the next slot rolls over to the
//! following morning.

use chrono::{DateTime, Duration, Utc};

/// Minimum spacing between two messages in one campaign/channel.
pub fn min_message_gap() -> Duration {
    Duration::minutes(5)
}

/// Hour of day (UTC) where rolled-over scheduling resumes.
const NEXT_DAY_START_HOUR: u32 = 9;

/// Compute `count` send times after `now`, given the already-scheduled times
/// for the same campaign and channel.
///
/// Returns an empty vector when `daily_limit` is not positive.
pub fn next_send_slots(
    existing: &[DateTime<Utc>],
    daily_limit: i32,
    count: usize,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    if daily_limit <= 0 || count == 0 {
        return Vec::new();
    }

    let gap = min_message_gap();
    let mut taken: Vec<DateTime<Utc>> = existing.to_vec();
    taken.sort();

    let mut candidate = match taken.last() {
        Some(last) => (*last + gap).max(now + gap),
        None => now + gap,
    };

    let mut slots = Vec::with_capacity(count);
    while slots.len() < count {
        let day = candidate.date_naive();
        let on_day = taken.iter().filter(|t| t.date_naive() == day).count();
        if on_day >= daily_limit as usize {
            let next_day = day.succ_opt().expect("date within chrono range");
            candidate = next_day
                .and_hms_opt(NEXT_DAY_START_HOUR, 0, 0)
                .expect("valid constant time")
                .and_utc();
            continue;
        }
        slots.push(candidate);
        taken.push(candidate);
        candidate += gap;
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc::now()
            .date_naive()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn first_slot_leaves_a_gap_from_now() {
        let now = at(10, 0);
        let slots = next_send_slots(&[], 50, 1, now);
        assert_eq!(slots, vec![now + Duration::minutes(5)]);
    }

    #[test]
    fn slots_are_spaced_by_the_minimum_gap() {
        let now = at(10, 0);
        let slots = next_send_slots(&[], 50, 3, now);
        assert_eq!(slots.len(), 3);
        for pair in slots.windows(2) {
            assert!(pair[1] - pair[0] >= min_message_gap());
        }
    }

    #[test]
    fn slots_follow_existing_schedule() {
        let now = at(10, 0);
        let existing = vec![at(11, 0)];
        let slots = next_send_slots(&existing, 50, 1, now);
        assert_eq!(slots, vec![at(11, 5)]);
    }

    #[test]
    fn full_day_rolls_over_to_next_morning() {
        let now = at(10, 0);
        let existing = vec![at(10, 10), at(10, 20)];
        let slots = next_send_slots(&existing, 2, 1, now);
        assert_eq!(slots.len(), 1);
        let slot = slots[0];
        assert_eq!(slot.date_naive(), now.date_naive().succ_opt().unwrap());
        assert_eq!(slot.hour(), NEXT_DAY_START_HOUR);
    }

    #[test]
    fn zero_limit_yields_no_slots() {
        assert!(next_send_slots(&[], 0, 3, at(10, 0)).is_empty());
    }

    #[test]
    fn multi_day_fill_respects_daily_cap() {
        let now = at(10, 0);
        let slots = next_send_slots(&[], 2, 5, now);
        assert_eq!(slots.len(), 5);

        let mut by_day = std::collections::HashMap::new();
        for slot in &slots {
            *by_day.entry(slot.date_naive()).or_insert(0usize) += 1;
        }
        assert!(by_day.values().all(|&n| n <= 2));
    }
}
