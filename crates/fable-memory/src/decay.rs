use fable_core::world::{env_actor_location, LogEntry, SYSTEM_ACTOR_ID};

/// Sampling interval for a round `age` rounds in the past.
///
/// Rounds younger than `capacity` are all kept (step 1). Beyond that the
/// interval doubles per tier: `tier = floor(log2(age / capacity)) + 1`,
/// `step = 2^tier`.
pub fn decay_step(age: u32, capacity: u32) -> u64 {
    let capacity = capacity.max(1);
    if age < capacity {
        return 1;
    }
    let tier = (age / capacity).ilog2() + 1;
    1u64 << tier.min(63)
}

/// Whether a round of the given age survives decay sampling. Age 0 always does.
pub fn is_round_kept(age: u32, capacity: u32) -> bool {
    u64::from(age) % decay_step(age, capacity) == 0
}

/// Presence predicate: does `entry` belong in `actor_id`'s memory?
pub fn qualifies_for_actor(entry: &LogEntry, actor_id: &str, current_location_id: Option<&str>) -> bool {
    if actor_id == SYSTEM_ACTOR_ID {
        return true;
    }

    let env_location = env_actor_location(actor_id);
    let participant = entry.is_present(actor_id) || entry.is_acting(actor_id);
    let entry_location = entry.location_id.as_deref();

    let same_location = entry_location.is_some() && entry_location == current_location_id;
    let env_match = env_location.is_some() && entry_location == env_location;

    if !(participant || same_location || env_match) {
        return false;
    }
    if entry.is_hidden_round() && env_location.is_none() {
        return participant;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_rounds_are_always_kept() {
        for age in 0..10 {
            assert_eq!(decay_step(age, 10), 1);
            assert!(is_round_kept(age, 10));
        }
    }

    #[test]
    fn tiers_double_the_step() {
        assert_eq!(decay_step(10, 10), 2);
        assert_eq!(decay_step(19, 10), 2);
        assert_eq!(decay_step(20, 10), 4);
        assert_eq!(decay_step(39, 10), 4);
        assert_eq!(decay_step(40, 10), 8);
        assert_eq!(decay_step(80, 10), 16);
    }

    #[test]
    fn age_fifteen_with_capacity_ten_is_dropped() {
        assert!(!is_round_kept(15, 10));
        assert!(is_round_kept(16, 10));
        assert!(is_round_kept(0, 10));
    }

    #[test]
    fn zero_capacity_behaves_like_one() {
        assert_eq!(decay_step(0, 0), 1);
        assert_eq!(decay_step(1, 0), 2);
        assert_eq!(decay_step(3, 0), 4);
    }

    #[test]
    fn presence_rules() {
        let entry = LogEntry::new(1, "x").at("tavern").by("mira").with_present(["tom"]);
        assert!(qualifies_for_actor(&entry, "mira", None));
        assert!(qualifies_for_actor(&entry, "tom", Some("docks")));
        assert!(qualifies_for_actor(&entry, "ann", Some("tavern")));
        assert!(!qualifies_for_actor(&entry, "ann", Some("docks")));
        assert!(!qualifies_for_actor(&entry, "ann", None));
        assert!(qualifies_for_actor(&entry, "env_tavern", None));
        assert!(!qualifies_for_actor(&entry, "env_docks", None));
        assert!(qualifies_for_actor(&entry, "system", None));
    }

    #[test]
    fn hidden_rounds_need_real_participation() {
        let entry = LogEntry::new(1, "whisper").at("tavern").by("mira").with_present(["tom"]).hidden();
        assert!(qualifies_for_actor(&entry, "mira", Some("tavern")));
        assert!(qualifies_for_actor(&entry, "tom", Some("tavern")));
        assert!(!qualifies_for_actor(&entry, "ann", Some("tavern")));
        assert!(qualifies_for_actor(&entry, "env_tavern", None));
        assert!(qualifies_for_actor(&entry, "system", None));
    }
}
