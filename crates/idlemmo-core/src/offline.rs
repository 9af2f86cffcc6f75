//! Offline reward settlement
//!
//! Settlement approximates the ticks a player missed while disconnected:
//! gains scale linearly with the number of missed ticks and each drop is
//! awarded as its expected count, stochastically rounded to an integer.
//! Rare events and leveling are not replayed.

use crate::catalog::Catalog;
use crate::rng::GameRng;
use crate::{ActivityId, ItemId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Credit awarded for a period offline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OfflineReward {
    pub duration: Duration,
    pub gains: i64,
    pub items: IndexMap<ItemId, u64>,
}

impl OfflineReward {
    /// A reward carrying the duration but no credit
    pub fn empty(duration: Duration) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    /// True when there is nothing to credit
    pub fn is_empty(&self) -> bool {
        self.gains == 0 && self.items.is_empty()
    }
}

/// Settle `duration` of offline time across every activity the player has a level in
///
/// Returns an empty reward when `duration` is zero or reaches `limit`.
pub fn settle<'a>(
    levels: impl IntoIterator<Item = (&'a ActivityId, &'a u32)>,
    catalog: &Catalog,
    duration: Duration,
    limit: Duration,
    rng: &mut GameRng,
) -> OfflineReward {
    if duration.is_zero() || duration >= limit {
        return OfflineReward::empty(duration);
    }

    let mut reward = OfflineReward::empty(duration);
    let seconds = duration.as_secs_f64();

    for (activity, &level) in levels {
        if level == 0 {
            continue;
        }
        let Some(cfg) = catalog.activity(activity) else {
            continue;
        };
        let interval = cfg.effective_interval(None).as_secs_f64();
        let ticks = (seconds / interval).floor() as i64;
        if ticks <= 0 {
            continue;
        }

        reward.gains += cfg.base_tick_gain(level).max(0) * ticks;

        for drop in &cfg.drops {
            if drop.drop_chance <= 0.0 {
                continue;
            }
            let count = stochastic_round(ticks as f64 * drop.drop_chance, rng);
            if count > 0 {
                *reward.items.entry(drop.id.clone()).or_insert(0) += count;
            }
        }
    }

    reward
}

/// Round `expected` down, then up by one with probability equal to the remainder
pub fn stochastic_round(expected: f64, rng: &mut GameRng) -> u64 {
    if expected <= 0.0 {
        return 0;
    }
    let whole = expected.floor();
    let remainder = expected - whole;
    let mut count = whole as u64;
    if rng.chance(remainder) {
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ActivityConfig, ItemDrop};

    const LIMIT: Duration = Duration::from_secs(10 * 3600);

    fn catalog() -> Catalog {
        let mut mining = ActivityConfig::new("mining", 10, 1.0);
        mining.tick_interval = 60.0;
        mining.drops.push(ItemDrop {
            id: ItemId::new("ore"),
            name: "Ore".into(),
            drop_chance: 0.25,
            value: 1,
            is_equipment: false,
        });
        Catalog::new().with_activity(mining)
    }

    fn levels(level: u32) -> IndexMap<ActivityId, u32> {
        let mut map = IndexMap::new();
        map.insert(ActivityId::new("mining"), level);
        map
    }

    #[test]
    fn test_one_hour_offline() {
        let mut rng = GameRng::new(1);
        let reward = settle(
            &levels(5),
            &catalog(),
            Duration::from_secs(3600),
            LIMIT,
            &mut rng,
        );
        assert_eq!(reward.gains, 900);
        // 60 ticks * 0.25 has no remainder
        assert_eq!(reward.items.get(&ItemId::new("ore")), Some(&15));
    }

    #[test]
    fn test_zero_duration() {
        let mut rng = GameRng::new(1);
        let reward = settle(&levels(5), &catalog(), Duration::ZERO, LIMIT, &mut rng);
        assert_eq!(reward.gains, 0);
        assert!(reward.items.is_empty());
    }

    #[test]
    fn test_at_or_beyond_limit() {
        let mut rng = GameRng::new(1);
        for duration in [LIMIT, LIMIT + Duration::from_secs(1)] {
            let reward = settle(&levels(5), &catalog(), duration, LIMIT, &mut rng);
            assert!(reward.is_empty());
            assert_eq!(reward.duration, duration);
        }
    }

    #[test]
    fn test_skips_unknown_and_zero_levels() {
        let mut map = levels(0);
        map.insert(ActivityId::new("retired"), 9);
        let mut rng = GameRng::new(1);
        let reward = settle(&map, &catalog(), Duration::from_secs(3600), LIMIT, &mut rng);
        assert!(reward.is_empty());
    }

    #[test]
    fn test_partial_tick_gives_nothing() {
        let mut rng = GameRng::new(1);
        let reward = settle(&levels(5), &catalog(), Duration::from_secs(59), LIMIT, &mut rng);
        assert!(reward.is_empty());
    }

    #[test]
    fn test_stochastic_round_bounds() {
        let mut rng = GameRng::new(42);
        for _ in 0..200 {
            let n = stochastic_round(2.3, &mut rng);
            assert!(n == 2 || n == 3);
        }
        assert_eq!(stochastic_round(4.0, &mut rng), 4);
        assert_eq!(stochastic_round(0.0, &mut rng), 0);
    }

    #[test]
    fn test_stochastic_round_expectation() {
        let mut rng = GameRng::new(7);
        let total: u64 = (0..10_000).map(|_| stochastic_round(0.5, &mut rng)).sum();
        assert!((4_500..5_500).contains(&total));
    }
}
