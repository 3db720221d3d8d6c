use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Easing curve applied to linear progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// Cubic deceleration.
    EaseOut,
}

#[derive(Debug, Clone, Copy)]
struct Tween {
    from: f64,
    to: f64,
    start: Instant,
    duration: Duration,
    easing: Easing,
}

impl Tween {
    fn value(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.start);
        if self.duration.is_zero() || elapsed >= self.duration {
            return self.to;
        }
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        self.from + (self.to - self.from) * ease(t, self.easing)
    }

    fn done(&self, now: Instant) -> bool {
        self.duration.is_zero() || now.saturating_duration_since(self.start) >= self.duration
    }
}

/// Wall-clock value interpolation keyed by `K`.
///
/// The map renderer keys fades by object id; values are sampled once per
/// frame and pushed to the matching element.
pub struct Animator<K> {
    tweens: HashMap<K, Tween>,
}

impl<K: Hash + Eq + Copy> Default for Animator<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Copy> Animator<K> {
    pub fn new() -> Self {
        Self {
            tweens: HashMap::new(),
        }
    }

    /// Start (or restart) an animation for `key`.
    pub fn start(
        &mut self,
        key: K,
        from: f64,
        to: f64,
        duration: Duration,
        easing: Easing,
        now: Instant,
    ) {
        self.tweens.insert(
            key,
            Tween {
                from,
                to,
                start: now,
                duration,
                easing,
            },
        );
    }

    /// Animate toward `to` from wherever the value is now. `current` is used
    /// when no animation is running for `key`.
    pub fn retarget(
        &mut self,
        key: K,
        current: f64,
        to: f64,
        duration: Duration,
        easing: Easing,
        now: Instant,
    ) {
        let from = self.get(key, now).unwrap_or(current);
        self.start(key, from, to, duration, easing, now);
    }

    /// Current value, or the target once finished. None if never started.
    pub fn get(&self, key: K, now: Instant) -> Option<f64> {
        self.tweens.get(&key).map(|t| t.value(now))
    }

    pub fn is_active(&self, key: K, now: Instant) -> bool {
        self.tweens.get(&key).is_some_and(|t| !t.done(now))
    }

    pub fn target(&self, key: K) -> Option<f64> {
        self.tweens.get(&key).map(|t| t.to)
    }

    pub fn remove(&mut self, key: K) {
        self.tweens.remove(&key);
    }

    /// Keys with an animation still in flight.
    pub fn active(&self, now: Instant) -> Vec<K> {
        self.tweens
            .iter()
            .filter(|(_, t)| !t.done(now))
            .map(|(k, _)| *k)
            .collect()
    }

    /// Drop finished animations. Call once per frame after sampling.
    pub fn gc(&mut self, now: Instant) {
        self.tweens.retain(|_, t| !t.done(now));
    }
}

fn ease(t: f64, easing: Easing) -> f64 {
    match easing {
        Easing::Linear => t,
        Easing::EaseOut => {
            let f = 1.0 - t;
            1.0 - f * f * f
        }
    }
}
