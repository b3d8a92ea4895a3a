/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */
use std::time::{Duration, Instant};
use rand::Rng;
use uuid::Uuid;

/// A fresh instance identifier for a process (or registry).
pub fn new_instance_id() -> String {
    Uuid::new_v4().to_string()
}

/// Uniformly distributed duration in `[min, max]`.
pub fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Time left until `deadline`, zero once it has passed.
pub fn remaining_until(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_instance_ids_are_unique() {
        assert_ne!(new_instance_id(), new_instance_id());
    }

    #[test]
    fn test_random_between_stays_in_range() {
        let min = Duration::from_millis(5);
        let max = Duration::from_millis(9);
        for _ in 0..200 {
            let d = random_between(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(random_between(max, min), max);
    }

    #[test]
    fn test_random_between_keeps_sub_millisecond_bounds() {
        let min = Duration::from_micros(100);
        let max = Duration::from_micros(900);
        for _ in 0..200 {
            let d = random_between(min, max);
            assert!(d >= min && d <= max);
        }
    }

    #[test]
    fn test_remaining_until_past_deadline() {
        let deadline = Instant::now();
        thread::sleep(Duration::from_millis(2));
        assert_eq!(remaining_until(deadline), Duration::ZERO);
    }
}
