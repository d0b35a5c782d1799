//! Random token generation.

use rand::distributions::{Alphanumeric, DistString};

/// Length of the OAuth `state` parameter.
pub const OAUTH_STATE_LENGTH: usize = 32;

/// Generates a random alphanumeric string of the specified length.
#[must_use]
pub fn gen_rand_str(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

/// Fresh value for the OAuth `state` parameter.
#[must_use]
pub fn gen_oauth_state() -> String {
    gen_rand_str(OAUTH_STATE_LENGTH)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_gen_rand_str_length_zero() {
        assert!(gen_rand_str(0).is_empty());
    }

    #[test]
    fn test_gen_rand_str_alphanumeric() {
        let s = gen_rand_str(1000);
        assert_eq!(s.len(), 1000);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_oauth_state_length() {
        assert_eq!(gen_oauth_state().len(), OAUTH_STATE_LENGTH);
    }

    #[test]
    fn test_oauth_states_are_unique() {
        let states: HashSet<String> = (0..100).map(|_| gen_oauth_state()).collect();
        assert_eq!(states.len(), 100);
    }
}
