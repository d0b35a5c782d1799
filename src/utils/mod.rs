//! Utility module.

pub mod jwt;
pub mod rand;

pub use jwt::{cookie_key, gen_token, parse_token, Claims};
pub use rand::{gen_oauth_state, gen_rand_str};
