use rand::Rng;
use rand::distr::Alphanumeric;

pub const SHORT_ID_LEN: usize = 8;

/// Attempts at finding an unused short id before giving up.
pub const SHORT_ID_ATTEMPTS: usize = 5;

/// Random public handle drawn from `[A-Za-z0-9]`.
pub fn generate_short_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SHORT_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_alphanumeric_and_distinct() {
        let a = generate_short_id();
        let b = generate_short_id();
        assert_eq!(a.len(), SHORT_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
