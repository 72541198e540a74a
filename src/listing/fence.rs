//! RequestFence
//!
//! Monotonic token counter that decides which asynchronous response may be
//! committed. Each fetch takes a token with [`RequestFence::begin`] before the
//! request goes out and checks [`RequestFence::is_current`] before writing its
//! result; anything begun earlier is discarded as superseded.

use std::sync::atomic::{AtomicU64, Ordering};

/// Token handed out by [`RequestFence::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FenceToken(u64);

impl FenceToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

pub struct RequestFence {
    counter: AtomicU64,
}

impl RequestFence {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Start a request. Tokens start at 1, 0 is "nothing begun yet".
    pub fn begin(&self) -> FenceToken {
        FenceToken(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether no request was begun after `token`
    pub fn is_current(&self, token: FenceToken) -> bool {
        self.counter.load(Ordering::SeqCst) == token.0
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for RequestFence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_start_at_one() {
        let fence = RequestFence::new();
        assert_eq!(fence.current(), 0);
        assert_eq!(fence.begin().value(), 1);
        assert_eq!(fence.current(), 1);
    }

    #[test]
    fn test_only_latest_is_current() {
        let fence = RequestFence::new();
        let first = fence.begin();
        let second = fence.begin();
        let third = fence.begin();

        assert!(first < second && second < third);
        assert!(!fence.is_current(first));
        assert!(!fence.is_current(second));
        assert!(fence.is_current(third));
    }

    #[test]
    fn test_concurrent_begin_is_unique() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let fence = Arc::new(RequestFence::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let fence = fence.clone();
                std::thread::spawn(move || (0..250).map(|_| fence.begin()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token));
            }
        }
        assert_eq!(fence.current(), 1000);
    }
}
