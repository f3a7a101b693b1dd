use std::sync::atomic::{AtomicU64, Ordering};

/// A counter that allows consumers to withdraw (if possible) and deposit specific
/// amounts, keeping its value non-negative.
///
/// Atomic operations keep the counter consistent when a budget is shared between
/// independent pipelines (one per indexed field, for instance).
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new `Counter` with the given initial amount.
    pub fn new(amount: u64) -> Counter {
        Counter(AtomicU64::new(amount))
    }

    /// Attempts to withdraw the specified `amount` from the counter.
    ///
    /// If the current value is greater than or equal to `amount`, the amount is
    /// subtracted and `true` is returned. Otherwise, the counter remains unchanged
    /// and `false` is returned.
    pub fn withdraw(&self, amount: u64) -> bool {
        let mut current = self.0.load(Ordering::Relaxed);
        while current >= amount {
            match self.0.compare_exchange_weak(
                current,
                current - amount,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(updated) => current = updated,
            }
        }
        false
    }

    /// Withdraws as much of `amount` as is available.
    ///
    /// # Returns
    ///
    /// The amount actually withdrawn, which is `amount` if the counter held enough,
    /// and the entire previous value otherwise.
    pub fn withdraw_up_to(&self, amount: u64) -> u64 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let taken = current.min(amount);
            match self.0.compare_exchange_weak(
                current,
                current - taken,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return taken,
                Err(updated) => current = updated,
            }
        }
    }

    /// Deposits the specified `amount` into the counter.
    pub fn deposit(&self, amount: u64) {
        self.0.fetch_add(amount, Ordering::Release);
    }

    /// Returns the counter value (most likely stale by the time it is observed by the caller).
    pub fn read(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_withdraw_success() {
        let counter = Counter::new(100);
        assert!(counter.withdraw(50));
        assert_eq!(counter.read(), 50);
    }

    #[test]
    fn test_withdraw_fail() {
        let counter = Counter::new(100);
        assert!(!counter.withdraw(150));
        assert_eq!(counter.read(), 100);
    }

    #[test]
    fn test_withdraw_exact() {
        let counter = Counter::new(100);
        assert!(counter.withdraw(100));
        assert_eq!(counter.read(), 0);
    }

    #[test]
    fn test_withdraw_up_to() {
        let counter = Counter::new(100);
        assert_eq!(counter.withdraw_up_to(30), 30);
        assert_eq!(counter.withdraw_up_to(100), 70);
        assert_eq!(counter.withdraw_up_to(5), 0);
        assert_eq!(counter.read(), 0);
    }

    #[test]
    fn test_deposit() {
        let counter = Counter::new(100);
        counter.deposit(50);
        counter.deposit(0);
        assert_eq!(counter.read(), 150);
    }

    #[test]
    fn test_concurrent_withdraw() {
        let counter = Arc::new(Counter::new(1000));
        let handles = (0..10)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        assert!(counter.withdraw(10));
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.read(), 0);
        assert!(!counter.withdraw(1));
    }
}
