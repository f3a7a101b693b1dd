//! Memory budget accounting.
//!
//! A [`Budget`] is a fixed amount of bytes that growable buffers charge their
//! capacity against. Each consumer holds an [`Allocation`] that is adjusted as the
//! buffer grows or is trimmed, and returns its share to the budget when dropped.
//!
//! Unlike a plain allocator, a budget can be *overcommitted*: a consumer that must
//! make progress after a failed [`Allocation::grow`] calls
//! [`Allocation::grow_overcommit`], which takes whatever is left and records the
//! remainder as overdraft. The overdraft is visible through [`Budget::overdraft`], so
//! the owner can react (typically by flushing its in-memory state) instead of
//! failing.

use std::sync::Arc;

use counter::Counter;

pub mod counter;

/// Represents a budget that can be allocated from.
#[derive(Clone)]
pub struct Budget(Arc<BudgetNode>);

impl Budget {
    /// Creates a new budget with the given capacity.
    pub fn new(capacity: u64) -> Budget {
        Budget(Arc::new(BudgetNode {
            capacity,
            remaining: Counter::new(capacity),
            overdraft: Counter::new(0),
        }))
    }

    /// Creates a budget that never runs out in practice.
    pub fn unlimited() -> Budget {
        Budget::new(u64::MAX)
    }

    /// Total capacity this budget was created with.
    pub fn capacity(&self) -> u64 {
        self.0.capacity
    }

    /// Returns the remaining amount in this budget.
    ///
    /// **Note**: the returned value may be outdated if the budget is shared
    /// between threads.
    pub fn remaining(&self) -> u64 {
        self.0.remaining.read()
    }

    /// Amount currently granted to allocations, overdraft excluded.
    pub fn used(&self) -> u64 {
        self.0.capacity - self.remaining()
    }

    /// Amount used beyond the capacity by overcommitted allocations.
    pub fn overdraft(&self) -> u64 {
        self.0.overdraft.read()
    }

    /// Fraction of the capacity that is still available, in `[0, 1]`.
    pub fn available_fraction(&self) -> f64 {
        if self.0.capacity == 0 {
            return 0.0;
        }
        self.remaining() as f64 / self.0.capacity as f64
    }

    /// Attempts to allocate the specified amount from the budget.
    ///
    /// Returns an `Allocation` upon success, or an `AllocationError` if the budget
    /// lacks sufficient remaining funds. The allocated amount is returned to the
    /// `Budget` when the `Allocation` is dropped.
    pub fn allocate(&self, amount: u64) -> Result<Allocation, AllocationError> {
        if self.0.remaining.withdraw(amount) {
            Ok(Allocation {
                budget: self.0.clone(),
                amount,
                overdraft: 0,
            })
        } else {
            Err(AllocationError)
        }
    }

    /// Creates an empty allocation that can be grown later.
    pub fn empty_allocation(&self) -> Allocation {
        Allocation {
            budget: self.0.clone(),
            amount: 0,
            overdraft: 0,
        }
    }
}

impl std::fmt::Debug for Budget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Budget")
            .field("capacity", &self.capacity())
            .field("remaining", &self.remaining())
            .field("overdraft", &self.overdraft())
            .finish()
    }
}

/// Represents an allocation from a budget.
///
/// When the allocation is dropped, the allocated amount is returned to the budget
/// and its overdraft, if any, is cleared.
pub struct Allocation {
    budget: Arc<BudgetNode>,
    amount: u64,
    overdraft: u64,
}

impl Allocation {
    /// Currently allocated amount, overdraft included.
    pub fn amount(&self) -> u64 {
        self.amount + self.overdraft
    }

    /// Part of the allocated amount that was taken beyond the budget capacity.
    pub fn overdraft(&self) -> u64 {
        self.overdraft
    }

    pub fn is_overcommitted(&self) -> bool {
        self.overdraft != 0
    }

    /// Grows the allocation by the given amount.
    ///
    /// On failure the allocation is left unchanged.
    pub fn grow(&mut self, additional: u64) -> Result<(), AllocationError> {
        if self.budget.remaining.withdraw(additional) {
            self.amount += additional;
            Ok(())
        } else {
            Err(AllocationError)
        }
    }

    /// Grows the allocation by the given amount unconditionally.
    ///
    /// Takes what the budget still has and records the rest as overdraft.
    /// Returns the overdraft added by this call.
    pub fn grow_overcommit(&mut self, additional: u64) -> u64 {
        let granted = self.budget.remaining.withdraw_up_to(additional);
        let missing = additional - granted;
        self.amount += granted;
        if missing != 0 {
            self.overdraft += missing;
            self.budget.overdraft.deposit(missing);
        }
        missing
    }

    /// Shrinks the allocation to `amount`, settling overdraft first.
    pub fn shrink_to(&mut self, amount: u64) {
        let current = self.amount();
        if amount >= current {
            return;
        }
        let mut excess = current - amount;
        let settled = excess.min(self.overdraft);
        if settled != 0 {
            self.overdraft -= settled;
            self.budget.overdraft.withdraw_up_to(settled);
            excess -= settled;
        }
        if excess != 0 {
            self.amount -= excess;
            self.budget.remaining.deposit(excess);
        }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if self.amount != 0 {
            self.budget.remaining.deposit(self.amount);
        }
        if self.overdraft != 0 {
            self.budget.overdraft.withdraw_up_to(self.overdraft);
        }
    }
}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocation")
            .field("amount", &self.amount)
            .field("overdraft", &self.overdraft)
            .finish_non_exhaustive()
    }
}

/// An error that occurs when a budget allocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationError;

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Budget allocation error")
    }
}

impl std::error::Error for AllocationError {}

struct BudgetNode {
    capacity: u64,
    remaining: Counter,
    overdraft: Counter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_creation() {
        let budget = Budget::new(100);
        assert_eq!(budget.remaining(), 100);
        assert_eq!(budget.capacity(), 100);
        assert_eq!(budget.available_fraction(), 1.0);
    }

    #[test]
    fn test_allocate_success() {
        let budget = Budget::new(100);
        let allocation = budget.allocate(50).unwrap();
        assert_eq!(allocation.amount(), 50);
        assert_eq!(budget.remaining(), 50);
        assert_eq!(budget.used(), 50);
        assert_eq!(budget.available_fraction(), 0.5);
    }

    #[test]
    fn test_allocate_failure() {
        let budget = Budget::new(100);
        let result = budget.allocate(150);
        assert_eq!(result.unwrap_err(), AllocationError);
        assert_eq!(budget.remaining(), 100);
    }

    #[test]
    fn test_allocation_drop() {
        let budget = Budget::new(100);
        {
            let _allocation = budget.allocate(50).unwrap();
        }
        assert_eq!(budget.remaining(), 100);
    }

    #[test]
    fn test_allocation_grow_success() {
        let budget = Budget::new(100);
        let mut allocation = budget.empty_allocation();
        allocation.grow(20).unwrap();
        allocation.grow(30).unwrap();
        assert_eq!(allocation.amount(), 50);
        assert_eq!(budget.remaining(), 50);
    }

    #[test]
    fn test_allocation_grow_failure() {
        let budget = Budget::new(100);
        let mut allocation = budget.allocate(50).unwrap();
        let result = allocation.grow(60);
        assert_eq!(result, Err(AllocationError));
        assert_eq!(allocation.amount(), 50);
        assert_eq!(budget.remaining(), 50);
    }

    #[test]
    fn test_grow_overcommit() {
        let budget = Budget::new(100);
        let mut allocation = budget.allocate(80).unwrap();
        assert_eq!(allocation.grow_overcommit(50), 30);
        assert_eq!(allocation.amount(), 130);
        assert!(allocation.is_overcommitted());
        assert_eq!(budget.remaining(), 0);
        assert_eq!(budget.overdraft(), 30);
        assert_eq!(budget.available_fraction(), 0.0);
        drop(allocation);
        assert_eq!(budget.remaining(), 100);
        assert_eq!(budget.overdraft(), 0);
    }

    #[test]
    fn test_shrink_settles_overdraft_first() {
        let budget = Budget::new(100);
        let mut allocation = budget.allocate(90).unwrap();
        allocation.grow_overcommit(20);
        assert_eq!(allocation.overdraft(), 10);
        allocation.shrink_to(105);
        assert_eq!(allocation.overdraft(), 5);
        assert_eq!(budget.remaining(), 0);
        allocation.shrink_to(40);
        assert_eq!(allocation.overdraft(), 0);
        assert_eq!(allocation.amount(), 40);
        assert_eq!(budget.overdraft(), 0);
        assert_eq!(budget.remaining(), 60);
    }

    #[test]
    fn test_shrink_to_larger_is_noop() {
        let budget = Budget::new(100);
        let mut allocation = budget.allocate(10).unwrap();
        allocation.shrink_to(20);
        assert_eq!(allocation.amount(), 10);
        assert_eq!(budget.remaining(), 90);
    }

    #[test]
    fn test_zero_capacity() {
        let budget = Budget::new(0);
        assert_eq!(budget.available_fraction(), 0.0);
        assert!(budget.allocate(1).is_err());
        assert!(budget.allocate(0).is_ok());
    }
}
