use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::execution::plan::ExecutionPlan;
use crate::execution::summary::ExecutionSummary;

/// Bounded, append-only log of executed plans. The oldest plan is evicted once
/// the capacity is reached; a capacity of zero retains nothing.
#[derive(Debug)]
pub struct ExecutionHistory {
    capacity: usize,
    plans: Mutex<VecDeque<ExecutionPlan>>,
}

impl ExecutionHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            plans: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Maximum retained plans.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a terminal plan, returning how many plans were evicted.
    pub fn push(&self, plan: ExecutionPlan) -> usize {
        if self.capacity == 0 {
            return 1;
        }
        let mut plans = self.plans.lock().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = 0;
        while plans.len() >= self.capacity {
            plans.pop_front();
            evicted += 1;
        }
        plans.push_back(plan);
        evicted
    }

    /// Summaries of up to `limit` plans starting `offset` plans after the
    /// oldest retained one.
    #[must_use]
    pub fn page(&self, limit: usize, offset: usize) -> Vec<ExecutionSummary> {
        self.plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .skip(offset)
            .take(limit)
            .map(ExecutionSummary::of)
            .collect()
    }

    /// Retained plan count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::execution::plan::{ExecutionStatus, PlanId};
    use crate::rule::JsonMap;

    fn plan(n: u64) -> ExecutionPlan {
        ExecutionPlan {
            plan_id: PlanId::generate(chrono::Utc::now(), n),
            scenario: format!("scenario {n}"),
            rules: Vec::new(),
            context: JsonMap::new(),
            results: Vec::new(),
            overall_status: ExecutionStatus::Completed,
            start_time: None,
            end_time: None,
        }
    }

    #[test]
    fn test_evicts_oldest() {
        let history = ExecutionHistory::new(3);
        for n in 0..3 {
            assert_eq!(history.push(plan(n)), 0);
        }
        assert_eq!(history.push(plan(3)), 1);
        let scenarios: Vec<_> = history.page(10, 0).into_iter().map(|s| s.scenario).collect();
        assert_eq!(scenarios, vec!["scenario 1", "scenario 2", "scenario 3"]);
    }

    #[test]
    fn test_page_bounds() {
        let history = ExecutionHistory::new(10);
        for n in 0..5 {
            history.push(plan(n));
        }
        let page = history.page(2, 1);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].scenario, "scenario 1");
        assert!(history.page(5, 9).is_empty());
        assert!(history.page(0, 0).is_empty());
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let history = ExecutionHistory::new(0);
        assert_eq!(history.push(plan(0)), 1);
        assert!(history.is_empty());
    }
}
