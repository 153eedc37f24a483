use std::collections::BTreeMap;
use thiserror::Error;

use crate::branch::BranchAndBound;
use crate::solution::{AllocationSolution, UnsignedInt};

/// Construction-time failures of the problem model.
///
/// These are caller programming errors and fail fast; they are distinct from
/// the solver statuses, which are ordinary results.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("invalid instance: {reason}")]
    InvalidInstance { reason: String },
    #[error("{kind} id {id} is outside [0, {limit})")]
    OutOfRange {
        kind: &'static str,
        id: usize,
        limit: usize,
    },
    #[error("bid value {value} is not a non-negative finite number")]
    InvalidBid { value: f64 },
    #[error("instance has no bids to formulate")]
    EmptyInstance,
}

/// An instance of the maximum budgeted allocation problem
///
/// Holds agents with spending budgets, items, and sparse bids. Bids are keyed
/// by `(agent, item)` and kept in agent-major, item-minor order so every
/// downstream traversal is deterministic.
#[derive(Debug, Clone)]
pub struct AllocationInstance<I: UnsignedInt> {
    num_agents: I,
    num_items: I,
    budgets: Vec<f64>,
    bids: BTreeMap<(I, I), f64>,
}

impl<I: UnsignedInt> AllocationInstance<I> {
    /// Creates an instance with `num_agents` agents, `num_items` items and one
    /// budget per agent.
    pub fn new(num_agents: I, num_items: I, budgets: Vec<f64>) -> Result<Self, ModelError> {
        if num_agents.is_zero() {
            return Err(ModelError::InvalidInstance {
                reason: "number of agents must be positive".to_string(),
            });
        }
        if num_items.is_zero() {
            return Err(ModelError::InvalidInstance {
                reason: "number of items must be positive".to_string(),
            });
        }
        let num_agents_usize: usize = num_agents.as_();
        if budgets.len() != num_agents_usize {
            return Err(ModelError::InvalidInstance {
                reason: format!(
                    "expected {} budgets, got {}",
                    num_agents_usize,
                    budgets.len()
                ),
            });
        }
        if let Some(bad) = budgets.iter().find(|b| !(**b >= 0.0) || !b.is_finite()) {
            return Err(ModelError::InvalidInstance {
                reason: format!("budget {} is not a non-negative finite number", bad),
            });
        }
        Ok(AllocationInstance {
            num_agents,
            num_items,
            budgets,
            bids: BTreeMap::new(),
        })
    }

    /// Records that `agent` may receive `item` at accepted value `value`.
    ///
    /// Re-adding an existing `(agent, item)` pair silently overwrites the
    /// previous value (last write wins).
    pub fn add_bid(&mut self, agent: I, item: I, value: f64) -> Result<(), ModelError> {
        if agent >= self.num_agents {
            return Err(ModelError::OutOfRange {
                kind: "agent",
                id: agent.as_(),
                limit: self.num_agents.as_(),
            });
        }
        if item >= self.num_items {
            return Err(ModelError::OutOfRange {
                kind: "item",
                id: item.as_(),
                limit: self.num_items.as_(),
            });
        }
        if !(value >= 0.0) || !value.is_finite() {
            return Err(ModelError::InvalidBid { value });
        }
        self.bids.insert((agent, item), value);
        Ok(())
    }

    /// Solves the instance to proven 0/1 optimality with default settings.
    pub fn solve(&self) -> AllocationSolution<I> {
        BranchAndBound::new().solve(self)
    }

    #[inline]
    pub fn num_agents(&self) -> I {
        self.num_agents
    }

    #[inline]
    pub fn num_items(&self) -> I {
        self.num_items
    }

    #[inline]
    pub fn num_bids(&self) -> usize {
        self.bids.len()
    }

    #[inline]
    pub fn budgets(&self) -> &[f64] {
        &self.budgets
    }

    #[inline]
    pub fn budget_of(&self, agent: I) -> f64 {
        let agent_usize: usize = agent.as_();
        self.budgets[agent_usize]
    }

    /// Sum of all agent budgets.
    pub fn total_budget(&self) -> f64 {
        self.budgets.iter().sum()
    }

    /// Bid recorded for `(agent, item)`, if any.
    pub fn bid(&self, agent: I, item: I) -> Option<f64> {
        self.bids.get(&(agent, item)).copied()
    }

    /// All bids in agent-major, item-minor order.
    pub fn bids(&self) -> impl Iterator<Item = (I, I, f64)> + '_ {
        self.bids.iter().map(|(&(agent, item), &value)| (agent, item, value))
    }

    /// Agent ids in order.
    pub fn agents(&self) -> impl Iterator<Item = I> {
        num_iter::range(I::zero(), self.num_agents)
    }

    /// Item ids in order.
    pub fn items(&self) -> impl Iterator<Item = I> {
        num_iter::range(I::zero(), self.num_items)
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocationInstance, ModelError};

    #[test]
    fn test_rejects_empty_dimensions() {
        assert!(matches!(
            AllocationInstance::<u32>::new(0, 3, vec![]),
            Err(ModelError::InvalidInstance { .. })
        ));
        assert!(matches!(
            AllocationInstance::<u32>::new(2, 0, vec![1.0, 1.0]),
            Err(ModelError::InvalidInstance { .. })
        ));
    }

    #[test]
    fn test_rejects_budget_mismatch() {
        assert!(matches!(
            AllocationInstance::<u32>::new(3, 3, vec![1.0, 2.0]),
            Err(ModelError::InvalidInstance { .. })
        ));
        assert!(matches!(
            AllocationInstance::<u32>::new(2, 3, vec![1.0, -2.0]),
            Err(ModelError::InvalidInstance { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_ids() {
        let mut instance = AllocationInstance::<u32>::new(2, 3, vec![5.0, 5.0]).unwrap();
        assert_eq!(
            instance.add_bid(2, 0, 1.0),
            Err(ModelError::OutOfRange {
                kind: "agent",
                id: 2,
                limit: 2
            })
        );
        assert_eq!(
            instance.add_bid(0, 3, 1.0),
            Err(ModelError::OutOfRange {
                kind: "item",
                id: 3,
                limit: 3
            })
        );
    }

    #[test]
    fn test_rejects_negative_and_nan_bids() {
        let mut instance = AllocationInstance::<u32>::new(1, 1, vec![5.0]).unwrap();
        assert!(matches!(
            instance.add_bid(0, 0, -1.0),
            Err(ModelError::InvalidBid { .. })
        ));
        assert!(matches!(
            instance.add_bid(0, 0, f64::NAN),
            Err(ModelError::InvalidBid { .. })
        ));
        assert!(instance.add_bid(0, 0, 0.0).is_ok());
    }

    #[test]
    fn test_readding_a_pair_overwrites() {
        let mut instance = AllocationInstance::<u32>::new(1, 2, vec![5.0]).unwrap();
        instance.add_bid(0, 1, 2.0).unwrap();
        instance.add_bid(0, 1, 3.0).unwrap();
        assert_eq!(instance.num_bids(), 1);
        assert_eq!(instance.bid(0, 1), Some(3.0));
    }

    #[test]
    fn test_bids_iterate_agent_major() {
        let mut instance = AllocationInstance::<u32>::new(2, 3, vec![5.0, 5.0]).unwrap();
        instance.add_bid(1, 0, 1.0).unwrap();
        instance.add_bid(0, 2, 2.0).unwrap();
        instance.add_bid(0, 1, 3.0).unwrap();
        let order: Vec<(u32, u32)> = instance.bids().map(|(a, i, _)| (a, i)).collect();
        assert_eq!(order, vec![(0, 1), (0, 2), (1, 0)]);
    }

    #[test]
    fn test_total_budget() {
        let instance = AllocationInstance::<u32>::new(3, 1, vec![1.5, 2.0, 0.5]).unwrap();
        assert_eq!(instance.total_budget(), 4.0);
    }
}
