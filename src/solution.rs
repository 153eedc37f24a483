use num_traits::{AsPrimitive, FromPrimitive, NumAssign, PrimInt, Unsigned};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Debug, Display};

use crate::instance::AllocationInstance;

/// Index type for agent and item ids.
pub trait UnsignedInt:
    PrimInt
    + Unsigned
    + Display
    + Debug
    + AsPrimitive<usize>
    + AsPrimitive<f64>
    + FromPrimitive
    + NumAssign
{
}

impl<I> UnsignedInt for I where
    I: PrimInt
        + Unsigned
        + Display
        + Debug
        + AsPrimitive<usize>
        + AsPrimitive<f64>
        + FromPrimitive
        + NumAssign
{
}

/// Terminal state of a solve.
///
/// `Infeasible` and `Unbounded` are first-class results, not errors: the
/// caller is expected to branch on them. `Undefined` marks an interrupted
/// search or an internal numerical anomaly and never carries a usable
/// objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Undefined,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // reporting tooling matches on these exact words
        match self {
            SolveStatus::Optimal => write!(f, "Optimal"),
            SolveStatus::Infeasible => write!(f, "Infeasible"),
            SolveStatus::Unbounded => write!(f, "Unbounded"),
            SolveStatus::Undefined => write!(f, "Undefined"),
        }
    }
}

///
/// Solution of the budgeted allocation problem
///
/// The assignment is sparse: a missing `(agent, item)` pair means the bid was
/// not accepted. Accepted pairs map to 1.0 once integrality is enforced.
#[derive(Debug, Clone)]
pub struct AllocationSolution<I>
where
    I: UnsignedInt,
{
    pub status: SolveStatus,
    /// Sum of accepted bid values. Meaningful only when `status` is `Optimal`.
    pub objective: f64,
    /// Accepted `(agent, item)` pairs and their accepted value.
    pub assignment: BTreeMap<(I, I), f64>,
    /// Sum of all agent budgets, kept for consumption-ratio reporting.
    pub total_budget: f64,
    /// Number of branch-and-bound nodes expanded.
    pub nodes: u32,
    /// Objective of the root LP relaxation, an upper bound on `objective`.
    pub lp_relaxation: f64,
}

impl<I> AllocationSolution<I>
where
    I: UnsignedInt,
{
    /// Builds an `Optimal` solution from the raw variable vector of the
    /// search, keyed back to the original `(agent, item)` ids.
    ///
    /// Variables within `epsilon` of 1 are accepted; everything else is
    /// omitted. The objective is recomputed as the exact sum of accepted bid
    /// values so it cannot drift from the relaxation arithmetic.
    pub(crate) fn optimal(
        keys: &[(I, I)],
        values: &[f64],
        x: &[f64],
        epsilon: f64,
        total_budget: f64,
        nodes: u32,
        lp_relaxation: f64,
    ) -> AllocationSolution<I> {
        debug_assert!(keys.len() == values.len() && values.len() == x.len());
        let mut assignment = BTreeMap::new();
        let mut objective = 0.0;
        for (var, key) in keys.iter().enumerate() {
            if (x[var] - 1.0).abs() <= epsilon {
                assignment.insert(*key, 1.0);
                objective += values[var];
            }
        }
        AllocationSolution {
            status: SolveStatus::Optimal,
            objective,
            assignment,
            total_budget,
            nodes,
            lp_relaxation,
        }
    }

    /// Degenerate instance with no bids: trivially optimal, nothing assigned.
    pub(crate) fn trivial(total_budget: f64) -> AllocationSolution<I> {
        AllocationSolution {
            status: SolveStatus::Optimal,
            objective: 0.0,
            assignment: BTreeMap::new(),
            total_budget,
            nodes: 0,
            lp_relaxation: 0.0,
        }
    }

    /// Non-optimal outcome. Objective and assignment are left empty so a
    /// failed solve can never be mistaken for a usable one.
    pub(crate) fn failed(
        status: SolveStatus,
        total_budget: f64,
        nodes: u32,
    ) -> AllocationSolution<I> {
        AllocationSolution {
            status,
            objective: 0.0,
            assignment: BTreeMap::new(),
            total_budget,
            nodes,
            lp_relaxation: 0.0,
        }
    }

    /// Items assigned to one agent, in item order.
    pub fn items_of(&self, agent: I) -> Vec<I> {
        self.assignment
            .range((agent, I::zero())..=(agent, I::max_value()))
            .map(|(&(_, item), _)| item)
            .collect()
    }

    /// Budget consumed by one agent under this assignment.
    pub fn consumption_of(&self, instance: &AllocationInstance<I>, agent: I) -> f64 {
        self.items_of(agent)
            .iter()
            .map(|&item| instance.bid(agent, item).unwrap_or(0.0))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocationSolution, SolveStatus};

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(SolveStatus::Optimal.to_string(), "Optimal");
        assert_eq!(SolveStatus::Infeasible.to_string(), "Infeasible");
        assert_eq!(SolveStatus::Unbounded.to_string(), "Unbounded");
        assert_eq!(SolveStatus::Undefined.to_string(), "Undefined");
    }

    #[test]
    fn test_extraction_omits_rejected_bids() {
        let keys = [(0u32, 0u32), (0, 2), (1, 1)];
        let values = [4.0, 2.0, 5.0];
        let x = [1.0, 0.0, 1.0 - 1e-9];
        let solution = AllocationSolution::optimal(&keys, &values, &x, 1e-7, 20.0, 1, 9.0);
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.objective, 9.0);
        assert_eq!(solution.assignment.len(), 2);
        assert_eq!(solution.assignment.get(&(0, 0)), Some(&1.0));
        assert_eq!(solution.assignment.get(&(1, 1)), Some(&1.0));
        assert!(solution.assignment.get(&(0, 2)).is_none());
    }

    #[test]
    fn test_items_of_groups_by_agent() {
        let keys = [(0u32, 1u32), (0, 3), (1, 0)];
        let values = [1.0, 1.0, 1.0];
        let x = [1.0, 1.0, 1.0];
        let solution = AllocationSolution::optimal(&keys, &values, &x, 1e-7, 6.0, 1, 3.0);
        assert_eq!(solution.items_of(0), vec![1, 3]);
        assert_eq!(solution.items_of(1), vec![0]);
        assert!(solution.items_of(2).is_empty());
    }

    #[test]
    fn test_failed_solution_is_empty() {
        let solution: AllocationSolution<u32> =
            AllocationSolution::failed(SolveStatus::Undefined, 10.0, 42);
        assert_eq!(solution.objective, 0.0);
        assert!(solution.assignment.is_empty());
        assert_eq!(solution.nodes, 42);
    }
}
