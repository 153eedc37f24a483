//! Exact solver for the maximum budgeted allocation problem.
//!
//! Agents bid on items, every item goes to at most one agent, and the bids an
//! agent wins may not exceed its budget. The crate formulates the problem as
//! a 0/1 program, solves the LP relaxation with a bounded-variable simplex
//! method and closes the integrality gap with best-bound-first
//! branch-and-bound, so the returned assignment is provably optimal.
//!
//! ```
//! use budgeted_allocation::{AllocationInstance, SolveStatus};
//!
//! # fn main() -> Result<(), budgeted_allocation::ModelError> {
//! let mut instance = AllocationInstance::<u32>::new(2, 3, vec![100.0, 200.0])?;
//! instance.add_bid(0, 0, 50.0)?;
//! instance.add_bid(0, 1, 60.0)?;
//! instance.add_bid(0, 2, 60.0)?;
//! instance.add_bid(1, 0, 90.0)?;
//! instance.add_bid(1, 1, 10.0)?;
//! instance.add_bid(1, 2, 20.0)?;
//!
//! let solution = instance.solve();
//! assert_eq!(solution.status, SolveStatus::Optimal);
//! assert_eq!(solution.objective, 170.0);
//! assert_eq!(solution.items_of(0), vec![1]);
//! assert_eq!(solution.items_of(1), vec![0, 2]);
//! # Ok(())
//! # }
//! ```

mod branch;
mod formulation;
mod instance;
mod simplex;
mod solution;

pub use crate::branch::BranchAndBound;
pub use crate::formulation::{CanonicalLp, Formulation};
pub use crate::instance::{AllocationInstance, ModelError};
pub use crate::simplex::{LpOutcome, LpStatus, SimplexSolver};
pub use crate::solution::{AllocationSolution, SolveStatus, UnsignedInt};
