use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use ordered_float::OrderedFloat;
use tracing::{debug, trace};

use crate::formulation::Formulation;
use crate::instance::{AllocationInstance, ModelError};
use crate::simplex::{LpStatus, SimplexSolver};
use crate::solution::{AllocationSolution, SolveStatus, UnsignedInt};

/// One pending subproblem: the bound decisions taken so far, the objective of
/// its relaxation and the relaxed point itself.
struct Node {
    bound: OrderedFloat<f64>,
    x: Vec<f64>,
    fixes: Vec<(usize, u8)>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.bound == other.bound
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Node) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Node) -> Ordering {
        // BinaryHeap is a max-heap, so the best relaxation bound pops first
        self.bound.cmp(&other.bound)
    }
}

/// Exact 0/1 solver for budgeted allocation.
///
/// Drives the simplex engine through a best-bound-first search: the root
/// relaxation bounds the whole problem, fractional variables are branched on
/// the value closest to one half, and subproblems whose relaxation cannot
/// beat the incumbent are pruned.
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    simplex: SimplexSolver,
    epsilon: f64,
    max_nodes: u32,
    time_limit: Option<Duration>,
}

impl Default for BranchAndBound {
    fn default() -> BranchAndBound {
        BranchAndBound {
            simplex: SimplexSolver::new(),
            epsilon: 1e-7,
            max_nodes: 1_000_000,
            time_limit: None,
        }
    }
}

impl BranchAndBound {
    pub fn new() -> BranchAndBound {
        BranchAndBound::default()
    }

    pub fn with_simplex(mut self, simplex: SimplexSolver) -> BranchAndBound {
        self.simplex = simplex;
        self
    }

    /// Integrality tolerance: a variable within `epsilon` of 0 or 1 counts as
    /// integral.
    pub fn with_epsilon(mut self, epsilon: f64) -> BranchAndBound {
        self.epsilon = epsilon;
        self
    }

    /// Aborts the search with `Undefined` after this many expanded nodes.
    pub fn with_max_nodes(mut self, max_nodes: u32) -> BranchAndBound {
        self.max_nodes = max_nodes;
        self
    }

    /// Deadline checked between node expansions; an expired deadline aborts
    /// the search with `Undefined`.
    pub fn with_time_limit(mut self, time_limit: Duration) -> BranchAndBound {
        self.time_limit = Some(time_limit);
        self
    }

    /// Solves `instance` to proven 0/1 optimality.
    ///
    /// Infeasible and Unbounded propagate from the root relaxation; internal
    /// anomalies and exhausted node/time limits come back as `Undefined`.
    /// Never returns a fractional or NaN-valued optimum.
    pub fn solve<I: UnsignedInt>(&self, instance: &AllocationInstance<I>) -> AllocationSolution<I> {
        let total_budget = instance.total_budget();
        let formulation = match Formulation::from_instance(instance) {
            Ok(formulation) => formulation,
            Err(ModelError::EmptyInstance) => return AllocationSolution::trivial(total_budget),
            Err(_) => return AllocationSolution::failed(SolveStatus::Undefined, total_budget, 0),
        };
        let lp = &formulation.lp;
        let num_vars = lp.num_vars();
        let mut lower = vec![0.0; num_vars];
        let mut upper = vec![1.0; num_vars];

        let root = match self.simplex.solve(lp, &lower, &upper) {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!("root relaxation failed: {}", error);
                return AllocationSolution::failed(SolveStatus::Undefined, total_budget, 0);
            }
        };
        match root.status {
            LpStatus::Infeasible => {
                return AllocationSolution::failed(SolveStatus::Infeasible, total_budget, 0)
            }
            LpStatus::Unbounded => {
                return AllocationSolution::failed(SolveStatus::Unbounded, total_budget, 0)
            }
            LpStatus::Optimal => {}
        }
        if root.objective.is_nan() {
            return AllocationSolution::failed(SolveStatus::Undefined, total_budget, 0);
        }
        let root_bound = root.objective;

        let deadline = self.time_limit.map(|limit| Instant::now() + limit);
        let mut incumbent: Option<(f64, Vec<f64>)> = None;
        let mut nodes: u32 = 0;
        let mut queue = BinaryHeap::new();
        queue.push(Node {
            bound: OrderedFloat(root.objective),
            x: root.x,
            fixes: Vec::new(),
        });

        while let Some(node) = queue.pop() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    debug!("time limit hit after {} nodes", nodes);
                    return AllocationSolution::failed(SolveStatus::Undefined, total_budget, nodes);
                }
            }
            nodes += 1;
            if nodes > self.max_nodes {
                debug!("node limit of {} hit", self.max_nodes);
                return AllocationSolution::failed(SolveStatus::Undefined, total_budget, nodes);
            }
            if let Some((best, _)) = &incumbent {
                if node.bound.0 <= best + self.epsilon {
                    trace!("prune bound {} against incumbent {}", node.bound.0, best);
                    continue;
                }
            }

            let fractional = match self.fractional_variable(&node.x) {
                None => {
                    // relaxation is already integral: a new incumbent
                    let objective = node.bound.0;
                    if incumbent
                        .as_ref()
                        .map_or(true, |(best, _)| objective > *best)
                    {
                        debug!("incumbent {} after {} nodes", objective, nodes);
                        incumbent = Some((objective, node.x));
                    }
                    continue;
                }
                Some(var) => var,
            };

            trace!(
                "branch on {} = {} at bound {}",
                fractional,
                node.x[fractional],
                node.bound.0
            );
            for &value in &[0u8, 1u8] {
                let mut fixes = node.fixes.clone();
                fixes.push((fractional, value));
                for &(var, fix) in &fixes {
                    lower[var] = f64::from(fix);
                    upper[var] = f64::from(fix);
                }
                let outcome = self.simplex.solve(lp, &lower, &upper);
                for &(var, _) in &fixes {
                    lower[var] = 0.0;
                    upper[var] = 1.0;
                }
                match outcome {
                    Err(error) => {
                        debug!("subproblem relaxation failed: {}", error);
                        return AllocationSolution::failed(
                            SolveStatus::Undefined,
                            total_budget,
                            nodes,
                        );
                    }
                    Ok(relaxed) => match relaxed.status {
                        LpStatus::Infeasible => continue,
                        LpStatus::Unbounded => {
                            // bounds are finite here, so this cannot be real
                            return AllocationSolution::failed(
                                SolveStatus::Undefined,
                                total_budget,
                                nodes,
                            );
                        }
                        LpStatus::Optimal => {
                            if relaxed.objective.is_nan() {
                                return AllocationSolution::failed(
                                    SolveStatus::Undefined,
                                    total_budget,
                                    nodes,
                                );
                            }
                            let worth_exploring = incumbent
                                .as_ref()
                                .map_or(true, |(best, _)| relaxed.objective > best + self.epsilon);
                            if worth_exploring {
                                queue.push(Node {
                                    bound: OrderedFloat(relaxed.objective),
                                    x: relaxed.x,
                                    fixes,
                                });
                            }
                        }
                    },
                }
            }
        }

        match incumbent {
            Some((_, x)) => AllocationSolution::optimal(
                formulation.keys(),
                lp.objective(),
                &x,
                self.epsilon,
                total_budget,
                nodes,
                root_bound,
            ),
            // a feasible root always yields an integral leaf, so an empty
            // incumbent here is a numerical anomaly
            None => AllocationSolution::failed(SolveStatus::Undefined, total_budget, nodes),
        }
    }

    /// Fractional variable closest to one half; ties resolve to the lowest
    /// variable index, which is agent-major, item-minor order.
    fn fractional_variable(&self, x: &[f64]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (var, &value) in x.iter().enumerate() {
            if value > self.epsilon && value < 1.0 - self.epsilon {
                let distance = (value - 0.5).abs();
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((var, distance));
                }
            }
        }
        best.map(|(var, _)| var)
    }
}
