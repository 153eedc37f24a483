use crate::instance::{AllocationInstance, ModelError};
use crate::solution::UnsignedInt;

/// A bounded linear program in the canonical form `max c'x, Ax <= b,
/// l <= x <= u`.
///
/// The constraint matrix is stored row-wise in compressed sparse form:
/// `row_starts` gives the start of each row's slice of `column_indices` /
/// `coefficients`, following the same flattened-index layout the bid store
/// uses.
#[derive(Debug, Clone)]
pub struct CanonicalLp {
    num_vars: usize,
    objective: Vec<f64>,
    row_starts: Vec<usize>,
    column_indices: Vec<usize>,
    coefficients: Vec<f64>,
    rhs: Vec<f64>,
}

impl CanonicalLp {
    pub fn new(num_vars: usize, objective: Vec<f64>) -> CanonicalLp {
        debug_assert!(objective.len() == num_vars);
        CanonicalLp {
            num_vars,
            objective,
            row_starts: vec![0],
            column_indices: Vec::new(),
            coefficients: Vec::new(),
            rhs: Vec::new(),
        }
    }

    /// Appends one `<=` constraint row given as parallel column/coefficient
    /// slices.
    pub fn add_row(&mut self, columns: &[usize], coefficients: &[f64], rhs: f64) {
        debug_assert!(columns.len() == coefficients.len());
        debug_assert!(columns.iter().all(|c| *c < self.num_vars));
        self.column_indices.extend_from_slice(columns);
        self.coefficients.extend_from_slice(coefficients);
        self.row_starts.push(self.column_indices.len());
        self.rhs.push(rhs);
    }

    #[inline]
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rhs.len()
    }

    #[inline]
    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    #[inline]
    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Sparse coefficients of row `row` as `(columns, coefficients)` slices.
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let start = self.row_starts[row];
        let stop = self.row_starts[row + 1];
        (
            &self.column_indices[start..stop],
            &self.coefficients[start..stop],
        )
    }
}

/// Canonical 0/1 program of a budgeted allocation instance together with the
/// table mapping decision variables back to `(agent, item)` pairs.
///
/// One variable per bid, in agent-major, item-minor order. Constraint rows
/// are emitted budgets first (one per agent holding at least one bid), then
/// item capacities (one per item appearing in at least one bid); rows that
/// would be empty are skipped.
#[derive(Debug, Clone)]
pub struct Formulation<I: UnsignedInt> {
    pub lp: CanonicalLp,
    keys: Vec<(I, I)>,
}

impl<I: UnsignedInt> Formulation<I> {
    pub fn from_instance(instance: &AllocationInstance<I>) -> Result<Formulation<I>, ModelError> {
        let num_bids = instance.num_bids();
        if num_bids == 0 {
            return Err(ModelError::EmptyInstance);
        }

        let mut keys = Vec::with_capacity(num_bids);
        let mut values = Vec::with_capacity(num_bids);
        for (agent, item, value) in instance.bids() {
            keys.push((agent, item));
            values.push(value);
        }

        // per-item variable lists, in variable (agent-major) order
        let num_items_usize: usize = instance.num_items().as_();
        let mut item_vars: Vec<Vec<usize>> = vec![Vec::new(); num_items_usize];
        for (var, (_, item)) in keys.iter().enumerate() {
            let item_usize: usize = (*item).as_();
            item_vars[item_usize].push(var);
        }

        let mut lp = CanonicalLp::new(num_bids, values.clone());

        // budget rows: sum of accepted bid values per agent, agent-major runs
        let mut var = 0;
        while var < keys.len() {
            let agent = keys[var].0;
            let start = var;
            while var < keys.len() && keys[var].0 == agent {
                var += 1;
            }
            let columns: Vec<usize> = (start..var).collect();
            lp.add_row(&columns, &values[start..var], instance.budget_of(agent));
        }

        // capacity rows: each item is assignable at most once
        for item in num_iter::range(I::zero(), instance.num_items()) {
            let item_usize: usize = item.as_();
            let columns = &item_vars[item_usize];
            if columns.is_empty() {
                continue;
            }
            let coefficients = vec![1.0; columns.len()];
            lp.add_row(columns, &coefficients, 1.0);
        }

        Ok(Formulation { lp, keys })
    }

    /// `(agent, item)` pair of each decision variable.
    #[inline]
    pub fn keys(&self) -> &[(I, I)] {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::Formulation;
    use crate::instance::{AllocationInstance, ModelError};

    fn two_by_two() -> AllocationInstance<u32> {
        let mut instance = AllocationInstance::new(2, 2, vec![10.0, 8.0]).unwrap();
        instance.add_bid(1, 0, 6.0).unwrap();
        instance.add_bid(0, 1, 2.0).unwrap();
        instance.add_bid(0, 0, 4.0).unwrap();
        instance
    }

    #[test]
    fn test_empty_instance_is_rejected() {
        let instance = AllocationInstance::<u32>::new(2, 2, vec![1.0, 1.0]).unwrap();
        assert!(matches!(
            Formulation::from_instance(&instance),
            Err(ModelError::EmptyInstance)
        ));
    }

    #[test]
    fn test_variables_are_agent_major() {
        let formulation = Formulation::from_instance(&two_by_two()).unwrap();
        assert_eq!(formulation.keys(), &[(0, 0), (0, 1), (1, 0)]);
        assert_eq!(formulation.lp.objective(), &[4.0, 2.0, 6.0]);
    }

    #[test]
    fn test_budget_then_capacity_rows() {
        let formulation = Formulation::from_instance(&two_by_two()).unwrap();
        let lp = &formulation.lp;
        assert_eq!(lp.num_rows(), 4);
        assert_eq!(lp.rhs(), &[10.0, 8.0, 1.0, 1.0]);

        let (columns, coefficients) = lp.row(0);
        assert_eq!(columns, &[0, 1]);
        assert_eq!(coefficients, &[4.0, 2.0]);

        let (columns, coefficients) = lp.row(1);
        assert_eq!(columns, &[2]);
        assert_eq!(coefficients, &[6.0]);

        // item 0 is wanted by both agents
        let (columns, coefficients) = lp.row(2);
        assert_eq!(columns, &[0, 2]);
        assert_eq!(coefficients, &[1.0, 1.0]);

        let (columns, _) = lp.row(3);
        assert_eq!(columns, &[1]);
    }

    #[test]
    fn test_unbid_items_get_no_row() {
        let mut instance = AllocationInstance::<u32>::new(1, 5, vec![10.0]).unwrap();
        instance.add_bid(0, 4, 1.0).unwrap();
        let formulation = Formulation::from_instance(&instance).unwrap();
        // one budget row, one capacity row for the single bid item
        assert_eq!(formulation.lp.num_rows(), 2);
        assert_eq!(formulation.lp.rhs(), &[10.0, 1.0]);
    }

    #[test]
    fn test_formulation_is_deterministic() {
        let first = Formulation::from_instance(&two_by_two()).unwrap();
        let second = Formulation::from_instance(&two_by_two()).unwrap();
        assert_eq!(first.keys(), second.keys());
        assert_eq!(first.lp.objective(), second.lp.objective());
        assert_eq!(first.lp.rhs(), second.lp.rhs());
    }
}
