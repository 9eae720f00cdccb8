//! Exact inference by variable elimination in log space.
//!
//! Only components whose induced width under a min-degree elimination order
//! stays within a configured bound are accepted; wider components are
//! rejected with [`SolveError::TooWide`] and the caller samples instead.
//! Probabilities are computed as ratios of conditioned partition functions.

use std::collections::BTreeSet;

use crate::error::SolveError;
use crate::mrf::Problem;

/// A log-space table over a sorted set of local atoms. Bit `i` of a table
/// index is the value of `vars[i]`.
#[derive(Debug, Clone)]
struct Factor {
    vars: Vec<usize>,
    table: Vec<f64>,
}

impl Factor {
    fn value(&self, assignment: &dyn Fn(usize) -> bool) -> f64 {
        let index = self
            .vars
            .iter()
            .enumerate()
            .filter(|(_, v)| assignment(**v))
            .fold(0usize, |acc, (bit, _)| acc | (1 << bit));
        self.table[index]
    }
}

fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let hi = a.max(b);
    hi + ((a - hi).exp() + (b - hi).exp()).ln()
}

/// Multiply `factors` and sum out `var`.
fn eliminate(var: usize, factors: &[Factor]) -> Factor {
    let scope: BTreeSet<usize> = factors
        .iter()
        .flat_map(|f| f.vars.iter().copied())
        .filter(|v| *v != var)
        .collect();
    let vars: Vec<usize> = scope.into_iter().collect();
    let mut table = vec![f64::NEG_INFINITY; 1 << vars.len()];
    for (index, slot) in table.iter_mut().enumerate() {
        for value in [false, true] {
            let assignment = |v: usize| {
                if v == var {
                    value
                } else {
                    let bit = vars.iter().position(|x| *x == v).unwrap_or(0);
                    index & (1 << bit) != 0
                }
            };
            let product: f64 = factors.iter().map(|f| f.value(&assignment)).sum();
            *slot = log_add(*slot, product);
        }
    }
    Factor { vars, table }
}

/// Min-degree elimination order and its induced width.
fn min_degree_order(problem: &Problem) -> (Vec<usize>, usize) {
    let n = problem.atom_count();
    let mut neighbours: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for clause in &problem.clauses {
        for a in &clause.lits {
            for b in &clause.lits {
                if a.atom != b.atom {
                    neighbours[a.atom as usize].insert(b.atom as usize);
                }
            }
        }
    }

    let mut eliminated = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut width = 0;
    for _ in 0..n {
        let Some(next) = (0..n)
            .filter(|v| !eliminated[*v])
            .min_by_key(|v| (neighbours[*v].len(), *v))
        else {
            break;
        };
        let adjacent: Vec<usize> = neighbours[next].iter().copied().collect();
        width = width.max(adjacent.len());
        for &a in &adjacent {
            neighbours[a].remove(&next);
            for &b in &adjacent {
                if a != b {
                    neighbours[a].insert(b);
                }
            }
        }
        eliminated[next] = true;
        order.push(next);
    }
    (order, width)
}

/// Variable elimination over one component.
#[derive(Debug)]
pub struct ExactInference<'p> {
    problem: &'p Problem,
    order: Vec<usize>,
    width: usize,
    log_z: f64,
}

impl<'p> ExactInference<'p> {
    /// Prepare elimination, rejecting components wider than `max_width`.
    pub fn new(problem: &'p Problem, max_width: usize, component: usize) -> Result<Self, SolveError> {
        let (order, width) = min_degree_order(problem);
        if width > max_width {
            return Err(SolveError::TooWide {
                component,
                width,
                max: max_width,
            });
        }
        let mut exact = Self {
            problem,
            order,
            width,
            log_z: 0.0,
        };
        exact.log_z = exact.log_partition(&[]);
        if exact.log_z == f64::NEG_INFINITY {
            return Err(SolveError::HardUnsatisfiable { component });
        }
        Ok(exact)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Log of the unnormalised mass of all worlds agreeing with `evidence`.
    pub fn log_partition(&self, evidence: &[(usize, bool)]) -> f64 {
        let mut factors: Vec<Factor> = self
            .problem
            .clauses
            .iter()
            .map(|clause| {
                let vars: Vec<usize> = clause
                    .lits
                    .iter()
                    .map(|l| l.atom as usize)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let penalty = if clause.hard {
                    f64::NEG_INFINITY
                } else {
                    -clause.weight
                };
                let mut values = vec![false; self.problem.atom_count()];
                let table = (0..1usize << vars.len())
                    .map(|index| {
                        for (bit, v) in vars.iter().enumerate() {
                            values[*v] = index & (1 << bit) != 0;
                        }
                        if clause.is_bad(&values) {
                            penalty
                        } else {
                            0.0
                        }
                    })
                    .collect();
                Factor { vars, table }
            })
            .collect();
        for &(atom, value) in evidence {
            factors.push(Factor {
                vars: vec![atom],
                table: if value {
                    vec![f64::NEG_INFINITY, 0.0]
                } else {
                    vec![0.0, f64::NEG_INFINITY]
                },
            });
        }

        for &var in &self.order {
            let (touching, rest): (Vec<Factor>, Vec<Factor>) =
                factors.into_iter().partition(|f| f.vars.contains(&var));
            factors = rest;
            factors.push(eliminate(var, &touching));
        }
        // Every atom is eliminated, so only scalars are left.
        factors.iter().map(|f| f.table[0]).sum()
    }

    /// Probability that each atom is true.
    pub fn atom_marginals(&self) -> Vec<f64> {
        (0..self.problem.atom_count())
            .map(|atom| (self.log_partition(&[(atom, true)]) - self.log_z).exp())
            .collect()
    }

    /// Probability that each clause of the problem is satisfied.
    pub fn clause_satisfaction(&self) -> Vec<f64> {
        self.problem
            .clauses
            .iter()
            .map(|clause| {
                let falsifying: Vec<(usize, bool)> = clause
                    .lits
                    .iter()
                    .map(|l| (l.atom as usize, !l.positive))
                    .collect();
                1.0 - (self.log_partition(&falsifying) - self.log_z).exp()
            })
            .collect()
    }
}
