use braid_core::config::ConsensusConfig;
use braid_core::types::Weight;
use braid_core::vertex::Vertex;
use braid_crypto::vertex_solution_weight;

/// `log2(2^a + 2^b)` without leaving log space.
///
/// Accumulated weights of old vertices grow far beyond what `f64` can hold
/// as `2^w`, so sums are done as `max + log2(1 + 2^(min - max))`.
pub fn sum_weights(a: Weight, b: Weight) -> Weight {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (1.0 + (lo - hi).exp2()).log2()
}

/// `log2(Σ 2^w)`; the empty sum is `-∞`.
pub fn sum_all<I: IntoIterator<Item = Weight>>(weights: I) -> Weight {
    weights.into_iter().fold(f64::NEG_INFINITY, sum_weights)
}

/// Weight arithmetic with the network's comparison tolerance.
#[derive(Debug, Clone, Copy)]
pub struct WeightModel {
    tol: f64,
}

impl WeightModel {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self { tol: config.weight_tol }
    }

    /// Weight proved by the vertex's proof-of-work solution.
    pub fn vertex_weight(&self, vertex: &Vertex) -> Weight {
        vertex_solution_weight(vertex)
    }

    pub fn eq(&self, a: Weight, b: Weight) -> bool {
        (a - b).abs() <= self.tol
    }

    pub fn gt(&self, a: Weight, b: Weight) -> bool {
        a - b > self.tol
    }

    pub fn lt(&self, a: Weight, b: Weight) -> bool {
        b - a > self.tol
    }

    pub fn ge(&self, a: Weight, b: Weight) -> bool {
        !self.lt(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_of_equal_weights_adds_one_bit() {
        assert!((sum_weights(10.0, 10.0) - 11.0).abs() < 1e-12);
        assert!((sum_weights(3.0, 1.0) - 10f64.log2()).abs() < 1e-12);
    }

    #[test]
    fn huge_weights_do_not_overflow() {
        let w = sum_weights(5000.0, 5000.0);
        assert!((w - 5001.0).abs() < 1e-9);
        assert_eq!(sum_weights(5000.0, 10.0), 5000.0);
    }

    #[test]
    fn empty_sum_is_identity() {
        assert_eq!(sum_all(std::iter::empty()), f64::NEG_INFINITY);
        assert_eq!(sum_all([7.0]), 7.0);
        assert_eq!(sum_weights(f64::NEG_INFINITY, 4.0), 4.0);
    }

    #[test]
    fn comparisons_absorb_rounding() {
        let m = WeightModel::new(&ConsensusConfig::default());
        let a = 0.1 + 0.2;
        assert!(m.eq(a, 0.3));
        assert!(!m.gt(a, 0.3));
        assert!(!m.lt(0.3, a));
        assert!(m.ge(0.3, a));
        assert!(m.gt(12.0, 10.0));
        assert!(m.lt(10.0, 12.0));
    }
}
