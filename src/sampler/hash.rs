//! Collision detection for the stratified sampler's zero draws: a drawn
//! zero index must be rejected and re-drawn if it collides with any real
//! nonzero. Built on `hashbrown` instead of `std::collections::HashSet`.

use hashbrown::HashSet;

use crate::tensor::SparseTensor;

/// A lookup table of every nonzero coordinate in a [`SparseTensor`],
/// queried once per candidate zero draw.
pub struct NonzeroSet {
    coords: HashSet<Vec<usize>>,
}

impl NonzeroSet {
    pub fn build(x: &SparseTensor) -> Self {
        let mut coords = HashSet::with_capacity(x.nnz());
        for i in 0..x.nnz() {
            coords.insert(x.coord(i).to_vec());
        }
        Self { coords }
    }

    pub fn contains(&self, coord: &[usize]) -> bool {
        self.coords.contains(coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_nonzero() {
        let x = SparseTensor::new(vec![2, 2], vec![vec![0, 1]], vec![1.0]).unwrap();
        let set = NonzeroSet::build(&x);
        assert!(set.contains(&[0, 1]));
        assert!(!set.contains(&[1, 0]));
    }
}
