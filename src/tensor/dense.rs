//! Dense tensor storage: `dims` plus a contiguous row-major value array.

use std::io::{BufRead, Write};

use crate::error::{GcpError, GcpResult};

use super::{ind2sub, numel};

/// A dense N-dimensional array in row-major order (rightmost index fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTensor {
    dims: Vec<usize>,
    values: Vec<f64>,
}

impl DenseTensor {
    /// Builds a zero-filled tensor of the given shape.
    pub fn zeros(dims: Vec<usize>) -> Self {
        let n = numel(&dims);
        Self {
            dims,
            values: vec![0.0; n],
        }
    }

    /// Builds a tensor from an explicit row-major value buffer.
    pub fn from_values(dims: Vec<usize>, values: Vec<f64>) -> GcpResult<Self> {
        let expected = numel(&dims);
        if values.len() != expected {
            return Err(GcpError::shape(
                "dense tensor value buffer size mismatch",
                expected,
                values.len(),
            ));
        }
        Ok(Self { dims, values })
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn numel(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn get(&self, coord: &[usize]) -> f64 {
        self.values[super::sub2ind(&self.dims, coord)]
    }

    pub fn set(&mut self, coord: &[usize], value: f64) {
        let idx = super::sub2ind(&self.dims, coord);
        self.values[idx] = value;
    }

    /// Iterates `(coord, value)` pairs for every element, deriving the
    /// coordinate from the linear index via `ind2sub`, used by the dense
    /// MTTKRP path.
    pub fn iter_coords(&self) -> impl Iterator<Item = (Vec<usize>, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(lin, &v)| (ind2sub(&self.dims, lin), v))
    }

    pub fn frobenius_norm_sq(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// Writes the text format: a `tensor` header, `N`, `dims`, then
    /// `prod(dims)` values, one per line.
    pub fn write_text<W: Write>(&self, mut w: W) -> GcpResult<()> {
        writeln!(w, "tensor")?;
        writeln!(w, "{}", self.dims.len())?;
        writeln!(
            w,
            "{}",
            self.dims
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        )?;
        for v in &self.values {
            writeln!(w, "{v}")?;
        }
        Ok(())
    }

    /// Reads the text format. `reader` must have already consumed the
    /// `tensor` header line.
    pub fn read_text_body<R: BufRead>(mut r: R) -> GcpResult<Self> {
        let mut line = String::new();
        r.read_line(&mut line)?;
        let n: usize = line
            .trim()
            .parse()
            .map_err(|_| GcpError::io("expected dimension count"))?;

        line.clear();
        r.read_line(&mut line)?;
        let dims: Vec<usize> = line
            .split_whitespace()
            .map(|s| s.parse().unwrap_or(0))
            .collect();
        if dims.len() != n {
            return Err(GcpError::io("dims line does not match declared ndims"));
        }

        let total = numel(&dims);
        let mut values = Vec::with_capacity(total);
        for _ in 0..total {
            line.clear();
            r.read_line(&mut line)?;
            let v: f64 = line
                .trim()
                .parse()
                .map_err(|_| GcpError::io("malformed dense value"))?;
            values.push(v);
        }
        Self::from_values(dims, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_has_right_size() {
        let t = DenseTensor::zeros(vec![2, 3, 4]);
        assert_eq!(t.numel(), 24);
        assert!(t.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn get_set_roundtrip() {
        let mut t = DenseTensor::zeros(vec![2, 3]);
        t.set(&[1, 2], 5.0);
        assert_eq!(t.get(&[1, 2]), 5.0);
    }

    #[test]
    fn text_roundtrip() {
        let t = DenseTensor::from_values(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut buf = Vec::new();
        t.write_text(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "tensor");
        let rest: String = lines.collect::<Vec<_>>().join("\n") + "\n";
        let parsed = DenseTensor::read_text_body(rest.as_bytes()).unwrap();
        assert_eq!(parsed, t);
    }
}
