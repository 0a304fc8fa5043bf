//! Sparse tensor storage: coordinate format plus the optional permutation
//! and row-pointer auxiliary indices used by the MTTKRP `Perm` variant.

use std::io::{BufRead, Write};

use crate::error::{GcpError, GcpResult};

/// An ordered sequence of nonzero coordinates and values, plus a mode-size
/// vector. Permutation/row-pointer indices are built on demand by
/// [`SparseTensor::fill_complete`] and are immutable afterward.
#[derive(Debug, Clone)]
pub struct SparseTensor {
    dims: Vec<usize>,
    /// `coords[i]` is the length-`ndims` coordinate of nonzero `i`.
    coords: Vec<Vec<usize>>,
    values: Vec<f64>,
    /// `perm[m][k]` = index (into `coords`/`values`) of the `k`-th nonzero
    /// when sorted by mode-`m` coordinate.
    perm: Option<Vec<Vec<usize>>>,
    /// `rowptr[m][i]..rowptr[m][i+1]` bounds the block of `perm[m]` whose
    /// mode-`m` coordinate equals `i`.
    rowptr: Option<Vec<Vec<usize>>>,
}

impl SparseTensor {
    /// Builds a sparse tensor from raw coordinate/value arrays. Out-of-range
    /// coordinates are rejected; duplicate coordinates are *not* rejected
    /// or merged.
    pub fn new(dims: Vec<usize>, coords: Vec<Vec<usize>>, values: Vec<f64>) -> GcpResult<Self> {
        if coords.len() != values.len() {
            return Err(GcpError::shape(
                "coordinate/value length mismatch",
                coords.len(),
                values.len(),
            ));
        }
        for coord in &coords {
            if coord.len() != dims.len() {
                return Err(GcpError::shape(
                    "coordinate rank mismatch",
                    dims.len(),
                    coord.len(),
                ));
            }
            for (mode, (&idx, &dim)) in coord.iter().zip(dims.iter()).enumerate() {
                if idx >= dim {
                    return Err(GcpError::CoordOutOfBounds {
                        mode,
                        index: idx,
                        dim,
                    });
                }
            }
        }
        Ok(Self {
            dims,
            coords,
            values,
            perm: None,
            rowptr: None,
        })
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn coord(&self, i: usize) -> &[usize] {
        &self.coords[i]
    }

    pub fn value(&self, i: usize) -> f64 {
        self.values[i]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn coords(&self) -> &[Vec<usize>] {
        &self.coords
    }

    pub fn norm_sq(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    pub fn norm(&self) -> f64 {
        self.norm_sq().sqrt()
    }

    /// Total number of elements the tensor would have if materialized
    /// densely, `prod(dims)`.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Builds the per-mode permutation arrays sorting nonzeros by their
    /// coordinate on that mode. Any stable sort suffices.
    pub fn create_permutation(&mut self) {
        let nnz = self.nnz();
        let mut perm = Vec::with_capacity(self.ndims());
        for m in 0..self.ndims() {
            let mut idx: Vec<usize> = (0..nnz).collect();
            idx.sort_by_key(|&i| self.coords[i][m]);
            perm.push(idx);
        }
        self.perm = Some(perm);
    }

    /// Builds the per-mode row-pointer arrays. Requires
    /// [`Self::create_permutation`] to have already run.
    pub fn create_row_ptr(&mut self) -> GcpResult<()> {
        let perm = self
            .perm
            .as_ref()
            .ok_or_else(|| GcpError::unsupported("create_row_ptr requires create_permutation"))?;
        let mut rowptr = Vec::with_capacity(self.ndims());
        for (m, perm_m) in perm.iter().enumerate() {
            let dim = self.dims[m];
            let mut ptr = vec![0usize; dim + 1];
            for &i in perm_m {
                ptr[self.coords[i][m] + 1] += 1;
            }
            for k in 0..dim {
                ptr[k + 1] += ptr[k];
            }
            rowptr.push(ptr);
        }
        self.rowptr = Some(rowptr);
        Ok(())
    }

    /// Transitions the tensor into its read-only, fully-indexed state:
    /// builds the permutation and row-pointer arrays for every mode. Does
    /// not deduplicate nonzeros.
    pub fn fill_complete(&mut self) {
        self.create_permutation();
        self.create_row_ptr()
            .expect("create_permutation just ran");
    }

    pub fn has_permutation(&self) -> bool {
        self.perm.is_some()
    }

    pub fn perm(&self, mode: usize) -> Option<&[usize]> {
        self.perm.as_ref().map(|p| p[mode].as_slice())
    }

    pub fn rowptr(&self, mode: usize) -> Option<&[usize]> {
        self.rowptr.as_ref().map(|p| p[mode].as_slice())
    }

    /// Writes the sparse text format.
    pub fn write_text<W: Write>(&self, mut w: W) -> GcpResult<()> {
        writeln!(w, "sptensor")?;
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
        writeln!(w, "{}", self.nnz())?;
        for (coord, value) in self.coords.iter().zip(self.values.iter()) {
            let coord_str = coord
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(w, "{coord_str} {value}")?;
        }
        Ok(())
    }

    /// Reads the sparse text format. `reader` must have already consumed
    /// the `sptensor` header line. `index_base` is subtracted from every
    /// subscript (0 or 1, per `--index-base`).
    pub fn read_text_body<R: BufRead>(mut r: R, index_base: usize) -> GcpResult<Self> {
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

        line.clear();
        r.read_line(&mut line)?;
        let nnz: usize = line
            .trim()
            .parse()
            .map_err(|_| GcpError::io("expected nnz count"))?;

        let mut coords = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        for _ in 0..nnz {
            line.clear();
            r.read_line(&mut line)?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != n + 1 {
                return Err(GcpError::io("malformed nonzero record"));
            }
            let coord: Vec<usize> = fields[..n]
                .iter()
                .map(|s| {
                    s.parse::<usize>()
                        .unwrap_or(0)
                        .saturating_sub(index_base)
                })
                .collect();
            let value: f64 = fields[n]
                .parse()
                .map_err(|_| GcpError::io("malformed nonzero value"))?;
            coords.push(coord);
            values.push(value);
        }
        Self::new(dims, coords, values)
    }
}
