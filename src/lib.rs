//! # gcp-kernels
//!
//! Numerical kernel layer for Generalized Canonical Polyadic (GCP) tensor
//! decomposition: MTTKRP (the four sparse variants plus dense and fused
//! multi-mode), factor-matrix Gramian/solve/scale operations, a
//! stochastic sampler, and the GCP-SGD driver built on top of them.
//!
//! ## Example
//!
//! ```ignore
//! use gcp_kernels::{config::AlgParams, gcp_sgd, ktensor::Ktensor, tensor::SparseTensor};
//!
//! let x = SparseTensor::new(dims, coords, values)?;
//! let u0 = Ktensor::zeros(x.dims(), rank);
//! let (u, report) = gcp_sgd::run(&x, u0, &AlgParams::default())?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod factor_matrix;
pub mod gcp_sgd;
pub mod io;
pub mod ktensor;
pub mod loss;
pub mod mttkrp;
pub mod sampler;
pub mod tensor;

pub use config::AlgParams;
pub use error::{GcpError, GcpResult};
pub use ktensor::Ktensor;
pub use loss::Loss;
pub use tensor::{DenseTensor, SparseTensor};
