//! # Eco MCMC
//!
//! A Rust library for **Bayesian ecological inference** on 2×2 tables with a **Gibbs sampler**.
//!
//! For each areal unit only the margins are observed: the share `X1` of the unit in the first
//! group and the overall rate `X2`. The unobserved group-specific rates `(W1, W2)` are tied to
//! the margins by `X2 = X1·W1 + (1 - X1)·W2`, and their logits are modeled as draws from a
//! bivariate normal population with a Normal-Inverse-Wishart prior. The sampler alternates
//! between
//!
//! 1. drawing each unit's `W` on its **tomography line** (exactly, on a fixed grid, or with a
//!    Metropolis step),
//! 2. drawing the missing coordinate of **homogeneous** units (`X1 = 0` or `X1 = 1`), and
//! 3. drawing the population `(mu, Sigma)` from its **conjugate posterior**.
//!
//! Fully observed **survey** units enter step 3 only.
//!
//! ## Getting Started
//!
//! ```bash
//! cargo add eco-mcmc
//! ```
//!
//! ## Example 1: A few regular units
//!
//! ```rust
//! use eco_mcmc::config::GibbsConfig;
//! use eco_mcmc::data::EcoData;
//! use eco_mcmc::gibbs::EcoGibbs;
//! use eco_mcmc::niw::Prior;
//!
//! // (X1, X2) per unit.
//! let data = EcoData::new(vec![[0.35, 0.6], [0.5, 0.5], [0.8, 0.3]]);
//!
//! // 2000 iterations, discard 500, keep every 5th.
//! let config = GibbsConfig::new(2_000, 500, 5).predict(true);
//!
//! let mut chain = EcoGibbs::new(data, Prior::default(), config)?.seed(42);
//! let output = chain.run()?;
//!
//! println!(
//!     "Collected {} draws × {} units × 2",
//!     output.w.shape()[0],
//!     output.w.shape()[1],
//! );
//! println!("Posterior mean of W: {:?}", output.mean_w());
//! # Ok::<(), eco_mcmc::error::EcoError>(())
//! ```
//!
//! ## Example 2: Homogeneous and survey units, flat buffers
//!
//! ```rust
//! use eco_mcmc::config::{DrawOrder, GibbsConfig};
//! use eco_mcmc::data::EcoData;
//! use eco_mcmc::gibbs::EcoGibbs;
//! use eco_mcmc::latent::LatentSamplerKind;
//! use eco_mcmc::linalg::Mat2;
//! use eco_mcmc::niw::Prior;
//!
//! // X1 column, then X2 column.
//! let x = [0.2, 0.6, 0.45, 0.5];
//! // W1 column, then W2 column.
//! let survey = [0.3, 0.7];
//! let data = EcoData::from_flat(&x, 2, &survey, 1, &[0.9], &[0.1])?;
//!
//! let prior = Prior::new([0.0, 0.0], 2.0, 4.0, Mat2::identity().scale(10.0))?;
//! let config = GibbsConfig::new(500, 100, 1)
//!     .latent_sampler(LatentSamplerKind::Metropolis)
//!     .draw_order(DrawOrder::PerUnitStreams)
//!     .seed(7);
//!
//! let flat = EcoGibbs::new(data, prior, config)?.run()?.to_flat();
//! // Two regular units and two homogeneous units are stored; the survey unit is not.
//! assert_eq!(flat.w1.len(), 400 * 4);
//! assert_eq!(flat.mu0.len(), 400);
//! # Ok::<(), eco_mcmc::error::EcoError>(())
//! ```
//!
//! ## Features
//! - **Exact grid draws** on each tomography line, stable for any population parameters
//! - **Metropolis** alternative for regular units, plus an R×C Metropolis step
//! - **Reproducible parallel** unit updates with per-unit random streams (`rayon`)
//! - **Progress Indicators** (`indicatif`) and logging through the `log` facade
//! - **Optional I/O** (CSV)

pub mod config;
pub mod core;
pub mod data;
pub mod distributions;
pub mod error;
pub mod gibbs;
pub mod io;
pub mod latent;
pub mod linalg;
pub mod metropolis_hastings;
pub mod niw;
pub mod output;
pub mod tomography;
