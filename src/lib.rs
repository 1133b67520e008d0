//! Secure multi-party computation of arithmetic circuits, following the protocol of Ben-Or,
//! Goldwasser and Wigderson (BGW).
//!
//! `n` parties jointly evaluate a [`circuit::Circuit`] over a prime field `Z_p`. Every input
//! is split into Shamir shares, gates are evaluated on shares, and only the outputs are
//! reconstructed, each one by the parties that are allowed to learn it.
//!
//! Two adversary models are supported:
//!
//! - **Semi-honest**: all parties follow the protocol, up to `t < n / 2` of them may try to
//!   learn more than they should. Multiplications are followed by a GRR degree reduction
//!   (re-share, then recombine).
//! - **Byzantine**: up to `t < n / 4` parties may deviate arbitrarily. Inputs are shared with a
//!   bivariate verifiable secret sharing, products are re-shared verifiably, cheaters are
//!   located by Reed-Solomon decoding and excluded, and outputs are error-corrected.
//!
//! ## Main Components
//!
//! * [`field`], [`polynomial`], [`matrix`]: arithmetic over `Z_p`.
//! * [`sharing`]: Shamir shares, bivariate shares and recombination.
//! * [`decoder`]: the Welch-Berlekamp decoder used to correct shares of cheaters.
//! * [`circuit`]: arithmetic circuits and a builder for them.
//! * [`protocol`]: the [`protocol::mpc`] function which executes the protocol for a single
//!   party, and [`protocol::simulate_mpc`] for running all parties in one process.
//! * [`channel`], [`bulletin`]: point-to-point messaging and echo-verified public rounds.
//! * [`config`]: the settings of a protocol session.
//!
//! ## Example
//!
//! ```
//! use bgw_mpc::{
//!     circuit::CircuitBuilder, config::SessionConfig, field::Zp, protocol::simulate_mpc,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let prime = 61;
//! let mut b = CircuitBuilder::new(prime, ["x", "y"]);
//! let x = b.input(0)?;
//! let y = b.input(1)?;
//! let xy = b.mul(x, y)?;
//! b.output(xy)?;
//! let circuit = b.build()?;
//!
//! // parties 0 and 1 provide the inputs, party 2 only helps, everyone learns the product
//! let inputs = [Some(Zp::new(prime, 3)), Some(Zp::new(prime, 4)), None];
//! let results = simulate_mpc(&circuit, &inputs, &[vec![0, 1, 2]], &SessionConfig::default())?;
//! for result in results {
//!     assert_eq!(result?, vec![Some(Zp::new(prime, 12))]);
//! }
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bulletin;
pub mod channel;
pub mod circuit;
pub mod config;
pub mod decoder;
pub mod field;
pub mod matrix;
pub mod polynomial;
pub mod protocol;
pub mod sharing;
