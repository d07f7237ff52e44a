//! Secret-sharing based secure multi-party computation (MPC) over rings
//! `Z_2^k`.
//!
//! This crate implements the three protocol families that sit between a
//! numeric/tensor layer and the network transport of a ring-based MPC
//! engine:
//!
//! * **Share conversion** ([`conversion`]): 3-party replicated shares are
//!   converted between arithmetic (additive mod `2^k`) and boolean (XOR)
//!   form, including most-significant-bit extraction and ring-width casts.
//! * **Secure permutation** ([`permute`]): a private permutation (shared,
//!   or plaintext-known to one party) is applied to an additively shared
//!   vector using dealer-provided permutation correlations.
//! * **Authenticated Beaver triples** ([`beaver`]): an actively-secure
//!   TinyOT/SPDZ2k generator for MAC-authenticated random values, AND
//!   triples, multiplication triples, dot-product triples, random bits and
//!   truncation pairs, built on oblivious-transfer correlations and
//!   commit-then-open coin tossing.
//!
//! ## Parties and shares
//!
//! The conversion protocols are fixed to 3 parties holding replicated
//! shares (`(x_i, x_{i+1})` of `x = x_0 + x_1 + x_2`); the permutation and
//! triple-generation protocols work for any number of parties holding plain
//! additive shares. Share helpers live in [`share`], the ring abstraction
//! in [`ring`] with runtime width tags in [`field`].
//!
//! ## Security model
//!
//! The conversion and permutation protocols are semi-honest; the Beaver
//! generator is actively secure: every output is covered by SPDZ2k MACs and
//! every opening runs through batched MAC checks whose failure aborts the
//! session. Failed checks are never retried; a failed session must be torn
//! down and re-established from scratch.
//!
//! ## Basic usage
//!
//! Each party sets up a [`channel::Channel`] to its peers and drives its
//! side of a protocol to completion:
//!
//! ```ignore
//! use polyring::{beaver::Beaver, channel::SimpleChannel};
//!
//! # async fn example(mut channel: SimpleChannel) -> Result<(), Box<dyn std::error::Error>> {
//! // rank 0 of 3 parties, over Z_2^64
//! let mut beaver = Beaver::<u64>::setup(&mut channel, 0, 3).await?;
//! beaver.init_spdz_key(32);
//! let (triple, macs) = beaver.auth_mul(&mut channel, 1024, 32, 32).await?;
//! # Ok(())
//! # }
//! ```
//!
//! All protocol operations are synchronous rounds from the calling party's
//! perspective: sends and receives happen in a fixed, protocol-specified
//! order, and a context (PRG state, generator, dealer) must not be shared
//! by concurrently running operations.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod beaver;
pub mod boolean;
pub mod channel;
pub mod commit;
pub mod conversion;
pub mod dealer;
pub mod field;
pub mod ot;
pub mod permute;
pub mod prg;
pub mod ring;
pub mod share;
pub mod tinyot;

mod bits;
mod utils;
