//! FFI infrastructure for talking to the native engine
//!
//! The native engine is reachable only through exported C symbols. This
//! module owns everything that crosses that boundary:
//! - locating and loading the engine library (`loader`)
//! - binding each exported symbol to its exact C signature (`binder`)
//! - marshaling values in both directions with strict single-owner rules
//!   (`marshal`)
//! - bridging the engine's log callback back into host code (`callbacks`)
//!
//! # Safety
//!
//! Every `unsafe` primitive the crate uses is defined here; call sites
//! elsewhere only combine them. The invariant they all uphold: a pointer
//! crossing the boundary has exactly one owner at every instant, is never
//! read after its owner freed it, and is never freed twice.

pub(crate) mod binder;
pub mod callbacks;
pub mod loader;
pub(crate) mod marshal;

#[cfg(test)]
pub(crate) mod stub;
