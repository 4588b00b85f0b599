//! Integration test crate for Reel.
//!
//! Runs whole transcodes against the in-memory backend and checks what
//! reached the encoder and the container, plus the resource ledger.

#[cfg(test)]
mod support;

#[cfg(test)]
mod transcode;

#[cfg(test)]
mod resources;

#[cfg(test)]
mod decode;
