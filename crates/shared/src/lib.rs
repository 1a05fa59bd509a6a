//! Domain types shared by the discovery core, the link-layer integration and front ends.

pub mod domain;
pub mod error;
pub mod protocol;
