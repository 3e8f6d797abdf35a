//! Ports - Trait definitions for the collaborators a session depends on.

pub mod encoder;
pub mod ladder;
pub mod prober;
