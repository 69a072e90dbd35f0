// src/lookup/providers/mod.rs
pub mod fixture;

pub use fixture::FixtureProvider;
