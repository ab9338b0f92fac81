//! Integration tests: full simulations over synthetic statement series.

mod fixtures;
mod simulation;
