#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod aggregate;
pub mod causes;
pub mod check;
pub mod config;
pub mod engine;
pub mod indiv;
pub mod io;
pub mod normalize;
pub mod pipeline;
pub mod probbase;
pub mod types;
