pub mod logging;
pub mod pointer;
pub mod rat;
pub mod rng;
