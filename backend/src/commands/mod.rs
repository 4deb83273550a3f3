pub mod audit;
pub mod auth;
pub mod distribution;
pub mod health;
pub mod rsbsa;
pub mod utils;
