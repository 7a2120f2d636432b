pub mod health;
pub mod stats;
