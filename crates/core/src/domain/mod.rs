pub mod contract;
pub mod holdings;
pub mod recommendation;
pub mod stock;
pub mod user;
