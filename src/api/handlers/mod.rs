pub mod accounts;
pub mod audit;
pub mod health;
pub mod reputation;
pub mod sessions;
