pub mod attachment;
pub mod audit;
pub mod reset_token;
pub mod ticket;
pub mod user;
