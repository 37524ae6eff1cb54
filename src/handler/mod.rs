pub mod chat;
pub mod deal;
pub mod tools;
