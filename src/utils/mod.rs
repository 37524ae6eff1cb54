pub mod decimal;
pub mod fair_price;
pub mod token;
