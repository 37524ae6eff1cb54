pub mod deal_service;
pub mod error;
pub mod presence_service;
pub mod review_aggregator;
pub mod stock_reservation;
