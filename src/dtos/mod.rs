pub mod chatdtos;
pub mod dealdtos;
pub mod tooldtos;
