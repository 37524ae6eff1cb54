pub mod chatmodels;
pub mod dealmodels;
pub mod productmodel;
pub mod usermodel;
