pub mod chatdb;
pub mod db;
pub mod dealdb;
pub mod productdb;
pub mod userdb;
