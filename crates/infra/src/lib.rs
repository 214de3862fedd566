pub mod config;
pub mod db;
pub mod logging;
pub mod replay;
pub mod repositories;
