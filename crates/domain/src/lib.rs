pub mod connections;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod ports;
pub mod replay;
pub mod util;
pub mod views;

pub type DomainResult<T> = Result<T, error::DomainError>;
