//! Domain models for the Retail Ledger platform

mod account;
mod business;
mod product;
mod receipt;
mod stock;
mod user;
mod voucher;

pub use account::*;
pub use business::*;
pub use product::*;
pub use receipt::*;
pub use stock::*;
pub use user::*;
pub use voucher::*;
