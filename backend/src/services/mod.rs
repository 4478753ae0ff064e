//! Business logic services for the Retail Ledger server

pub mod account;
pub mod auth;
pub mod batch;
pub mod ledger;
pub mod numbering;
pub mod product;
pub mod receipt;
pub mod report;
pub mod staff;
pub mod stock;
pub mod voucher;

pub use account::AccountService;
pub use auth::AuthService;
pub use batch::BatchService;
pub use ledger::LedgerService;
pub use numbering::NumberingService;
pub use product::ProductService;
pub use receipt::ReceiptService;
pub use report::ReportService;
pub use staff::StaffService;
pub use stock::StockService;
pub use voucher::VoucherService;
