//! Route definitions for the Retail Ledger API

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::handlers::{account, auth, batch, health, product, receipt, report, staff, stock, voucher};
use crate::{middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .nest("/staff", staff_routes())
        .nest("/products", product_routes())
        .nest("/batches", batch_routes())
        .nest("/accounts", account_routes())
        .nest("/vouchers", voucher_routes())
        .nest("/stock", stock_routes())
        .nest("/receipts", receipt_routes())
        .nest("/reports", report_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check (public)
        .route("/health", get(health::health_check))
        // Auth routes (public)
        .nest("/auth", auth_routes())
        .merge(protected)
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
}

fn staff_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(staff::list_staff).post(staff::create_staff))
        .route(
            "/:user_id",
            get(staff::get_staff)
                .put(staff::update_staff)
                .delete(staff::delete_staff),
        )
        .route("/:user_id/password", put(staff::reset_password))
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(product::list_products).post(product::create_product))
        .route("/low-stock", get(product::low_stock))
        .route("/import", post(product::import_products))
        .route(
            "/:product_id",
            get(product::get_product)
                .put(product::update_product)
                .delete(product::delete_product),
        )
}

fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(batch::list_batches).post(batch::create_batch))
        .route("/expiring", get(batch::expiring_batches))
        .route(
            "/:batch_id",
            get(batch::get_batch)
                .put(batch::update_batch)
                .delete(batch::delete_batch),
        )
}

fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::list_accounts).post(account::create_account))
        .route(
            "/:account_id",
            get(account::get_account)
                .put(account::update_account)
                .delete(account::delete_account),
        )
        .route("/:account_id/statement", get(account::account_statement))
}

fn voucher_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(voucher::list_vouchers).post(voucher::create_voucher))
        .route("/next-number", get(voucher::next_number))
        .route(
            "/:voucher_id",
            get(voucher::get_voucher)
                .put(voucher::update_voucher)
                .delete(voucher::delete_voucher),
        )
}

fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/products/:product_id/ledger", get(stock::product_ledger))
        .route("/summary", get(stock::stock_summary))
        .route("/batches/summary", get(stock::batch_summary))
        .route("/reconcile", post(stock::reconcile))
}

fn receipt_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(receipt::list_receipts).post(receipt::create_receipt))
        .route(
            "/:receipt_id",
            get(receipt::get_receipt).delete(receipt::delete_receipt),
        )
}

fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/stock-summary", get(stock::stock_summary))
        .route("/batch-summary", get(stock::batch_summary))
        .route("/outstanding", get(report::outstanding))
        .route("/day-book", get(report::day_book))
}
