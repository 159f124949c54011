//! # OpenAPI Specification Assembly
//!
//! Collects every utoipa-documented route into one OpenAPI document, served
//! at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "`{role}:{taxpayer_id}:{secret}` or `{secret}` (admin). \
                             The secret is the AUTH_TOKEN env var.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Revenue Stamp Management API",
        description = "Taxpayer registry, product catalogue, stamp orders, payments, \
                       stamp issuance and verification, and field-control inspections.\n\n\
                       Authentication: `Authorization: Bearer <token>`. The home route, \
                       self-registration, stamp verification and health checks are public."
    ),
    servers((url = "http://localhost:8080", description = "Local development server")),
    security(("bearer_auth" = [])),
    paths(
        // -- Public --
        crate::routes::home::home,
        crate::routes::home::register_form,
        crate::routes::stamps::verify_stamp,
        // -- Taxpayers --
        crate::routes::taxpayers::create_taxpayer,
        crate::routes::taxpayers::list_taxpayers,
        crate::routes::taxpayers::get_taxpayer,
        crate::routes::taxpayers::update_taxpayer,
        crate::routes::taxpayers::verify_taxpayer,
        crate::routes::taxpayers::reject_taxpayer,
        crate::routes::taxpayers::activate_taxpayer,
        crate::routes::taxpayers::suspend_taxpayer,
        crate::routes::taxpayers::resubmit_taxpayer,
        // -- Catalogue --
        crate::routes::catalogue::list_catalogue,
        crate::routes::catalogue::attach_product,
        crate::routes::catalogue::update_catalogue_entry,
        crate::routes::catalogue::detach_product,
        crate::routes::catalogue::set_catalogue_status,
        // -- Products and stamp types --
        crate::routes::products::create_product,
        crate::routes::products::list_products,
        crate::routes::products::get_product,
        crate::routes::products::update_product,
        crate::routes::stamp_types::create_stamp_type,
        crate::routes::stamp_types::list_stamp_types,
        crate::routes::stamp_types::get_stamp_type,
        // -- Orders --
        crate::routes::orders::create_order,
        crate::routes::orders::quote_order,
        crate::routes::orders::list_orders,
        crate::routes::orders::get_order,
        crate::routes::orders::list_order_stamps,
        crate::routes::orders::list_order_audit,
        crate::routes::orders::submit_order,
        crate::routes::orders::cancel_order,
        crate::routes::orders::create_payment_intent,
        crate::routes::orders::verify_order,
        crate::routes::orders::approve_order,
        crate::routes::orders::reject_order,
        crate::routes::orders::start_production,
        crate::routes::orders::mark_ready,
        crate::routes::orders::deliver_order,
        // -- Payments --
        crate::routes::payments::list_payments,
        crate::routes::payments::get_payment,
        crate::routes::payments::confirm_payment,
        // -- Stamps --
        crate::routes::stamps::get_stamp,
        crate::routes::stamps::activate_stamp,
        crate::routes::stamps::use_stamp,
        crate::routes::stamps::report_lost_stamp,
        crate::routes::stamps::void_stamp,
        // -- Inspections and reporting --
        crate::routes::field_controls::create_field_control,
        crate::routes::field_controls::list_field_controls,
        crate::routes::field_controls::get_field_control,
        crate::routes::dashboard::dashboard,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::records::StampKind,
        crate::routes::ActionRequest,
        crate::routes::taxpayers::RegisterTaxpayerRequest,
        crate::routes::taxpayers::UpdateTaxpayerRequest,
        crate::routes::catalogue::AttachProductRequest,
        crate::routes::catalogue::UpdateCatalogueEntryRequest,
        crate::routes::catalogue::CatalogueStatusRequest,
        crate::routes::products::CreateProductRequest,
        crate::routes::products::UpdateProductRequest,
        crate::routes::stamp_types::CreateStampTypeRequest,
        crate::routes::orders::CreateOrderRequest,
        crate::routes::orders::QuoteRequest,
        crate::routes::orders::PaymentIntentRequest,
        crate::routes::payments::ConfirmPaymentRequest,
        crate::routes::field_controls::CreateFieldControlRequest,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "public", description = "Unauthenticated entry points"),
        (name = "taxpayers", description = "Taxpayer registry and verification workflow"),
        (name = "catalogue", description = "Per-taxpayer product catalogue with certificates"),
        (name = "products", description = "Product administration"),
        (name = "stamp-types", description = "Stamp type administration"),
        (name = "orders", description = "Stamp order lifecycle, pricing and fulfilment"),
        (name = "payments", description = "Payment intents and confirmation"),
        (name = "stamps", description = "Issued stamps and their lifecycle"),
        (name = "field-controls", description = "Field inspections and compliance rates"),
        (name = "dashboard", description = "Aggregate counts for tax office staff"),
    )
)]
pub struct ApiDoc;

/// Serves the document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_order_actions_and_security_scheme() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Revenue Stamp Management API");
        assert!(spec.paths.paths.contains_key("/v1/orders/{id}/approve"));
        assert!(spec.paths.paths.contains_key("/v1/orders/{id}/audit"));
        assert!(spec.paths.paths.contains_key("/v1/stamps/verify/{serial}"));
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
