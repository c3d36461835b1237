use utoipa::OpenApi;

/// OpenAPI document for the storefront checkout API. Exported at
/// `/api-docs/openapi.json` and via the `openapi_export` binary target.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Checkout API",
        description = "Cart, payment intent, and order lifecycle service. \
            Callers are authenticated upstream; the proxy injects \
            `x-customer-id` and `x-role` headers."
    ),
    paths(
        crate::handlers::carts::add_item,
        crate::handlers::carts::get_cart,
        crate::handlers::checkout::create_intent,
        crate::handlers::checkout::create_direct_order,
        crate::handlers::checkout::payment_webhook,
        crate::handlers::orders::get_order,
        crate::handlers::orders::transition_status,
        crate::handlers::orders::bulk_transition_status,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::carts::AddItemRequest,
        crate::services::checkout::Address,
        crate::services::checkout::DirectOrderRequest,
        crate::services::checkout::CheckoutQuote,
        crate::services::discounts::DiscountQuote,
        crate::services::order_status::OrderStatus,
        crate::services::order_status::BulkTransitionResult,
        crate::handlers::carts::CartLineResponse,
        crate::handlers::carts::CartResponse,
        crate::handlers::checkout::CreateIntentRequest,
        crate::handlers::checkout::IntentResponse,
        crate::handlers::orders::OrderLineResponse,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::TransitionRequest,
        crate::handlers::orders::BulkTransitionRequest,
    )),
    tags(
        (name = "Cart", description = "Per-customer cart lines"),
        (name = "Checkout", description = "Payment intents and order creation"),
        (name = "Orders", description = "Order retrieval and status transitions")
    )
)]
pub struct ApiDoc;
