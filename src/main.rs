use std::{net::SocketAddr, sync::Arc};

use tokio::signal;
use tracing::{error, info};

use storefront_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    let (event_sender, event_rx) = api::events::channel();
    tokio::spawn(api::events::process_events(event_rx));

    let gateway = Arc::new(api::services::payments::HttpPaymentGateway::new(
        cfg.gateway_url.clone(),
        cfg.gateway_timeout(),
    )?);
    let catalog: Arc<dyn api::services::catalog::Catalog> = Arc::new(
        api::services::catalog::HttpCatalog::new(cfg.catalog_url.clone(), cfg.gateway_timeout())?,
    );
    let dispatcher = api::notifications::NotificationDispatcher::new(Arc::new(
        api::notifications::LogNotifier,
    ));

    let carts = api::services::carts::CartService::new(db.clone());
    let discounts = api::services::discounts::DiscountService::new(db.clone());
    let inventory = api::services::inventory::InventoryService::new(db.clone());
    let payments = api::services::payments::PaymentService::new(
        db.clone(),
        gateway,
        cfg.payment_webhook_secret.clone(),
        cfg.payment_webhook_tolerance_secs,
        event_sender.clone(),
    );
    let checkout = api::services::checkout::CheckoutService::new(
        db.clone(),
        carts.clone(),
        discounts,
        inventory,
        payments.clone(),
        catalog,
        event_sender.clone(),
        dispatcher.clone(),
        cfg.currency.clone(),
    );
    let order_status =
        api::services::order_status::OrderStatusService::new(db.clone(), event_sender.clone(), dispatcher);

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        services: api::handlers::AppServices {
            carts,
            checkout,
            payments,
            order_status,
        },
    };

    let app = api::app_router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c"),
        _ = terminate => info!("Received terminate signal"),
    }
}
