//! UCP Merchant Server
//!
//! Axum-based server exposing the checkout engine over both transport
//! bindings: the tool-call binding under `/tools` and the embedded checkout
//! protocol under `/embedded-checkout` (bootstrap, JSON-RPC WebSocket
//! channel, and UI-originated actions).

mod channel;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_core::{
    CapabilityRegistry, CheckoutService, CheckoutStore, ExtensionPipeline, MemoryCatalog,
    MockPaymentProcessor,
};
use checkout_extensions::{Ap2Extension, ConsentExtension, DiscountExtension, EcdsaSigner, MockSigner, Signer};
use checkout_tools::{register_checkout_tools, ToolRegistry};

use crate::channel::ChannelHub;
use crate::handlers::{
    call_tool, embedded_bootstrap, embedded_cancel, embedded_channel, embedded_complete,
    embedded_update, health_check, list_tools, ucp_discovery,
};
use crate::state::AppState;

/// Signer strategy is selected by configuration, never inferred at runtime
fn build_signer() -> anyhow::Result<Arc<dyn Signer>> {
    match std::env::var("AP2_SIGNER").as_deref() {
        Ok("ecdsa") => {
            let hex_key = std::env::var("AP2_SIGNING_KEY")
                .map_err(|_| anyhow::anyhow!("AP2_SIGNER=ecdsa requires AP2_SIGNING_KEY"))?;
            let bytes = hex::decode(hex_key.trim())?;
            let kid = std::env::var("AP2_KEY_ID").unwrap_or_else(|_| "merchant_key_1".into());
            tracing::info!(kid = %kid, "Using ECDSA merchant signer");
            Ok(Arc::new(EcdsaSigner::from_secret_bytes(&bytes, kid)?))
        }
        _ => {
            tracing::warn!("Using mock merchant signer - set AP2_SIGNER=ecdsa for real signatures");
            Ok(Arc::new(MockSigner::default()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Catalog and capability profile
    let catalog = Arc::new(MemoryCatalog::with_demo_products());
    let capabilities = Arc::new(CapabilityRegistry::with_all_capabilities());
    tracing::info!("Negotiated capabilities:");
    for name in capabilities.names() {
        tracing::info!("  • {}", name);
    }

    // Extension pipeline: consent and discounts pre-mutation, AP2 signing
    // post-mutation
    let signer = build_signer()?;
    let mut pipeline = ExtensionPipeline::new(capabilities.clone());
    pipeline.register(Arc::new(ConsentExtension));
    pipeline.register(Arc::new(DiscountExtension::with_demo_codes(catalog.clone())));
    pipeline.register(Arc::new(Ap2Extension::new(signer)));

    // Store and service
    let store = CheckoutStore::new(catalog, Arc::new(MockPaymentProcessor));
    let service = Arc::new(CheckoutService::new(store, pipeline));

    // Tool-call binding
    let mut tools = ToolRegistry::new();
    register_checkout_tools(&mut tools, service.clone());
    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    // Build application state
    let state = AppState {
        service,
        tools: Arc::new(tools),
        capabilities,
        channels: Arc::new(ChannelHub::new()),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health & discovery
        .route("/health", get(health_check))
        .route("/.well-known/ucp", get(ucp_discovery))

        // Tool-call binding
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(call_tool))

        // Embedded binding
        .route("/embedded-checkout/{checkout_id}", get(embedded_bootstrap))
        .route("/embedded-checkout/{checkout_id}/channel", get(embedded_channel))
        .route("/embedded-checkout/{checkout_id}/update", post(embedded_update))
        .route("/embedded-checkout/{checkout_id}/complete", post(embedded_complete))
        .route("/embedded-checkout/{checkout_id}/cancel", post(embedded_cancel))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:10999".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("UCP merchant server running on http://{}", addr);
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                                  - Health check");
    tracing::info!("  GET  /.well-known/ucp                         - Service discovery");
    tracing::info!("  GET  /tools                                   - Tool schemas");
    tracing::info!("  POST /tools/{{name}}                            - Invoke a checkout tool");
    tracing::info!("  GET  /embedded-checkout/{{id}}                  - Embedding bootstrap");
    tracing::info!("  GET  /embedded-checkout/{{id}}/channel          - JSON-RPC channel (WebSocket)");
    tracing::info!("  POST /embedded-checkout/{{id}}/update           - UI-originated update");
    tracing::info!("  POST /embedded-checkout/{{id}}/complete         - UI-originated completion");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
