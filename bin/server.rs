// Cap Table Ledger - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use captable_ledger::{api, logging, AppConfig, Ledger, LogTarget};
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.log_filter, LogTarget::Stderr)?;

    println!("🌐 Cap Table Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Open database
    let ledger = Ledger::open(&config.database_path, &config.actor)?;
    println!("✓ Database opened: {:?}", config.database_path);

    let chain = ledger.verify_audit_chain()?;
    if !chain.valid {
        tracing::warn!(
            first_broken = ?chain.first_broken,
            "audit chain does not verify; serving anyway"
        );
    }

    let app = api::router(Arc::new(ledger));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, actor = %config.actor, "listening");
    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/transactions", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
