//! # wdom-server
//!
//! Serves a small demo document: a counter that increments on click.

#![deny(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tracing::{info, warn};
use wdom_core::logging::init_subscriber;
use wdom_server::{Document, LiveServer};

#[tokio::main]
async fn main() -> Result<()> {
    let path = wdom_settings::settings_path();
    let settings = wdom_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics = match wdom_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let document = Arc::new(Document::new());
    build_demo(&document);

    let server = LiveServer::new(&settings, document, metrics);
    info!(settings = %path.display(), "starting wdom server");
    server.run().await.context("server failed")?;
    Ok(())
}

fn build_demo(document: &Document) {
    let counter = document.create_element_with_id("counter".into(), "button");
    counter.set_text_content("clicked 0 times");

    let clicks = AtomicU64::new(0);
    let target = Arc::downgrade(&counter);
    counter.add_event_listener("click", move |_| {
        let n = clicks.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(button) = target.upgrade() {
            button.set_text_content(&format!("clicked {n} times"));
        }
    });
}
