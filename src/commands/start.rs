use anyhow::Result;
use colored::Colorize;
use debug_hub::{
    config,
    core::{DebugCore, RequestDescriptor, RequestOutcome},
    server, DebugContext,
};
use serde_json::json;
use std::{path::Path, sync::Arc, time::Duration};
use tracing::info;

/// Execute the start command
///
/// This will:
/// 1. Load configuration
/// 2. Build the debug context
/// 3. Optionally spawn the demo workload
/// 4. Start the server (blocks until shutdown)
pub async fn execute(config_path: &Path, demo: bool) -> Result<()> {
    println!("{}", "Starting debug hub...".green());

    let cfg = config::load_config_from(config_path)?;
    let ctx = DebugContext::new(cfg);

    let workload = demo.then(|| {
        info!("Demo workload enabled");
        tokio::spawn(run_demo_workload(ctx.core.clone()))
    });

    let result = server::start_server(ctx).await;

    if let Some(handle) = workload {
        handle.abort();
    }

    result
}

const DEMO_COMPONENTS: [&str; 3] = ["checkout", "inventory", "search"];
const DEMO_ROUTES: [(&str, &str, u16); 4] = [
    ("GET", "/api/products", 200),
    ("POST", "/api/cart", 201),
    ("GET", "/api/products/missing", 404),
    ("POST", "/api/checkout", 500),
];

/// Feed the core a steady trickle of entries, timers and requests.
async fn run_demo_workload(core: Arc<DebugCore>) {
    let mut interval = tokio::time::interval(Duration::from_millis(750));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut tick: usize = 0;

    loop {
        interval.tick().await;
        tick = tick.wrapping_add(1);

        let component = DEMO_COMPONENTS[tick % DEMO_COMPONENTS.len()];
        match tick % 7 {
            0 => {
                core.warn(component, "Cache miss ratio above 40%", Some(json!({ "ratio": 0.42 })));
            }
            3 => {
                core.error(component, "Upstream call failed", Some(json!({ "attempt": tick % 3 + 1 })));
            }
            _ => {
                core.info(component, format!("Processed batch #{}", tick), None);
            }
        }

        let timer = core.start_timer(&format!("{}.batch", component), None);
        let (method, url, status_code) = DEMO_ROUTES[tick % DEMO_ROUTES.len()];
        let request = core.track_request(RequestDescriptor {
            method: method.to_string(),
            url: url.to_string(),
            remote_addr: Some("127.0.0.1:50000".to_string()),
        });

        tokio::time::sleep(Duration::from_millis(20 + (tick % 5) as u64 * 15)).await;

        // every eleventh timer is left open so the orphan sweep has work
        if tick % 11 != 0 {
            core.end_timer(&timer, None);
        }
        if let Some(id) = request {
            core.complete_request(
                &id,
                RequestOutcome {
                    status_code,
                    response_size: Some(256),
                },
            );
        }
    }
}
