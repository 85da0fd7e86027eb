//! A small sensor node serving readings over HTTP.
//!
//! ```text
//! cargo run --example sensor_server
//! curl http://127.0.0.1:8080/sensors/3
//! curl -X POST http://127.0.0.1:8080/sensors/3/calibrate -d '{"offset":0.5}'
//! curl http://127.0.0.1:8080/uptime
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use maple::{
    ActionResult, EmptyBodyBehavior, Handler, Lifecycle, ParamKind, RouteCatalog,
    Routes, Server, ServerConfig, StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Deserialize)]
struct Calibration {
    offset: f64,
}

#[derive(Debug, Serialize)]
struct Reading {
    sensor: i64,
    celsius: f64,
}

#[derive(Debug, Serialize)]
enum Health {
    Nominal,
}

struct Sensors;

impl Handler for Sensors {
    fn create() -> Self {
        Sensors
    }

    fn routes(routes: &mut Routes<Self>) {
        routes.get(None).to(|_sensors, _args| async {
            Ok(ActionResult::json(&[0, 1, 2, 3]))
        });

        routes
            .get("{id}")
            .param("id", ParamKind::Integer)
            .to(|_sensors, args| async move {
                let sensor: i64 = args.get("id")?;
                if !(0..4).contains(&sensor) {
                    return Ok(ActionResult::not_found());
                }
                Ok(ActionResult::json(&Reading {
                    sensor,
                    celsius: 20.0 + sensor as f64 * 0.25,
                }))
            });

        routes
            .post("{id}/calibrate")
            .param("id", ParamKind::Integer)
            .body::<Calibration>(EmptyBodyBehavior::Disallow)
            .to(|_sensors, mut args| async move {
                let sensor: i64 = args.get("id")?;
                let calibration: Calibration = args.body()?;
                tracing::info!(sensor, offset = calibration.offset, "calibrated");
                Ok(StatusCode::NoContent)
            });

        routes
            .get("/health")
            .to(|_sensors, _args| async { Ok(ActionResult::json(&Health::Nominal)) });
    }
}

struct Uptime {
    started: Instant,
    hits: AtomicU64,
}

impl Handler for Uptime {
    const LIFECYCLE: Lifecycle = Lifecycle::Shared;

    fn create() -> Self {
        Uptime {
            started: Instant::now(),
            hits: AtomicU64::new(0),
        }
    }

    fn routes(routes: &mut Routes<Self>) {
        routes.get(None).to(|uptime: Arc<Uptime>, _args| async move {
            let hits = uptime.hits.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(serde_json::json!({
                "seconds": uptime.started.elapsed().as_secs(),
                "hits": hits,
            }))
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut catalog = RouteCatalog::builder();
    catalog.register::<Sensors>()?.register::<Uptime>()?;

    let server = Server::with_config(&ServerConfig::default()).await?;
    let dispatcher = server.dispatcher(catalog.build());
    println!("Listening on http://{}", server.local_addr());
    server.serve(dispatcher).await?;
    Ok(())
}
