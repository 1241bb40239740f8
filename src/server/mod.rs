pub mod appstate;
#[cfg(feature = "server-banner")]
pub mod banner;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use axum::Router;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info_span, Span};

use crate::core::Core;
use crate::error::ApiResult;
use crate::radio::{RadioDriver, RadioEvent};
use crate::rules_engine::action::RecordingExecutor;
use crate::server::appstate::AppState;

fn trace_layer_on_response(response: &Response<Body>, latency: Duration, span: &Span) {
    span.record(
        "latency",
        tracing::field::display(format!("{}μs", latency.as_micros())),
    );
    span.record("status", tracing::field::display(response.status()));
}

#[must_use]
pub fn router(appstate: AppState) -> Router<()> {
    Router::new()
        .nest("/api/:apikey", crate::routes::router())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    info_span!(
                        "http",
                        method = ?request.method(),
                        uri = ?request.uri(),
                        status = tracing::field::Empty,
                    )
                })
                .on_response(trace_layer_on_response),
        )
        .with_state(appstate)
}

pub async fn http_server(
    listen_addr: std::net::Ipv4Addr,
    listen_port: u16,
    appstate: AppState,
) -> ApiResult<()> {
    let addr = SocketAddr::from((listen_addr, listen_port));
    log::info!("http listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(appstate)).await?;
    Ok(())
}

/// Spawn the timer tasks spec §5 calls for (100ms/250ms/750ms/1s/5s)
/// plus the radio event pump. Each takes the shared lock only for the
/// duration of its own tick — this is what makes the single
/// `Mutex<Core>` behave like the "single cooperative event loop" the
/// spec describes, without requiring a literal single OS thread.
pub fn spawn_background_tasks<R>(appstate: AppState, radio: Arc<Mutex<R>>)
where
    R: RadioDriver + 'static,
{
    spawn_event_pump(appstate.clone(), radio.clone());
    spawn_dispatch_tick(appstate.clone(), radio.clone());
    spawn_group_rate_limit_tick(appstate.clone(), radio);
    spawn_attribute_processing_tick(appstate.clone());
    spawn_idle_tick(appstate.clone());
    spawn_rule_tick(appstate);
}

fn spawn_event_pump<R>(appstate: AppState, radio: Arc<Mutex<R>>)
where
    R: RadioDriver + 'static,
{
    tokio::spawn(async move {
        loop {
            let event = radio.lock().await.poll_event().await;
            let Some(event) = event else {
                log::warn!("radio driver closed its event stream");
                break;
            };
            let mut core = appstate.core.lock().await;
            apply_event(&mut core, event);
        }
    });
}

fn apply_event(core: &mut Core, event: RadioEvent) {
    let now = std::time::Instant::now();
    match event {
        RadioEvent::Indication(ind) => {
            let follow_up = core
                .synchronizer
                .consume_indication(&mut core.registry, &mut core.cache, &ind, now);
            for task in follow_up {
                core.pipeline.enqueue(task);
            }
            core.pipeline.mark_available(ind.src_ext_addr);

            if let Some(sensor) = core
                .registry
                .sensors
                .iter()
                .find(|s| s.ext_addr == ind.src_ext_addr)
            {
                let sensor_id = sensor.id.clone();
                react_to_sensor_change(core, &sensor_id);
            }
        }
        RadioEvent::Confirm(confirm) => {
            if let Some(task) = core.pipeline.on_confirm(confirm) {
                core.pipeline.enqueue(task);
            }
        }
        RadioEvent::Node(node) => {
            core.pipeline.mark_available(node.ext_addr);
            core.registry
                .note_node_event(node.ext_addr, node.zombie, node.active_endpoints);
        }
        RadioEvent::GreenPower(gp) => {
            // spec §4.5: a green-power button press updates the sensor's
            // buttonevent/lastupdated just like any other sensor change,
            // then feeds the same rule-evaluation path — no separate
            // bypass mechanism.
            let chrono_now = chrono::Utc::now();
            if let Some(sensor) = core.registry.admit_green_power(gp.gpd_src_id, gp.device_id) {
                sensor.set_button_event(u32::from(gp.command_id), chrono_now);
                let sensor_id = sensor.id.clone();
                react_to_sensor_change(core, &sensor_id);
            }
        }
    }
}

fn react_to_sensor_change(core: &mut Core, sensor_id: &str) {
    let now = chrono::Utc::now();
    let mut recorder = RecordingExecutor::default();
    core.rules.on_sensor_changed(
        sensor_id,
        &core.registry,
        &core.cache,
        &core.tuning,
        &mut recorder,
        now,
        std::time::Instant::now(),
    );
    for (address, body) in recorder.calls {
        let _ = core.put(&address, &body);
    }
}

fn spawn_dispatch_tick<R>(appstate: AppState, radio: Arc<Mutex<R>>)
where
    R: RadioDriver + 'static,
{
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(100));
        loop {
            tick.tick().await;
            let mut core = appstate.core.lock().await;
            let mut radio = radio.lock().await;
            let group_min_interval = core.tuning.group_send_delay();
            core.pipeline
                .dispatch_tick(&mut *radio, group_min_interval, std::time::Instant::now())
                .await;
        }
    });
}

fn spawn_group_rate_limit_tick<R>(appstate: AppState, radio: Arc<Mutex<R>>)
where
    R: RadioDriver + 'static,
{
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(250));
        loop {
            tick.tick().await;
            let mut core = appstate.core.lock().await;
            let mut radio = radio.lock().await;
            let max_tasks = core.tuning.max_group_tasks;
            core.pipeline
                .group_rate_limit_tick(&mut *radio, max_tasks, std::time::Instant::now())
                .await;
        }
    });
}

fn spawn_attribute_processing_tick(appstate: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(750));
        loop {
            tick.tick().await;
            let mut core = appstate.core.lock().await;
            let reads = core.synchronizer.attribute_processing_tick(&core.registry, 2);
            for (_light_id, task) in reads {
                core.pipeline.enqueue(task);
            }
        }
    });
}

fn spawn_idle_tick(appstate: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tick.tick().await;
            let mut core = appstate.core.lock().await;
            core.idle_total_ms += 1000;
            let now = std::time::Instant::now();
            let tuning = core.tuning;
            let tasks = core.synchronizer.idle_tick(&core.registry, &mut core.cache, &tuning, now);
            for task in tasks {
                core.pipeline.enqueue(task);
            }
        }
    });
}

fn spawn_rule_tick(appstate: AppState) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(5));
        loop {
            tick.tick().await;
            let mut core = appstate.core.lock().await;
            let now = chrono::Utc::now();

            let mut recorder = RecordingExecutor::default();
            core.rules.periodic_tick(
                &core.registry,
                &core.cache,
                &core.tuning,
                &mut recorder,
                now,
                std::time::Instant::now(),
            );
            for (address, body) in recorder.calls {
                let _ = core.put(&address, &body);
            }

            let idle_total_ms = core.idle_total_ms;
            let tuning = core.tuning;
            core.rules
                .verify_tick(&core.registry, &mut core.pipeline, &tuning, idle_total_ms);
        }
    });
}
