//! Prometheus metrics endpoint.

use crate::server::Conductor;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges describe current state, counters are monotonic since startup.
pub async fn metrics_handler(
    Extension(conductor): Extension<Arc<Conductor>>,
) -> impl IntoResponse {
    let m = conductor.metrics();
    let status = conductor.status();

    // Gauges
    let players = status.players.len();
    let connections = status.connections;
    let barrier_active = u8::from(status.barrier.is_some());
    let pending = status.pending_commands;

    // Counters
    let conns_total = m.connections_total.load(Ordering::Relaxed);
    let conns_rejected = m.connections_rejected.load(Ordering::Relaxed);
    let handshakes = m.handshakes_total.load(Ordering::Relaxed);
    let errors = m.protocol_errors_total.load(Ordering::Relaxed);
    let opened = m.barriers_opened_total.load(Ordering::Relaxed);
    let succeeded = m.barriers_succeeded_total.load(Ordering::Relaxed);
    let failed = m.barriers_failed_total.load(Ordering::Relaxed);
    let issued = m.commands_issued_total.load(Ordering::Relaxed);
    let acked = m.commands_acked_total.load(Ordering::Relaxed);
    let cmd_failed = m.commands_failed_total.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP testconductor_players_active Number of registered players
# TYPE testconductor_players_active gauge
testconductor_players_active {players}

# HELP testconductor_connections_active Number of open connections
# TYPE testconductor_connections_active gauge
testconductor_connections_active {connections}

# HELP testconductor_barrier_active Whether a barrier is awaited
# TYPE testconductor_barrier_active gauge
testconductor_barrier_active {barrier_active}

# HELP testconductor_commands_pending Fault commands waiting for an ack
# TYPE testconductor_commands_pending gauge
testconductor_commands_pending {pending}

# HELP testconductor_info Server information
# TYPE testconductor_info gauge
testconductor_info{{version="{version}"}} 1

# HELP testconductor_connections_total Total connections accepted
# TYPE testconductor_connections_total counter
testconductor_connections_total {conns_total}

# HELP testconductor_connections_rejected_total Connections refused at the player limit
# TYPE testconductor_connections_rejected_total counter
testconductor_connections_rejected_total {conns_rejected}

# HELP testconductor_handshakes_total Successful handshakes
# TYPE testconductor_handshakes_total counter
testconductor_handshakes_total {handshakes}

# HELP testconductor_protocol_errors_total Protocol and usage errors
# TYPE testconductor_protocol_errors_total counter
testconductor_protocol_errors_total {errors}

# HELP testconductor_barriers_opened_total Barriers opened
# TYPE testconductor_barriers_opened_total counter
testconductor_barriers_opened_total {opened}

# HELP testconductor_barriers_succeeded_total Barriers released
# TYPE testconductor_barriers_succeeded_total counter
testconductor_barriers_succeeded_total {succeeded}

# HELP testconductor_barriers_failed_total Barriers failed
# TYPE testconductor_barriers_failed_total counter
testconductor_barriers_failed_total {failed}

# HELP testconductor_commands_issued_total Fault commands sent
# TYPE testconductor_commands_issued_total counter
testconductor_commands_issued_total {issued}

# HELP testconductor_commands_acked_total Fault commands acknowledged
# TYPE testconductor_commands_acked_total counter
testconductor_commands_acked_total {acked}

# HELP testconductor_commands_failed_total Fault commands timed out or lost
# TYPE testconductor_commands_failed_total counter
testconductor_commands_failed_total {cmd_failed}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
