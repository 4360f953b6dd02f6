use tracing::info;

pub fn otel_endpoint_configured(endpoint: &str) {
    info!(
        target = "telemetry.gui",
        endpoint,
        "OpenTelemetry endpoint configured; forward tracing spans via collector-side subscriber"
    );
}

pub fn run_started(run_id: &str, running: usize, available_permits: usize) {
    info!(
        target = "telemetry.gui",
        run_id,
        running_runs = running,
        available_permits,
        event = "run_started"
    );
}

pub fn run_finished(
    run_id: &str,
    status: &str,
    sources: usize,
    running: usize,
    available_permits: usize,
) {
    info!(
        target = "telemetry.gui",
        run_id,
        status,
        sources,
        running_runs = running,
        available_permits,
        event = "run_finished"
    );
}

pub fn run_failed(run_id: &str, running: usize, available_permits: usize, error: &str) {
    info!(
        target = "telemetry.gui",
        run_id,
        running_runs = running,
        available_permits,
        error,
        event = "run_failed"
    );
}

pub fn stream_opened(run_id: &str, active_streams: usize) {
    info!(
        target = "telemetry.gui",
        run_id,
        active_streams,
        event = "stream_opened"
    );
}

pub fn report_downloaded(history_id: &str, bytes: usize) {
    info!(
        target = "telemetry.gui",
        history_id,
        bytes,
        event = "report_downloaded"
    );
}
