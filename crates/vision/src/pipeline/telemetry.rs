//! Telemetry helpers for tracing output and the Prometheus recorder.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{
    filter::{EnvFilter, filter_fn},
    fmt,
    prelude::*,
};

use crate::pipeline::config::TelemetryOptions;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static PROM_UPKEEP_THREAD: OnceLock<thread::JoinHandle<()>> = OnceLock::new();
static PROM_INIT: Mutex<()> = Mutex::new(());

/// Keeps the chrome trace writer alive; dropping it flushes the file.
pub struct TelemetryGuard {
    chrome_guard: Option<tracing_chrome::FlushGuard>,
    chrome_trace_path: Option<PathBuf>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(guard) = self.chrome_guard.take() {
            guard.flush();
            if let Some(path) = self.chrome_trace_path.as_ref() {
                tracing::info!("chrome trace written to {}", path.display());
            }
        }
    }
}

/// Install the global tracing subscriber.
///
/// Log verbosity follows `RUST_LOG` and defaults to `info`. When a chrome
/// trace path is configured, span timings are additionally written there.
pub fn init_tracing(opts: &TelemetryOptions) -> Result<TelemetryGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_filter(env_filter);

    let (chrome_layer, chrome_guard) = match opts.chrome_trace_path.as_deref() {
        Some(path) => {
            let (layer, guard) = build_chrome_layer(path)
                .with_context(|| format!("creating chrome trace at {}", path.display()))?;
            let spans_only = filter_fn(|metadata| metadata.is_span());
            (Some(layer.with_filter(spans_only)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(chrome_layer)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .context("tracing subscriber already installed")?;

    Ok(TelemetryGuard {
        chrome_guard,
        chrome_trace_path: opts.chrome_trace_path.clone(),
    })
}

/// Ensure the global metrics recorder is installed and return the Prometheus handle.
///
/// Safe to call repeatedly; only the first call installs the recorder.
pub fn init_metrics_recorder() -> Result<&'static PrometheusHandle> {
    let _init = PROM_INIT.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle);
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|_| anyhow!("metrics recorder already installed"))?;

    let upkeep_handle = handle.clone();
    let upkeep = spawn_thread("prometheus-upkeep", move || {
        loop {
            thread::sleep(Duration::from_secs(5));
            upkeep_handle.run_upkeep();
        }
    })
    .context("failed to spawn prometheus upkeep thread")?;
    let _ = PROM_UPKEEP_THREAD.set(upkeep);

    Ok(PROM_HANDLE.get_or_init(|| handle))
}

/// Access the Prometheus handle when already initialised.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get()
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

fn build_chrome_layer<S>(
    path: &Path,
) -> io::Result<(tracing_chrome::ChromeLayer<S>, tracing_chrome::FlushGuard)>
where
    S: tracing::Subscriber
        + for<'span> tracing_subscriber::registry::LookupSpan<'span>
        + Send
        + Sync,
{
    let file = std::fs::File::create(path)?;
    let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .writer(file)
        .include_args(true)
        .trace_style(tracing_chrome::TraceStyle::Threaded)
        .build();
    Ok((layer, guard))
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn spawned_threads_carry_their_name() {
        let (tx, rx) = mpsc::channel();
        let handle = spawn_thread("hazard-test", move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        })
        .unwrap();
        handle.join().unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("hazard-test"));
    }
}
