use std::sync::OnceLock;

use tracing::error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::commands::Verbosity;

static LOGGER_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// Log filter for a verbosity level, `RUST_LOG` takes precedence if set.
pub(crate) fn log_filter(verbosity: Verbosity) -> &'static str {
    match verbosity {
        // Show only errors
        Verbosity::Quiet => "off,nuget_feeds=error,nuget_catalog=error,nuget_sources=error",
        // Only show warnings, e.g. skipped config files or sources
        Verbosity::Verbose(0) => "off,nuget_feeds=warn,nuget_catalog=warn,nuget_sources=warn",
        Verbosity::Verbose(1) => "off,nuget_feeds=info,nuget_catalog=info,nuget_sources=info",
        // Also show requests, config files and decrypt script output
        Verbosity::Verbose(2) => "off,nuget_feeds=debug,nuget_catalog=debug,nuget_sources=debug",
        Verbosity::Verbose(3) => "off,nuget_feeds=trace,nuget_catalog=trace,nuget_sources=trace",
        // Also show debug logs of the http stack
        Verbosity::Verbose(4) => "debug,nuget_feeds=trace,nuget_catalog=trace,nuget_sources=trace",
        Verbosity::Verbose(_) => "trace",
    }
}

pub(crate) fn init_logger(verbosity: Option<Verbosity>) {
    let log_filter = log_filter(verbosity.unwrap_or_default());

    let filter_handle = LOGGER_HANDLE.get_or_init(|| {
        let (subscriber, reload_handle) = create_registry_and_filter_reload_handle();
        subscriber.init();
        reload_handle
    });

    update_filters(filter_handle, log_filter);
}

pub fn update_filters(filter_handle: &Handle<EnvFilter, Registry>, log_filter: &str) {
    let result = filter_handle.modify(|layer| {
        match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_filter)) {
            Ok(new_filter) => *layer = new_filter,
            Err(err) => {
                error!("Updating logger filter failed: {}", err);
            },
        };
    });
    if let Err(err) = result {
        error!("Updating logger filter failed: {}", err);
    }
}

pub fn create_registry_and_filter_reload_handle() -> (
    impl tracing::Subscriber + Send + Sync + 'static,
    Handle<EnvFilter, Registry>,
) {
    // Start with everything off, the actual filter is set right after by `update_filters`.
    let filter = EnvFilter::new("off");
    let (filter, filter_reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);
    let registry = tracing_subscriber::registry().with(log_layer);

    (registry, filter_reload_handle)
}
