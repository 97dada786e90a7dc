//! Tracing subscriber setup for the server binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber: an `EnvFilter` (overridable with
/// `RUST_LOG`) over the `fmt` layer.
///
/// Without `RUST_LOG`, every `spyglass*` crate and the binary log at
/// `default_level`; everything else stays at `warn`.
pub fn setup_logger(binary_name: &str, default_level: &str) {
    let fallback = filter_directives(binary_name, default_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn filter_directives(binary_name: &str, level: &str) -> String {
    let crates = [
        "spyglass",
        "spyglass_protocol",
        "spyglass_clock",
        "spyglass_roles",
        "spyglass_session",
        "spyglass_room",
    ];
    let mut directives = vec!["warn".to_string()];
    directives.extend(crates.iter().map(|name| format!("{name}={level}")));
    directives.push(format!("{}={level}", binary_name.replace('-', "_")));
    directives.push(format!("tower_http={level}"));
    directives.join(",")
}
