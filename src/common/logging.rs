use crate::config::env::{self, EnvKey};
use crate::config::settings::Environment;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset.
pub fn default_directives(environment: Environment) -> &'static str {
    match environment {
        Environment::Develop => "media_worker=debug,tower_http=debug,info",
        Environment::Staging | Environment::Production => "info",
    }
}

fn json_requested() -> bool {
    env::get_opt(EnvKey::LogFormat).is_some_and(|v| v.eq_ignore_ascii_case("json"))
}

pub fn init(environment: Environment) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(environment)));
    let registry = tracing_subscriber::registry().with(filter);

    if json_requested() {
        registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}
