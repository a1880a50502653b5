use tracing::Level;

#[cfg(not(target_arch = "wasm32"))]
static INIT: std::sync::Once = std::sync::Once::new();

/// Installs a global fmt subscriber. `RUST_LOG` wins over `level` when set.
/// Only the first call has any effect.
#[cfg(not(target_arch = "wasm32"))]
pub fn init(level: Level) {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .is_ok();

        if installed {
            tracing::info!("Tracing initialized at level = {}", level);
        }
    });
}

pub fn parse_level(s: &str) -> Level {
    match s.to_ascii_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARNING"), Level::WARN);
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }
}
