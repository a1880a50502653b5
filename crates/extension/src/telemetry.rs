use std::cell::RefCell;
use std::sync::Once;
use temple_bridge_core::telemetry::parse_level;
use tracing::{Level, Span};
use wasm_bindgen::prelude::*;

static INIT: Once = Once::new();

thread_local! {
    static COMPONENT_GUARD: RefCell<Option<tracing::span::Entered<'static>>> =
        const { RefCell::new(None) };
}

#[wasm_bindgen(js_name = initTracing)]
pub fn init_tracing(level: String) {
    init(parse_level(&level), None);
}

/// Installs the console subscriber once per JS context. With a component,
/// every event carries a permanent `component` span so background, content
/// script and popup logs can be told apart in a shared console.
pub fn init(level: Level, component: Option<&'static str>) {
    INIT.call_once(|| {
        console_error_panic_hook::set_once();

        let mut builder = tracing_wasm::WASMLayerConfigBuilder::new();
        builder
            .set_max_level(level)
            .set_console_config(tracing_wasm::ConsoleConfig::ReportWithConsoleColor)
            .set_report_logs_in_timings(false);
        tracing_wasm::set_as_global_default_with_config(builder.build());

        if let Some(component) = component {
            let span: &'static Span =
                Box::leak(Box::new(tracing::info_span!("component", crate = component)));
            COMPONENT_GUARD.with(|cell| {
                *cell.borrow_mut() = Some(span.enter());
            });
        }

        tracing::info!("Tracing initialized at level = {} ({:?})", level, component);
    });
}
