/// Tab Grouper - Chrome Extension that groups tabs by domain
/// Built with Rust + WASM + Yew

pub mod bridge;
pub mod color;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod host;
pub mod operations;
pub mod reconcile;
pub mod scheduler;
pub mod storage;
pub mod tab_data;
pub mod title;
pub mod ui;

#[cfg(test)]
mod testing;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::new(log::Level::Trace));
    log::set_max_level(log::LevelFilter::Info);
}

// Re-export the grouping key computation for JavaScript access
#[wasm_bindgen(js_name = groupingKey)]
pub fn grouping_key(url: &str, use_subdomain_grouping: bool) -> Option<String> {
    let settings = storage::Settings {
        use_subdomain_grouping,
        ..storage::Settings::new()
    };
    domain::grouping_key(url, &settings)
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}
