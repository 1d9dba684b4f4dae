//! Embedded web UI
//!
//! In development, falls back to serving from the filesystem.

use rust_embed::Embed;

#[derive(Embed)]
#[folder = "ui"]
struct Assets;

/// Get the index.html content (embedded or from filesystem)
pub fn get_index_html() -> Option<String> {
    if let Some(content) = Assets::get("index.html") {
        return String::from_utf8(content.data.to_vec()).ok();
    }
    std::fs::read_to_string("ui/index.html").ok()
}
