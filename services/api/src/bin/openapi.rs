//! services/api/src/bin/openapi.rs
//!
//! Writes the network table API document to disk so front-ends can generate
//! clients without starting the server.
//!
//! Usage: `openapi [OUTPUT]` (defaults to `nettable-api.openapi.json`).

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "nettable-api.openapi.json";

fn write_api_document(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let document = ApiDoc::openapi();
    let route_count = document.paths.paths.len();
    std::fs::write(path, document.to_pretty_json()?)?;
    println!("Wrote {} routes of the network table API to {}", route_count, path);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
    write_api_document(&path)
}
