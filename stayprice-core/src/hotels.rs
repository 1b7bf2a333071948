use std::path::Path;

use tracing::{info, warn};

use crate::error::InputError;

/// Reads a newline-delimited hotel list, skipping blank lines.
pub fn load_hotel_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>, InputError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let hotels = parse_hotel_names(&content);
    if hotels.is_empty() {
        return Err(InputError::Empty {
            path: path.to_path_buf(),
        });
    }
    info!(path = %path.display(), hotels = hotels.len(), "loaded hotel list");
    Ok(hotels)
}

pub fn parse_hotel_names(content: &str) -> Vec<String> {
    let mut hotels = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let name = line.trim();
        if name.is_empty() {
            warn!(line = idx + 1, "skipping empty line in hotel list");
            continue;
        }
        hotels.push(name.to_string());
    }
    hotels
}
