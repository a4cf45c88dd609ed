//! Source maps for cssbundle
//!
//! This crate holds a decoded Source Map v3 model and the operations the
//! build needs on it: incremental construction, composition of stage maps
//! into a single `output -> original sources` map, and the JSON and data
//! URL encodings used when the map is written.
//!
//! # Example
//!
//! ```rust
//! use cssbundle_source_map::*;
//!
//! let mut builder = SourceMapBuilder::new("bundle.css");
//! let src = builder.add_source("a.scss", None);
//! builder.map_to(0, 0, src, 0, 0);
//! let map = builder.build();
//!
//! assert_eq!(map.encode_mappings(), "AAAA");
//! ```

pub mod builder;
pub mod compose;
pub mod error;
pub mod types;
pub mod utils;
pub mod vlq;

pub use builder::SourceMapBuilder;
pub use error::SourceMapError;
pub use types::{OriginalPosition, Segment, SourceMap};
pub use utils::{LineIndex, identity_map};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

const DATA_URL_PREFIX: &str = "data:application/json;base64,";

impl SourceMap {
    /// Encode the map as a `data:application/json;base64,` URL.
    pub fn to_data_url(&self) -> Result<String, SourceMapError> {
        let json = self.to_json()?;
        Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(json)))
    }
}

/// The comment that links a stylesheet to its map.
pub fn annotation(url: &str) -> String {
    format!("/*# sourceMappingURL={url} */")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_decodes_to_json() {
        let map = identity_map("out.css", "in.css", "a{}");
        let url = map.to_data_url().unwrap();
        let encoded = url.strip_prefix(DATA_URL_PREFIX).unwrap();
        let json = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(SourceMap::from_json(&json).unwrap(), map);
    }

    #[test]
    fn test_annotation() {
        assert_eq!(
            annotation("bundle.css.map"),
            "/*# sourceMappingURL=bundle.css.map */"
        );
    }
}
