//! Content-addressed storage of photo files.
//!
//! # Storage Layout
//!
//! ```text
//! <root>/photos/
//! └── <enc[0..2]>/
//!     └── <enc[2..4]>/
//!         ├── <enc>.jpg                 # original
//!         └── <enc>.raw.thumbnail.jpg   # derived variant
//! ```

pub mod address;
pub mod manager;

pub use address::{decode_id, encode_id, relative_path, strip_separators, ExtensionChain};
pub use manager::FileManager;
