//! Post-processing of rendered documents: the HTML tree, block scanning,
//! table-of-contents synthesis and local reference discovery.

mod references;
mod scan;
mod toc;
mod tree;

pub use references::extract_references;
pub use toc::synthesize_tocs;
pub use tree::Document;
