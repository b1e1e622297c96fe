//! Content block extraction and restoration engine

pub mod blocks;
pub mod extractor;
pub mod filter;
pub mod markup;
pub mod php_serialize;
pub mod restorer;
pub mod table;
pub mod tree;
