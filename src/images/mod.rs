//! Product images: directory discovery, remote downloads and association.

pub mod associate;
pub mod fetch;
pub mod locator;
