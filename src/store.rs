pub(crate) mod backend;
pub(crate) mod blob;
pub(crate) mod cache;
pub(crate) mod fs;
