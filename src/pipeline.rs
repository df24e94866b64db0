pub(crate) mod compress;
pub(crate) mod manager;
pub(crate) mod opts;
pub(crate) mod rasterize;
pub(crate) mod scheduler;
pub(crate) mod serialize;
