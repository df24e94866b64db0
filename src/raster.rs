pub(crate) mod codec;
pub(crate) mod rasterizer;
pub(crate) mod worker;
