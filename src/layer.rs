pub(crate) mod state;
pub(crate) mod surface;
pub(crate) mod tree;
