pub(crate) mod consumer;
