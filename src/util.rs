pub(crate) mod decompress;
