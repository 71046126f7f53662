//! Decodes a single folder (what upstream 7z calls a "folder", this crate a
//! [`Block`](crate::block::Block)) into its uncompressed plaintext.
//!
//! A folder is a small DAG of coders: primitive decoders, the AES layer, and
//! branch filters, wired together by bind pairs and fed by one or more
//! packed (archive-relative) byte ranges. [`classifier`] recognises exactly
//! five wiring shapes and rejects everything else; [`engine`] then walks the
//! validated DAG and produces the folder's full plaintext as an owned
//! buffer.

mod bcj2;
mod classifier;
mod engine;

pub(crate) use engine::decode_folder;

use crate::block::Block;

/// Global input-stream index range `[start, end)` owned by each coder, in
/// the order `Block::coders` lists them. Coder N's inputs occupy
/// `num_in_streams` consecutive slots starting where coder N-1's leave off.
pub(crate) fn coder_input_starts(block: &Block) -> Vec<usize> {
    let mut starts = Vec::with_capacity(block.coders.len());
    let mut next = 0usize;
    for coder in &block.coders {
        starts.push(next);
        next += coder.num_in_streams as usize;
    }
    starts
}

/// The one coder whose output feeds nothing else: the folder's plaintext.
pub(crate) fn terminal_coder(block: &Block) -> Option<usize> {
    (0..block.coders.len())
        .rev()
        .find(|&i| block.find_bind_pair_for_out_stream(i).is_none())
}
