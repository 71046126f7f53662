use crate::{
    archive::EncoderMethod,
    block::{BindPair, Block},
    error::Error,
    folder::coder_input_starts,
};

/// The recognised shape of a folder's coder graph. Every archive we accept
/// reduces to one of these five; anything else is `UnsupportedTopology`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pipeline {
    /// One coder, fed directly by the single packed stream.
    SingleMain,
    /// One coder, the AES layer, with no further decompression.
    AesOnly,
    /// Two coders: a main decoder reading the packed stream, feeding a
    /// branch filter (BCJ family or Delta).
    FilterMain,
    /// Two coders: the AES layer reading the packed stream, feeding a main
    /// decoder.
    AesMain,
    /// Four coders: three single-stream decoders feeding BCJ2's main, call
    /// and jump inputs, with BCJ2's fourth (range-coder) input fed directly
    /// by a packed stream.
    Bcj2,
}

fn is_filter(id: &[u8]) -> bool {
    id == EncoderMethod::ID_BCJ_X86
        || id == EncoderMethod::ID_BCJ_PPC
        || id == EncoderMethod::ID_BCJ_IA64
        || id == EncoderMethod::ID_BCJ_ARM
        || id == EncoderMethod::ID_BCJ_ARM64
        || id == EncoderMethod::ID_BCJ_ARM_THUMB
        || id == EncoderMethod::ID_BCJ_SPARC
        || id == EncoderMethod::ID_BCJ_RISCV
        || id == EncoderMethod::ID_DELTA
}

fn is_main(id: &[u8]) -> bool {
    id == EncoderMethod::ID_COPY
        || id == EncoderMethod::ID_LZMA
        || id == EncoderMethod::ID_LZMA2
        || id == EncoderMethod::ID_PPMD
        || id == EncoderMethod::ID_ZSTD
}

/// Classifies `block`'s coder graph, returning the recognised [`Pipeline`]
/// shape or `UnsupportedTopology`/`UnsupportedCompressionMethod` if it
/// doesn't match one of the five supported wirings.
pub(crate) fn classify(block: &Block) -> Result<Pipeline, Error> {
    if block.coders.is_empty() {
        return Err(Error::unsupported_topology("folder has no coders"));
    }
    for coder in &block.coders {
        if EncoderMethod::by_id(coder.encoder_method_id()).is_none() {
            return Err(Error::UnsupportedCompressionMethod(format!(
                "{:?}",
                coder.encoder_method_id()
            )));
        }
    }

    match block.coders.len() {
        1 => classify_single(block),
        2 => classify_pair(block),
        4 => classify_bcj2(block),
        n => Err(Error::unsupported_topology(format!(
            "folder with {n} coders is not one of the recognised shapes"
        ))),
    }
}

fn classify_single(block: &Block) -> Result<Pipeline, Error> {
    if block.packed_streams.len() != 1 || !block.bind_pairs.is_empty() {
        return Err(Error::unsupported_topology(
            "single-coder folder with unexpected wiring",
        ));
    }
    let coder = &block.coders[0];
    if coder.num_in_streams != 1 || coder.num_out_streams != 1 {
        return Err(Error::unsupported_topology(
            "single-coder folder with a multi-stream coder",
        ));
    }
    let id = coder.encoder_method_id();
    if id == EncoderMethod::ID_AES256_SHA256 {
        Ok(Pipeline::AesOnly)
    } else if is_main(id) {
        Ok(Pipeline::SingleMain)
    } else {
        Err(Error::unsupported_topology(
            "single-coder folder must be a main decoder or the AES layer",
        ))
    }
}

fn classify_pair(block: &Block) -> Result<Pipeline, Error> {
    if block.packed_streams.len() != 1 || block.bind_pairs.len() != 1 {
        return Err(Error::unsupported_topology(
            "two-coder folder with unexpected wiring",
        ));
    }
    if block.coders.iter().any(|c| c.num_in_streams != 1 || c.num_out_streams != 1) {
        return Err(Error::unsupported_topology(
            "two-coder folder with a multi-stream coder",
        ));
    }

    let starts = coder_input_starts(block);
    let packed_in = block.packed_streams[0] as usize;
    let fed_coder = starts
        .iter()
        .position(|&s| s == packed_in)
        .ok_or_else(|| Error::unsupported_topology("packed stream doesn't feed a coder input"))?;

    let bp = &block.bind_pairs[0];
    if bp.out_index as usize != fed_coder {
        return Err(Error::unsupported_topology(
            "two-coder folder's bind pair doesn't originate at the packed-fed coder",
        ));
    }
    let other_coder = (0..2).find(|&i| i != fed_coder).unwrap();
    if bp.in_index as usize != starts[other_coder] {
        return Err(Error::unsupported_topology(
            "two-coder folder's bind pair doesn't feed the other coder",
        ));
    }

    let fed_id = block.coders[fed_coder].encoder_method_id();
    let other_id = block.coders[other_coder].encoder_method_id();
    if fed_id == EncoderMethod::ID_AES256_SHA256 && is_main(other_id) {
        Ok(Pipeline::AesMain)
    } else if is_main(fed_id) && is_filter(other_id) {
        Ok(Pipeline::FilterMain)
    } else {
        Err(Error::unsupported_topology(
            "two-coder folder must be AES+main or main+filter",
        ))
    }
}

/// S5's wiring is hard-coded in the format itself (mirrors
/// `examples/original_source/C/7zDec.c`'s `CheckSupportedFolder`, which
/// compares against these exact same literals rather than deriving them from
/// a general graph shape). Preserve the constants verbatim rather than
/// generalising: any folder whose pack-stream or bond wiring differs from
/// this, even if isomorphic, is `Unsupported`.
const BCJ2_PACKED_STREAMS: [u64; 4] = [2, 6, 1, 0];
const BCJ2_BOND_0: BindPair = BindPair {
    in_index: 5,
    out_index: 0,
};
const BCJ2_BOND_1: BindPair = BindPair {
    in_index: 4,
    out_index: 1,
};
const BCJ2_BOND_2: BindPair = BindPair {
    in_index: 3,
    out_index: 2,
};

fn classify_bcj2(block: &Block) -> Result<Pipeline, Error> {
    if block.coders[3].encoder_method_id() != EncoderMethod::ID_BCJ2 {
        return Err(Error::unsupported_topology(
            "four-coder folder's fourth coder must be BCJ2",
        ));
    }
    let bcj2 = &block.coders[3];
    if bcj2.num_in_streams != 4 || bcj2.num_out_streams != 1 {
        return Err(Error::unsupported_topology(
            "BCJ2 coder without exactly four inputs and one output",
        ));
    }
    for coder in &block.coders[0..3] {
        if coder.num_in_streams != 1 || coder.num_out_streams != 1 {
            return Err(Error::unsupported_topology(
                "BCJ2 folder's upstream coders must be single-stream",
            ));
        }
        if !is_main(coder.encoder_method_id()) {
            return Err(Error::unsupported_topology(
                "BCJ2 folder's upstream coders must be main decoders",
            ));
        }
    }
    if block.packed_streams[..] != BCJ2_PACKED_STREAMS {
        return Err(Error::unsupported_topology(
            "BCJ2 folder's pack streams don't match the hard-wired indices [2,6,1,0]",
        ));
    }
    if block.bind_pairs[..] != [BCJ2_BOND_0, BCJ2_BOND_1, BCJ2_BOND_2] {
        return Err(Error::unsupported_topology(
            "BCJ2 folder's bonds don't match the hard-wired wiring (5,0),(4,1),(3,2)",
        ));
    }
    Ok(Pipeline::Bcj2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BindPair, Coder};

    fn coder(id: &[u8], num_in: u64, num_out: u64) -> Coder {
        let mut coder = Coder::default();
        coder.id_size = id.len();
        coder.decompression_method_id_mut().copy_from_slice(id);
        coder.num_in_streams = num_in;
        coder.num_out_streams = num_out;
        coder
    }

    #[test]
    fn single_copy_is_single_main() {
        let block = Block {
            coders: vec![coder(EncoderMethod::ID_COPY, 1, 1)],
            packed_streams: vec![0],
            unpack_sizes: vec![5],
            ..Default::default()
        };
        assert_eq!(classify(&block).unwrap(), Pipeline::SingleMain);
    }

    #[test]
    fn single_aes_is_ae_only() {
        let block = Block {
            coders: vec![coder(EncoderMethod::ID_AES256_SHA256, 1, 1)],
            packed_streams: vec![0],
            unpack_sizes: vec![16],
            ..Default::default()
        };
        assert_eq!(classify(&block).unwrap(), Pipeline::AesOnly);
    }

    #[test]
    fn main_plus_filter_is_filter_main() {
        let block = Block {
            coders: vec![coder(EncoderMethod::ID_LZMA, 1, 1), coder(EncoderMethod::ID_BCJ_X86, 1, 1)],
            packed_streams: vec![0],
            unpack_sizes: vec![32, 32],
            bind_pairs: vec![BindPair {
                in_index: 1,
                out_index: 0,
            }],
            ..Default::default()
        };
        assert_eq!(classify(&block).unwrap(), Pipeline::FilterMain);
    }

    #[test]
    fn aes_plus_main_is_ae_main() {
        let block = Block {
            coders: vec![coder(EncoderMethod::ID_AES256_SHA256, 1, 1), coder(EncoderMethod::ID_COPY, 1, 1)],
            packed_streams: vec![0],
            unpack_sizes: vec![16, 16],
            bind_pairs: vec![BindPair {
                in_index: 1,
                out_index: 0,
            }],
            ..Default::default()
        };
        assert_eq!(classify(&block).unwrap(), Pipeline::AesMain);
    }

    #[test]
    fn unknown_method_id_is_unsupported() {
        let block = Block {
            coders: vec![coder(&[0xAA, 0xBB, 0xCC], 1, 1)],
            packed_streams: vec![0],
            unpack_sizes: vec![5],
            ..Default::default()
        };
        let err = classify(&block).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompressionMethod(_)));
    }

    #[test]
    fn three_coders_with_no_bonds_is_unsupported_topology() {
        let block = Block {
            coders: vec![
                coder(EncoderMethod::ID_COPY, 1, 1),
                coder(EncoderMethod::ID_COPY, 1, 1),
                coder(EncoderMethod::ID_COPY, 1, 1),
            ],
            packed_streams: vec![0, 1, 2],
            unpack_sizes: vec![1, 1, 1],
            ..Default::default()
        };
        let err = classify(&block).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTopology(_)));
    }

    #[test]
    fn bcj2_wiring_is_recognised() {
        let block = Block {
            coders: vec![
                coder(EncoderMethod::ID_COPY, 1, 1),
                coder(EncoderMethod::ID_COPY, 1, 1),
                coder(EncoderMethod::ID_COPY, 1, 1),
                coder(EncoderMethod::ID_BCJ2, 4, 1),
            ],
            // The format's own hard-wired indices: pack streams [2,6,1,0],
            // bonds (5,0),(4,1),(3,2).
            packed_streams: vec![2, 6, 1, 0],
            unpack_sizes: vec![10, 0, 0, 10],
            bind_pairs: vec![
                BindPair {
                    in_index: 5,
                    out_index: 0,
                },
                BindPair {
                    in_index: 4,
                    out_index: 1,
                },
                BindPair {
                    in_index: 3,
                    out_index: 2,
                },
            ],
            ..Default::default()
        };
        assert_eq!(classify(&block).unwrap(), Pipeline::Bcj2);
    }

    #[test]
    fn bcj2_wiring_with_isomorphic_but_nonliteral_indices_is_rejected() {
        // Same shape (4 coders, 4 pack streams, 3 bonds, BCJ2 terminal) but
        // different concrete indices than the format's hard-wired constants.
        // Testable property 4 requires this be `Unsupported`, not accepted.
        let block = Block {
            coders: vec![
                coder(EncoderMethod::ID_COPY, 1, 1),
                coder(EncoderMethod::ID_COPY, 1, 1),
                coder(EncoderMethod::ID_COPY, 1, 1),
                coder(EncoderMethod::ID_BCJ2, 4, 1),
            ],
            packed_streams: vec![0, 1, 2, 3],
            unpack_sizes: vec![10, 0, 0, 10],
            bind_pairs: vec![
                BindPair {
                    in_index: 4,
                    out_index: 0,
                },
                BindPair {
                    in_index: 5,
                    out_index: 1,
                },
                BindPair {
                    in_index: 6,
                    out_index: 2,
                },
            ],
            ..Default::default()
        };
        let err = classify(&block).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTopology(_)));
    }
}
