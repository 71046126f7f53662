use std::{collections::HashMap, io::Read};

use crate::{
    Config, Password,
    archive::EncoderMethod,
    block::{Block, Coder},
    decoder::add_decoder,
    error::Error,
    folder::{
        bcj2,
        classifier::{Pipeline, classify},
        coder_input_starts, terminal_coder,
    },
};

/// Decodes one folder to its full plaintext.
///
/// `packed` holds the folder's packed byte ranges already read into memory,
/// in the order `block.packed_streams` lists them. The folder's wiring is
/// validated by [`classify`] up front; the walk itself is a single generic
/// recursive descent over the coder DAG that every one of the five shapes
/// reduces to, mirroring how a linear chain and a four-way BCJ2 fan-in are
/// really the same kind of graph once you stop assuming exactly one parent
/// per node.
pub(crate) fn decode_folder(
    block: &Block,
    packed: &[Vec<u8>],
    password: &Password,
    config: &Config,
) -> Result<Vec<u8>, Error> {
    let pipeline = classify(block)?;
    log::debug!("decoding folder as {pipeline:?}, {} coder(s)", block.coders.len());

    let encrypted = matches!(pipeline, Pipeline::AesOnly | Pipeline::AesMain);

    let starts = coder_input_starts(block);
    let terminal = terminal_coder(block)
        .ok_or_else(|| Error::unsupported_topology("folder has no terminal coder"))?;

    let decode = || -> Result<Vec<u8>, Error> {
        let mut cache = HashMap::new();
        let data = decode_coder_output(block, terminal, packed, &starts, password, config, &mut cache)?;
        if block.has_crc && crc32fast::hash(&data) as u64 != block.crc {
            return Err(Error::ChecksumError);
        }
        Ok(data)
    };

    decode().map_err(|e| {
        if encrypted {
            e.into_wrong_password_unless_attributable()
        } else {
            e
        }
    })
}

fn decode_coder_output(
    block: &Block,
    coder_index: usize,
    packed: &[Vec<u8>],
    starts: &[usize],
    password: &Password,
    config: &Config,
    cache: &mut HashMap<usize, Vec<u8>>,
) -> Result<Vec<u8>, Error> {
    if let Some(cached) = cache.get(&coder_index) {
        return Ok(cached.clone());
    }

    let coder = &block.coders[coder_index];
    let start = starts[coder_index];
    let out = if coder.encoder_method_id() == EncoderMethod::ID_BCJ2 {
        let main = resolve_input(block, start, packed, starts, password, config, cache)?;
        let call = resolve_input(block, start + 1, packed, starts, password, config, cache)?;
        let jump = resolve_input(block, start + 2, packed, starts, password, config, cache)?;
        let rc = resolve_input(block, start + 3, packed, starts, password, config, cache)?;
        let unpack_size = block.get_unpack_size_at_index(coder_index) as usize;
        bcj2::decode(&main, &call, &jump, &rc, unpack_size)?
    } else {
        let input = resolve_input(block, start, packed, starts, password, config, cache)?;
        let unpack_size = block.get_unpack_size_at_index(coder_index) as usize;
        let declared_input_len = aes_producer_declared_len(block, start);
        decode_with_padding_tolerance(coder, input, declared_input_len, unpack_size, password, config)?
    };

    cache.insert(coder_index, out.clone());
    Ok(out)
}

/// If `in_stream_index` is fed directly by an AES coder's output, returns
/// that coder's declared unpack size. Producers that pad their plaintext to
/// the cipher's block size declare an unpack size smaller than the number of
/// decrypted bytes actually available; see `decode_with_padding_tolerance`.
fn aes_producer_declared_len(block: &Block, in_stream_index: usize) -> Option<usize> {
    let bp = block.find_bind_pair_for_in_stream(in_stream_index)?;
    let producer = block.bind_pairs[bp].out_index as usize;
    if block.coders[producer].encoder_method_id() == EncoderMethod::ID_AES256_SHA256 {
        Some(block.get_unpack_size_at_index(producer) as usize)
    } else {
        None
    }
}

/// Runs a coder's primitive decoder against `input`, retrying with the tail
/// progressively trimmed when the declared producer size (`declared_len`) is
/// smaller than `input`, per the AES layer's padding-tolerance contract: some
/// encoders pad plaintext to the cipher block size without reflecting it in
/// the declared unpack size. The first trim that decodes without error wins;
/// errors not attributable to the data itself (`Unsupported`/`OutOfMemory`)
/// are returned immediately without retrying.
fn decode_with_padding_tolerance(
    coder: &Coder,
    input: Vec<u8>,
    declared_len: Option<usize>,
    unpack_size: usize,
    password: &Password,
    config: &Config,
) -> Result<Vec<u8>, Error> {
    let full_len = input.len();
    let primary_len = match declared_len {
        Some(d) if d < full_len => d,
        _ => return run_primitive(coder, &input, unpack_size, password, config),
    };

    let mut last_err = None;
    let max_trim = primary_len.min(15);
    for trim in 0..=max_trim {
        log::trace!("retrying AES padding tolerance with {trim} byte(s) trimmed");
        let len = primary_len - trim;
        match run_primitive(coder, &input[..len], unpack_size, password, config) {
            Ok(out) => return Ok(out),
            Err(e @ (Error::Unsupported(_) | Error::UnsupportedCompressionMethod(_) | Error::OutOfMemory { .. })) => {
                return Err(e);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.expect("at least one trim attempt runs"))
}

fn run_primitive(
    coder: &Coder,
    input: &[u8],
    unpack_size: usize,
    password: &Password,
    config: &Config,
) -> Result<Vec<u8>, Error> {
    let mut decoder = add_decoder(std::io::Cursor::new(input), unpack_size, coder, password, config)?;
    let mut buf = Vec::with_capacity(unpack_size);
    decoder
        .read_to_end(&mut buf)
        .map_err(|e| Error::bad_password(e, !password.is_empty()))?;
    Ok(buf)
}

fn resolve_input(
    block: &Block,
    in_stream_index: usize,
    packed: &[Vec<u8>],
    starts: &[usize],
    password: &Password,
    config: &Config,
    cache: &mut HashMap<usize, Vec<u8>>,
) -> Result<Vec<u8>, Error> {
    if let Some(pos) = block
        .packed_streams
        .iter()
        .position(|&i| i as usize == in_stream_index)
    {
        return Ok(packed[pos].clone());
    }
    let bp = block
        .find_bind_pair_for_in_stream(in_stream_index)
        .ok_or_else(|| Error::unsupported_topology("dangling coder input stream"))?;
    let producer = block.bind_pairs[bp].out_index as usize;
    decode_coder_output(block, producer, packed, starts, password, config, cache)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    #[cfg(feature = "aes256")]
    use aes::cipher::{BlockEncryptMut, KeyIvInit, generic_array::GenericArray};
    use lzma_rust2::{LZMAOptions, LZMAWriter, filter::bcj::BCJWriter};
    #[cfg(feature = "aes256")]
    use sha2::Digest;

    use super::*;
    use crate::block::BindPair;

    /// Compresses `data` with real LZMA encoding, returning the 5-byte 7z
    /// coder properties (lc/lp/pb byte + little-endian dictionary size)
    /// alongside the packed bytes, exactly as `get_lzma_dic_size`/the `ID_LZMA`
    /// arm of `add_decoder` expect to receive them.
    fn lzma_compress(data: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let options = LZMAOptions::with_preset(6);
        let mut packed = Vec::new();
        let mut writer = LZMAWriter::new_no_header(&mut packed, &options, false).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();

        let mut props = vec![options.get_props()];
        props.extend_from_slice(&options.dict_size.to_le_bytes());
        (props, packed)
    }

    #[cfg(feature = "aes256")]
    type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

    fn coder(id: &[u8], num_in: u64, num_out: u64, properties: Vec<u8>) -> Coder {
        let mut coder = Coder::default();
        coder.id_size = id.len();
        coder.decompression_method_id_mut().copy_from_slice(id);
        coder.num_in_streams = num_in;
        coder.num_out_streams = num_out;
        coder.properties = properties;
        coder
    }

    fn single_copy_block(data: &[u8]) -> Block {
        Block {
            coders: vec![coder(EncoderMethod::ID_COPY, 1, 1, vec![])],
            has_crc: false,
            crc: 0,
            total_input_streams: 1,
            total_output_streams: 1,
            bind_pairs: vec![],
            packed_streams: vec![0],
            unpack_sizes: vec![data.len() as u64],
            num_unpack_sub_streams: 1,
        }
    }

    #[test]
    fn copy_folder_passes_bytes_through() {
        let data = b"Hello".to_vec();
        let block = single_copy_block(&data);
        let out = decode_folder(&block, &[data.clone()], &Password::empty(), &Config::default()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn crc_mismatch_is_fatal() {
        let data = b"Hello".to_vec();
        let mut block = single_copy_block(&data);
        block.has_crc = true;
        block.crc = 0xDEAD_BEEF;
        let err = decode_folder(&block, &[data], &Password::empty(), &Config::default()).unwrap_err();
        assert!(matches!(err, Error::ChecksumError));
    }

    #[test]
    fn crc_match_succeeds() {
        let data = b"Hello".to_vec();
        let mut block = single_copy_block(&data);
        block.has_crc = true;
        block.crc = crc32fast::hash(&data) as u64;
        let out = decode_folder(&block, &[data.clone()], &Password::empty(), &Config::default()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn unrecognised_topology_is_rejected_before_reading_pack_bytes() {
        // Three coders with no bonds matches none of S1-S5.
        let block = Block {
            coders: vec![
                coder(EncoderMethod::ID_COPY, 1, 1, vec![]),
                coder(EncoderMethod::ID_COPY, 1, 1, vec![]),
                coder(EncoderMethod::ID_COPY, 1, 1, vec![]),
            ],
            has_crc: false,
            crc: 0,
            total_input_streams: 3,
            total_output_streams: 3,
            bind_pairs: vec![],
            packed_streams: vec![0, 1, 2],
            unpack_sizes: vec![1, 1, 1],
            num_unpack_sub_streams: 1,
        };
        let err = decode_folder(&block, &[vec![0], vec![0], vec![0]], &Password::empty(), &Config::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedTopology(_)));
    }

    #[cfg(feature = "aes256")]
    fn kdf(salt: &[u8], password: &[u8], num_cycles_power: u32) -> [u8; 32] {
        let mut sha = sha2::Sha256::default();
        let mut extra = [0u8; 8];
        for _ in 0..(1u32 << num_cycles_power) {
            sha.update(salt);
            sha.update(password);
            sha.update(extra);
            for item in &mut extra {
                *item = item.wrapping_add(1);
                if *item != 0 {
                    break;
                }
            }
        }
        sha.finalize().into()
    }

    #[cfg(feature = "aes256")]
    fn aes_main_block(ciphertext_len: usize, properties: Vec<u8>) -> Block {
        Block {
            coders: vec![
                coder(EncoderMethod::ID_AES256_SHA256, 1, 1, properties),
                coder(EncoderMethod::ID_COPY, 1, 1, vec![]),
            ],
            has_crc: false,
            crc: 0,
            total_input_streams: 2,
            total_output_streams: 2,
            bind_pairs: vec![BindPair {
                in_index: 1,
                out_index: 0,
            }],
            packed_streams: vec![0],
            unpack_sizes: vec![ciphertext_len as u64, ciphertext_len as u64],
            num_unpack_sub_streams: 1,
        }
    }

    #[cfg(feature = "aes256")]
    fn aes_main_block_with_declared_size(
        ciphertext_len: usize,
        declared_aes_len: usize,
        final_len: usize,
        properties: Vec<u8>,
    ) -> Block {
        let mut block = aes_main_block(ciphertext_len, properties);
        block.unpack_sizes = vec![declared_aes_len as u64, final_len as u64];
        block
    }

    #[test]
    #[cfg(feature = "aes256")]
    fn aes_padding_tolerance_feeds_only_the_declared_byte_count() {
        // True plaintext is 5 bytes, padded with zeros to one 16-byte AES
        // block. The AES coder's declared unpack size (5) is smaller than
        // the ciphertext length (16); the engine must feed only the first
        // 5 decrypted bytes to the downstream Copy coder, not all 16.
        let mut plaintext = b"hello".to_vec();
        plaintext.resize(16, 0);
        let password: Password = "pass".into();
        let iv = [3u8; 16];
        let key = kdf(&[], password.as_slice(), 0);

        let mut ciphertext = plaintext.clone();
        let mut enc = Aes256CbcEnc::new(&GenericArray::from(key), &iv.into());
        for block in ciphertext.chunks_mut(16) {
            enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        let mut properties = vec![0x40u8, 0x0Fu8];
        properties.extend_from_slice(&iv);

        let block = aes_main_block_with_declared_size(ciphertext.len(), 5, 5, properties);
        let out = decode_folder(&block, &[ciphertext], &password, &Config::default()).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    #[cfg(feature = "aes256")]
    fn aes_then_copy_round_trips_with_correct_password() {
        let plaintext = b"sixteen byte!!!!".to_vec();
        assert_eq!(plaintext.len() % 16, 0);
        let password: Password = "pass".into();
        let iv = [7u8; 16];
        let key = kdf(&[], password.as_slice(), 0);

        let mut ciphertext = plaintext.clone();
        let mut enc = Aes256CbcEnc::new(&GenericArray::from(key), &iv.into());
        for block in ciphertext.chunks_mut(16) {
            enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        // numCyclesPower=0, iv present (16 bytes), no salt: b0 = 0x40, b1 = 0x0F.
        let mut properties = vec![0x40u8, 0x0Fu8];
        properties.extend_from_slice(&iv);

        let block = aes_main_block(ciphertext.len(), properties);
        let out = decode_folder(&block, &[ciphertext], &password, &Config::default()).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    #[cfg(feature = "aes256")]
    fn aes_without_a_password_is_wrong_password() {
        let ciphertext = vec![0u8; 16];
        let mut properties = vec![0x40u8, 0x0Fu8];
        properties.extend_from_slice(&[0u8; 16]);
        let block = aes_main_block(ciphertext.len(), properties);
        let err =
            decode_folder(&block, &[ciphertext], &Password::empty(), &Config::default()).unwrap_err();
        assert!(matches!(err, Error::WrongPassword));
    }

    #[test]
    fn bcj2_pipeline_reassembles_untouched_stream() {
        let main = b"hello, world, no branches here".to_vec();
        let rc = vec![0x00u8, 0xFF, 0xFF, 0xFF, 0xFF];
        // The format's hard-wired S5 wiring: pack streams [2,6,1,0], bonds
        // (5,0),(4,1),(3,2) — coder 2's output feeds BCJ2's main input (3),
        // coder 1's feeds call (4), coder 0's feeds jump (5), and the fourth
        // pack stream feeds BCJ2's range-coder input (6) directly.
        let block = Block {
            coders: vec![
                coder(EncoderMethod::ID_COPY, 1, 1, vec![]),
                coder(EncoderMethod::ID_COPY, 1, 1, vec![]),
                coder(EncoderMethod::ID_COPY, 1, 1, vec![]),
                coder(EncoderMethod::ID_BCJ2, 4, 1, vec![]),
            ],
            has_crc: false,
            crc: 0,
            total_input_streams: 7,
            total_output_streams: 4,
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
            packed_streams: vec![2, 6, 1, 0],
            unpack_sizes: vec![0, 0, main.len() as u64, main.len() as u64],
            num_unpack_sub_streams: 1,
        };
        let packed = vec![main.clone(), rc, vec![], vec![]];
        let out = decode_folder(&block, &packed, &Password::empty(), &Config::default()).unwrap();
        assert_eq!(out, main);
    }

    #[test]
    fn lzma_single_coder_round_trips_plaintext() {
        let plaintext = b"The quick brown fox jumps over the lazy dog.\n".to_vec();
        let (props, packed) = lzma_compress(&plaintext);

        let block = Block {
            coders: vec![coder(EncoderMethod::ID_LZMA, 1, 1, props)],
            has_crc: false,
            crc: 0,
            total_input_streams: 1,
            total_output_streams: 1,
            bind_pairs: vec![],
            packed_streams: vec![0],
            unpack_sizes: vec![plaintext.len() as u64],
            num_unpack_sub_streams: 1,
        };
        let out = decode_folder(&block, &[packed], &Password::empty(), &Config::default()).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    fn bcj_then_lzma_round_trips_branch_converted_binary() {
        // A synthetic x86 .text-like buffer: a handful of 0xE8 (call)
        // instructions among filler bytes, long enough to exercise more
        // than one BCJ conversion window.
        let mut plaintext = Vec::with_capacity(256);
        for i in 0..256u32 {
            if i % 37 == 0 {
                plaintext.push(0xE8);
                plaintext.extend_from_slice(&i.to_le_bytes());
            } else {
                plaintext.push((i % 251) as u8);
            }
        }

        let mut filtered = Vec::new();
        let mut bcj = BCJWriter::new_x86(&mut filtered, 0);
        bcj.write_all(&plaintext).unwrap();
        bcj.finish().unwrap();

        let (props, packed) = lzma_compress(&filtered);

        // S3 FilterMain: coder 0 is the main (LZMA) decoder fed by the
        // packed stream, coder 1 is the branch filter fed by coder 0's
        // output (bond in_index=1, out_index=0).
        let block = Block {
            coders: vec![
                coder(EncoderMethod::ID_LZMA, 1, 1, props),
                coder(EncoderMethod::ID_BCJ_X86, 1, 1, vec![]),
            ],
            has_crc: false,
            crc: 0,
            total_input_streams: 2,
            total_output_streams: 2,
            bind_pairs: vec![BindPair {
                in_index: 1,
                out_index: 0,
            }],
            packed_streams: vec![0],
            unpack_sizes: vec![filtered.len() as u64, plaintext.len() as u64],
            num_unpack_sub_streams: 1,
        };
        let out = decode_folder(&block, &[packed], &Password::empty(), &Config::default()).unwrap();
        assert_eq!(out, plaintext);
    }
}
