use std::{io, io::Read};

use byteorder::{LittleEndian, ReadBytesExt};
use lzma_rust2::{
    LZMA2Reader, LZMAReader,
    filter::{bcj::BCJReader, delta::DeltaReader},
    lzma2_get_memory_usage,
};
#[cfg(feature = "ppmd")]
use ppmd_rust::{
    PPMD7_MAX_MEM_SIZE, PPMD7_MAX_ORDER, PPMD7_MIN_MEM_SIZE, PPMD7_MIN_ORDER, Ppmd7Decoder,
};

#[cfg(feature = "aes256")]
use crate::encryption::Aes256Sha256Decoder;
use crate::{Config, Password, archive::EncoderMethod, block::Coder, error::Error};

/// A single-input, single-output primitive decoder or branch filter,
/// dispatched by tagged variant on the coder's method ID.
///
/// This is the building block the folder engine composes to run the main
/// coder of shapes S1/S3/S4/S5, and the filter stage of S3. BCJ2 (four
/// inputs) and the AES layer's key derivation are not represented here;
/// they are orchestrated separately by the folder engine.
#[allow(clippy::upper_case_acronyms)]
pub enum Decoder<R: Read> {
    COPY(R),
    LZMA(Box<LZMAReader<R>>),
    LZMA2(Box<LZMA2Reader<R>>),
    #[cfg(feature = "ppmd")]
    PPMD(Box<Ppmd7Decoder<R>>),
    BCJ(BCJReader<R>),
    Delta(DeltaReader<R>),
    #[cfg(feature = "zstd")]
    ZSTD(zstd::Decoder<'static, std::io::BufReader<R>>),
    #[cfg(feature = "aes256")]
    AES256Sha256(Box<Aes256Sha256Decoder<R>>),
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Decoder::COPY(r) => r.read(buf),
            Decoder::LZMA(r) => r.read(buf),
            Decoder::LZMA2(r) => r.read(buf),
            #[cfg(feature = "ppmd")]
            Decoder::PPMD(r) => r.read(buf),
            Decoder::BCJ(r) => r.read(buf),
            Decoder::Delta(r) => r.read(buf),
            #[cfg(feature = "zstd")]
            Decoder::ZSTD(r) => r.read(buf),
            #[cfg(feature = "aes256")]
            Decoder::AES256Sha256(r) => r.read(buf),
        }
    }
}

/// Builds a [`Decoder`] for a single coder, validating its properties and
/// enforcing the active [`Config`].
pub fn add_decoder<I: Read>(
    input: I,
    uncompressed_len: usize,
    coder: &Coder,
    #[allow(unused)] password: &Password,
    config: &Config,
) -> Result<Decoder<I>, Error> {
    let method = EncoderMethod::by_id(coder.encoder_method_id());
    let method = if let Some(m) = method {
        m
    } else {
        return Err(Error::UnsupportedCompressionMethod(format!(
            "{:?}",
            coder.encoder_method_id()
        )));
    };
    match method.id() {
        EncoderMethod::ID_COPY => Ok(Decoder::COPY(input)),
        EncoderMethod::ID_LZMA => {
            let dict_size = get_lzma_dic_size(coder)?;
            if coder.properties.is_empty() {
                return Err(Error::other("LZMA properties too short"));
            }
            let props = coder.properties[0];
            let lz =
                LZMAReader::new_with_props(input, uncompressed_len as _, props, dict_size, None)
                    .map_err(|e| Error::bad_password(e, !password.is_empty()))?;
            Ok(Decoder::LZMA(Box::new(lz)))
        }
        EncoderMethod::ID_LZMA2 => {
            if !config.lzma2_support {
                return Err(Error::unsupported("LZMA2 support disabled"));
            }
            let dic_size = get_lzma2_dic_size(coder)?;
            let mem_size = lzma2_get_memory_usage(dic_size) as usize;
            if mem_size > config.max_mem_limit_kb {
                return Err(Error::out_of_memory(config.max_mem_limit_kb, mem_size));
            }
            let lz = LZMA2Reader::new(input, dic_size, None);
            Ok(Decoder::LZMA2(Box::new(lz)))
        }
        #[cfg(feature = "ppmd")]
        EncoderMethod::ID_PPMD => {
            if !config.ppmd_support {
                return Err(Error::unsupported("PPMd support disabled"));
            }
            let (order, memory_size) = get_ppmd_order_memory_size(coder, config.max_mem_limit_kb)?;
            let ppmd = Ppmd7Decoder::new(input, order, memory_size)
                .map_err(|err| Error::other(err.to_string()))?;
            Ok(Decoder::PPMD(Box::new(ppmd)))
        }
        #[cfg(not(feature = "ppmd"))]
        EncoderMethod::ID_PPMD => Err(Error::unsupported("PPMd support not compiled in")),
        #[cfg(feature = "zstd")]
        EncoderMethod::ID_ZSTD => {
            let zs = zstd::Decoder::new(input)?;
            Ok(Decoder::ZSTD(zs))
        }
        #[cfg(not(feature = "zstd"))]
        EncoderMethod::ID_ZSTD => Err(Error::unsupported("Zstandard support not compiled in")),
        EncoderMethod::ID_BCJ_X86 => {
            require_filters(config)?;
            let pc = branch_filter_pc(coder)?;
            Ok(Decoder::BCJ(BCJReader::new_x86(input, pc)))
        }
        EncoderMethod::ID_BCJ_ARM => {
            require_filters(config)?;
            let pc = branch_filter_pc(coder)?;
            Ok(Decoder::BCJ(BCJReader::new_arm(input, pc)))
        }
        EncoderMethod::ID_BCJ_ARM64 => {
            require_filters(config)?;
            require_native_arm(config)?;
            let pc = branch_filter_pc(coder)?;
            if pc & 0x3 != 0 {
                return Err(Error::unsupported(
                    "ARM64 branch filter property's pc must be 4-byte aligned",
                ));
            }
            Ok(Decoder::BCJ(BCJReader::new_arm64(input, pc)))
        }
        EncoderMethod::ID_BCJ_ARM_THUMB => {
            require_filters(config)?;
            require_native_arm(config)?;
            let pc = branch_filter_pc(coder)?;
            Ok(Decoder::BCJ(BCJReader::new_arm_thumb(input, pc)))
        }
        EncoderMethod::ID_BCJ_PPC => {
            require_filters(config)?;
            let pc = branch_filter_pc(coder)?;
            Ok(Decoder::BCJ(BCJReader::new_ppc(input, pc)))
        }
        EncoderMethod::ID_BCJ_IA64 => {
            require_filters(config)?;
            let pc = branch_filter_pc(coder)?;
            Ok(Decoder::BCJ(BCJReader::new_ia64(input, pc)))
        }
        EncoderMethod::ID_BCJ_SPARC => {
            require_filters(config)?;
            let pc = branch_filter_pc(coder)?;
            Ok(Decoder::BCJ(BCJReader::new_sparc(input, pc)))
        }
        EncoderMethod::ID_BCJ_RISCV => {
            require_filters(config)?;
            let pc = branch_filter_pc(coder)?;
            if pc & 0x1 != 0 {
                return Err(Error::unsupported(
                    "RISC-V branch filter property's pc must be 2-byte aligned",
                ));
            }
            Ok(Decoder::BCJ(BCJReader::new_riscv(input, pc)))
        }
        EncoderMethod::ID_DELTA => {
            let d = if coder.properties.is_empty() {
                1
            } else {
                coder.properties[0].wrapping_add(1)
            };
            let de = DeltaReader::new(input, d as usize);
            Ok(Decoder::Delta(de))
        }
        #[cfg(feature = "aes256")]
        EncoderMethod::ID_AES256_SHA256 => {
            if password.is_empty() {
                return Err(Error::PasswordRequired);
            }
            let de = Aes256Sha256Decoder::new(input, &coder.properties, password)?;
            Ok(Decoder::AES256Sha256(Box::new(de)))
        }
        #[cfg(not(feature = "aes256"))]
        EncoderMethod::ID_AES256_SHA256 => Err(Error::unsupported("AES256 support not compiled in")),
        _ => Err(Error::UnsupportedCompressionMethod(
            method.name().to_string(),
        )),
    }
}

/// Parses a branch filter's `pc` property: either absent (pc = 0) or a
/// 4-byte little-endian value. Per-arch alignment (ARM64, RISC-V) is
/// validated by the caller, since it differs per method.
fn branch_filter_pc(coder: &Coder) -> Result<u32, Error> {
    match coder.properties.len() {
        0 => Ok(0),
        4 => Ok(u32::from_le_bytes(coder.properties[0..4].try_into().unwrap())),
        n => Err(Error::unsupported(format!(
            "branch filter properties must be 0 or 4 bytes, got {n}"
        ))),
    }
}

fn require_filters(config: &Config) -> Result<(), Error> {
    if config.filters_enabled {
        Ok(())
    } else {
        Err(Error::unsupported("branch filters disabled"))
    }
}

fn require_native_arm(config: &Config) -> Result<(), Error> {
    if config.native_arm_filters {
        Ok(())
    } else {
        Err(Error::unsupported(
            "ARM64/ARMT filters disabled for this target",
        ))
    }
}

#[cfg(feature = "ppmd")]
fn get_ppmd_order_memory_size(coder: &Coder, max_mem_limit_kb: usize) -> Result<(u32, u32), Error> {
    if coder.properties.len() < 5 {
        return Err(Error::other("PPMD properties too short"));
    }
    let order = coder.properties[0] as u32;
    let memory_size = u32::from_le_bytes([
        coder.properties[1],
        coder.properties[2],
        coder.properties[3],
        coder.properties[4],
    ]);

    if order < PPMD7_MIN_ORDER {
        return Err(Error::other("PPMD order smaller than PPMD7_MIN_ORDER"));
    }

    if order > PPMD7_MAX_ORDER {
        return Err(Error::other("PPMD order larger than PPMD7_MAX_ORDER"));
    }

    if memory_size < PPMD7_MIN_MEM_SIZE {
        return Err(Error::other(
            "PPMD memory size smaller than PPMD7_MIN_MEM_SIZE",
        ));
    }

    if memory_size > PPMD7_MAX_MEM_SIZE {
        return Err(Error::other(
            "PPMD memory size larger than PPMD7_MAX_MEM_SIZE",
        ));
    }

    if memory_size as usize > max_mem_limit_kb {
        return Err(Error::out_of_memory(max_mem_limit_kb, memory_size as usize));
    }

    Ok((order, memory_size))
}

fn get_lzma2_dic_size(coder: &Coder) -> Result<u32, Error> {
    if coder.properties.is_empty() {
        return Err(Error::other("LZMA2 properties too short"));
    }
    let dict_size_bits = 0xFF & coder.properties[0] as u32;
    if (dict_size_bits & (!0x3F)) != 0 {
        return Err(Error::other("Unsupported LZMA2 property bits"));
    }
    if dict_size_bits > 40 {
        return Err(Error::other("Dictionary larger than 4GiB maximum size"));
    }
    if dict_size_bits == 40 {
        return Ok(0xFFFFFFFF);
    }
    let size = (2 | (dict_size_bits & 0x1)) << (dict_size_bits / 2 + 11);
    Ok(size)
}

fn get_lzma_dic_size(coder: &Coder) -> io::Result<u32> {
    if coder.properties.len() < 5 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "LZMA properties too short",
        ));
    }
    let mut props = &coder.properties[1..5];
    props.read_u32::<LittleEndian>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coder_with_properties(id: &[u8], properties: Vec<u8>) -> Coder {
        let mut coder = Coder::default();
        coder.id_size = id.len();
        coder.decompression_method_id_mut().copy_from_slice(id);
        coder.num_in_streams = 1;
        coder.num_out_streams = 1;
        coder.properties = properties;
        coder
    }

    #[test]
    fn branch_filter_pc_defaults_to_zero_when_absent() {
        let coder = coder_with_properties(EncoderMethod::ID_BCJ_X86, vec![]);
        assert_eq!(branch_filter_pc(&coder).unwrap(), 0);
    }

    #[test]
    fn branch_filter_pc_parses_four_byte_little_endian_value() {
        let coder = coder_with_properties(EncoderMethod::ID_BCJ_ARM, vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(branch_filter_pc(&coder).unwrap(), 0x1234_5678);
    }

    #[test]
    fn branch_filter_pc_rejects_other_lengths() {
        let coder = coder_with_properties(EncoderMethod::ID_BCJ_X86, vec![0x01, 0x02]);
        let err = branch_filter_pc(&coder).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn arm64_filter_rejects_misaligned_pc() {
        let config = Config::default();
        let coder = coder_with_properties(EncoderMethod::ID_BCJ_ARM64, vec![0x01, 0x00, 0x00, 0x00]);
        let err =
            add_decoder(std::io::Cursor::new(&[][..]), 0, &coder, &Password::empty(), &config)
                .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn riscv_filter_rejects_misaligned_pc() {
        let config = Config::default();
        let coder = coder_with_properties(EncoderMethod::ID_BCJ_RISCV, vec![0x01, 0x00, 0x00, 0x00]);
        let err =
            add_decoder(std::io::Cursor::new(&[][..]), 0, &coder, &Password::empty(), &config)
                .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn x86_filter_accepts_aligned_pc_and_copies_input_through() {
        let config = Config::default();
        let coder = coder_with_properties(EncoderMethod::ID_BCJ_X86, vec![0x00, 0x10, 0x00, 0x00]);
        let data = b"no branches here".to_vec();
        let mut dec =
            add_decoder(std::io::Cursor::new(data.clone()), data.len(), &coder, &Password::empty(), &config)
                .unwrap();
        let mut out = Vec::new();
        dec.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }
}
