use std::{
    borrow::Cow,
    io::{Read, Seek, Write},
};

use aes::{
    Aes256,
    cipher::{BlockDecryptMut, KeyIvInit, generic_array::GenericArray},
};
use sha2::Digest;
use zeroize::Zeroize;

use crate::Password;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub(crate) struct Aes256Sha256Decoder<R> {
    cipher: Cipher,
    input: R,
    done: bool,
    obuffer: Vec<u8>,
    ostart: usize,
    ofinish: usize,
    pos: usize,
}

impl<R: Read> Aes256Sha256Decoder<R> {
    pub(crate) fn new(
        input: R,
        properties: &[u8],
        password: &Password,
    ) -> Result<Self, crate::Error> {
        let cipher = Cipher::from_properties(properties, password.as_slice())?;
        Ok(Self {
            input,
            cipher,
            done: false,
            obuffer: Default::default(),
            ostart: 0,
            ofinish: 0,
            pos: 0,
        })
    }

    fn get_more_data(&mut self) -> std::io::Result<usize> {
        if self.done {
            Ok(0)
        } else {
            self.ofinish = 0;
            self.ostart = 0;
            self.obuffer.clear();
            let mut ibuffer = [0; 512];
            let readin = self.input.read(&mut ibuffer)?;
            if readin == 0 {
                self.done = true;
                self.ofinish = self.cipher.do_final(&mut self.obuffer)?;
                Ok(self.ofinish)
            } else {
                let n = self
                    .cipher
                    .update(&mut ibuffer[..readin], &mut self.obuffer)?;
                self.ofinish = n;
                Ok(n)
            }
        }
    }
}

impl<R: Read> Read for Aes256Sha256Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.ostart >= self.ofinish {
            let mut n: usize;
            n = self.get_more_data()?;
            while n == 0 && !self.done {
                n = self.get_more_data()?;
            }
            if n == 0 {
                return Ok(0);
            }
        }

        if buf.is_empty() {
            return Ok(0);
        }
        let buf_len = self.ofinish - self.ostart;
        let size = buf_len.min(buf.len());
        buf[..size].copy_from_slice(&self.obuffer[self.ostart..self.ostart + size]);
        self.ostart += size;
        self.pos += size;
        Ok(size)
    }
}

impl<R: Read + Seek> Seek for Aes256Sha256Decoder<R> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        let len = self.ofinish - self.ostart;
        match pos {
            std::io::SeekFrom::Start(p) => {
                let n = (p as i64 - self.pos as i64).min(len as i64);

                if n < 0 {
                    Ok(0)
                } else {
                    self.ostart += n as usize;
                    Ok(p)
                }
            }
            std::io::SeekFrom::End(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "Aes256 decoder unsupport seek from end",
            )),
            std::io::SeekFrom::Current(n) => {
                let n = n.min(len as i64);
                if n < 0 {
                    Ok(0)
                } else {
                    self.ostart += n as usize;
                    Ok(self.pos as u64 + n as u64)
                }
            }
        }
    }
}

fn get_aes_key(properties: &[u8], password: &[u8]) -> Result<([u8; 32], [u8; 16]), crate::Error> {
    // Empty properties mean numCyclesPower = 0, empty salt, empty IV: not a
    // malformed input.
    if properties.is_empty() {
        return derive_key(0, &[], [0u8; 16], password);
    }

    let properties = match properties.len() {
        1 => {
            // It seems that there are encrypted files that include the K_END (0x00) symbol as a
            // property byte.
            let mut prop = vec![0u8; 2];
            prop[0] = properties[0];
            Cow::Owned(prop)
        }
        _ => Cow::Borrowed(properties),
    };

    let b0 = properties[0];
    let num_cycles_power = b0 & 63;
    let b1 = properties[1];
    let iv_size = (((b0 >> 6) & 1) + (b1 & 15)) as usize;
    let salt_size = (((b0 >> 7) & 1) + (b1 >> 4)) as usize;
    if 2 + salt_size + iv_size > properties.len() {
        return Err(crate::Error::other("Salt size + IV size too long"));
    }
    let mut salt = vec![0u8; salt_size];
    salt.copy_from_slice(&properties[2..(2 + salt_size)]);
    let mut iv = [0u8; 16];
    iv[0..iv_size].copy_from_slice(&properties[(2 + salt_size)..(2 + salt_size + iv_size)]);
    derive_key(num_cycles_power, &salt, iv, password)
}

fn derive_key(
    num_cycles_power: u8,
    salt: &[u8],
    iv: [u8; 16],
    password: &[u8],
) -> Result<([u8; 32], [u8; 16]), crate::Error> {
    if password.is_empty() {
        return Err(crate::Error::PasswordRequired);
    }
    let salt_size = salt.len();
    let aes_key = if num_cycles_power == 0x3F {
        log::warn!(
            "AES256 stream uses the legacy trivial key schedule (numCyclesPower=0x3F); \
             the password contributes no iterated hashing"
        );
        let mut aes_key = [0u8; 32];
        aes_key[..salt_size].copy_from_slice(salt);
        let n = password.len().min(aes_key.len() - salt_size);
        aes_key[salt_size..n + salt_size].copy_from_slice(&password[0..n]);
        aes_key
    } else if num_cycles_power > 24 {
        return Err(crate::Error::unsupported(
            "AES256 key derivation cycle count exceeds the supported maximum (2^24 rounds)",
        ));
    } else {
        let mut sha = sha2::Sha256::default();
        let mut extra = [0u8; 8];
        for _ in 0..(1u32 << num_cycles_power) {
            sha.update(&salt);
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
    };
    Ok((aes_key, iv))
}

struct Cipher {
    dec: Aes256CbcDec,
    buf: Vec<u8>,
}

impl Cipher {
    fn from_properties(properties: &[u8], password: &[u8]) -> Result<Self, crate::Error> {
        let (aes_key, iv) = get_aes_key(properties, password)?;
        Ok(Self {
            dec: Aes256CbcDec::new(&GenericArray::from(aes_key), &iv.into()),
            buf: Default::default(),
        })
    }

    fn update<W: Write>(&mut self, mut data: &mut [u8], mut output: W) -> std::io::Result<usize> {
        let mut n = 0;
        if !self.buf.is_empty() {
            assert!(self.buf.len() < 16);
            let end = 16 - self.buf.len();
            self.buf.extend_from_slice(&data[..end]);
            data = &mut data[end..];
            let block = GenericArray::from_mut_slice(&mut self.buf);
            self.dec.decrypt_block_mut(block);
            let out = block.as_slice();
            output.write_all(out)?;
            n += out.len();
            self.buf.clear();
        }

        for a in data.chunks_mut(16) {
            if a.len() < 16 {
                self.buf.extend_from_slice(a);
                break;
            }
            let block = GenericArray::from_mut_slice(a);
            self.dec.decrypt_block_mut(block);
            let out = block.as_slice();
            output.write_all(out)?;
            n += out.len();
        }
        Ok(n)
    }

    /// CBC only decrypts whole 16-byte blocks; a well-formed 7z AES stream's
    /// packed size is always a multiple of 16, but some producers pad it
    /// with a few trailing junk bytes. Rather than fail the whole folder
    /// over bytes that fall after every coder downstream has already read
    /// as much plaintext as it needs, we drop the incomplete tail block.
    fn do_final(&mut self, output: &mut Vec<u8>) -> std::io::Result<usize> {
        if !self.buf.is_empty() {
            log::warn!(
                "AES256 ciphertext length wasn't a multiple of the block size; \
                 dropping {} trailing byte(s)",
                self.buf.len()
            );
            self.buf.zeroize();
        }
        output.clear();
        Ok(0)
    }
}

impl Drop for Cipher {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_trivial_key_schedule_is_deterministic() {
        let password: Password = "1234".into();
        let mut properties = vec![0x3Fu8, 0x00];
        properties.extend_from_slice(&[7u8; 8]);
        let (key_a, iv_a) = get_aes_key(&properties, password.as_slice()).unwrap();
        let (key_b, iv_b) = get_aes_key(&properties, password.as_slice()).unwrap();
        assert_eq!(key_a, key_b);
        assert_eq!(iv_a, iv_b);
    }

    #[test]
    fn excessive_cycle_count_is_unsupported() {
        let password: Password = "1234".into();
        let mut properties = vec![25u8, 0x00];
        properties.extend_from_slice(&[7u8; 8]);
        let err = get_aes_key(&properties, password.as_slice()).unwrap_err();
        assert!(matches!(err, crate::Error::Unsupported(_)));
    }

    #[test]
    fn empty_password_is_rejected() {
        let password = Password::empty();
        let mut properties = vec![0x01u8, 0x00];
        properties.extend_from_slice(&[7u8; 8]);
        let err = get_aes_key(&properties, password.as_slice()).unwrap_err();
        assert!(matches!(err, crate::Error::PasswordRequired));
    }

    #[test]
    fn empty_properties_synthesize_zero_cycles_and_zeroed_iv() {
        let password: Password = "1234".into();
        let (key, iv) = get_aes_key(&[], password.as_slice()).unwrap();
        assert_eq!(iv, [0u8; 16]);
        let expected_key = derive_key(0, &[], [0u8; 16], password.as_slice()).unwrap().0;
        assert_eq!(key, expected_key);
    }
}
