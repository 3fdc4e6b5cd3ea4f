//! AES-128-XTS with the Nintendo sector tweak
//!
//! Switch content archives encrypt their header in 0x200-byte sectors. The
//! tweak for each sector is its index as a big-endian 128-bit integer, which
//! is the only difference from IEEE 1619 (little-endian). Both operations are
//! pure functions of `(key, sector index, data)`.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::{Error, Result};

const BLOCK: usize = 16;

/// Sector size used for content archive headers
pub const NCA_SECTOR_SIZE: usize = 0x200;
/// Encrypted header length of a content archive
pub const NCA_HEADER_SIZE: usize = 0xC00;

const NCA_MAGIC_OFFSET: usize = 0x200;
const PROGRAM_ID_OFFSET: usize = 0x210;
const RIGHTS_ID_OFFSET: usize = 0x230;

struct Xts {
    data: Aes128,
    tweak: Aes128,
}

impl Xts {
    fn new(key: &[u8; 32]) -> Self {
        Self {
            data: Aes128::new(GenericArray::from_slice(&key[..16])),
            tweak: Aes128::new(GenericArray::from_slice(&key[16..])),
        }
    }

    fn sector_tweak(&self, sector: u128) -> [u8; BLOCK] {
        let mut block = GenericArray::clone_from_slice(&sector.to_be_bytes());
        self.tweak.encrypt_block(&mut block);
        let mut tweak = [0u8; BLOCK];
        tweak.copy_from_slice(&block);
        tweak
    }

    fn apply(&self, data: &mut [u8], first_sector: u128, sector_size: usize, encrypt: bool) -> Result<()> {
        if sector_size == 0 || sector_size % BLOCK != 0 {
            return Err(Error::InvalidInput(format!(
                "sector size {sector_size:#x} is not a multiple of {BLOCK}"
            )));
        }
        if data.len() % sector_size != 0 {
            return Err(Error::InvalidInput(format!(
                "data length {:#x} is not a whole number of {sector_size:#x}-byte sectors",
                data.len()
            )));
        }

        for (sector, chunk) in (first_sector..).zip(data.chunks_exact_mut(sector_size)) {
            let mut tweak = self.sector_tweak(sector);
            for block in chunk.chunks_exact_mut(BLOCK) {
                xor(block, &tweak);
                let block_array = GenericArray::from_mut_slice(block);
                if encrypt {
                    self.data.encrypt_block(block_array);
                } else {
                    self.data.decrypt_block(block_array);
                }
                xor(block, &tweak);
                multiply_by_alpha(&mut tweak);
            }
        }
        Ok(())
    }
}

fn xor(block: &mut [u8], tweak: &[u8; BLOCK]) {
    for (byte, mask) in block.iter_mut().zip(tweak) {
        *byte ^= mask;
    }
}

/// Multiply by x in GF(2^128), little-endian byte order
fn multiply_by_alpha(tweak: &mut [u8; BLOCK]) {
    let mut carry = 0u8;
    for byte in tweak.iter_mut() {
        let next = *byte >> 7;
        *byte = (*byte << 1) | carry;
        carry = next;
    }
    if carry != 0 {
        tweak[0] ^= 0x87;
    }
}

/// Encrypt whole sectors, numbering the first one `first_sector`
pub fn encrypt_sectors(key: &[u8; 32], data: &[u8], first_sector: u128, sector_size: usize) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    Xts::new(key).apply(&mut out, first_sector, sector_size, true)?;
    Ok(out)
}

/// Decrypt whole sectors, numbering the first one `first_sector`
pub fn decrypt_sectors(key: &[u8; 32], data: &[u8], first_sector: u128, sector_size: usize) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    Xts::new(key).apply(&mut out, first_sector, sector_size, false)?;
    Ok(out)
}

/// Decrypt the 0xC00-byte header at the start of a content archive
pub fn decrypt_nca_header(header_key: &[u8; 32], archive: &[u8]) -> Result<Vec<u8>> {
    let header = archive.get(..NCA_HEADER_SIZE).ok_or_else(|| {
        Error::InvalidInput(format!("content archive shorter than {NCA_HEADER_SIZE:#x} bytes"))
    })?;
    decrypt_sectors(header_key, header, 0, NCA_SECTOR_SIZE)
}

/// Title id from a decrypted content archive header.
///
/// Uses the program id, or the rights id when the program id is zero.
pub fn nca_title_id(header: &[u8]) -> Option<String> {
    let magic = header.get(NCA_MAGIC_OFFSET..NCA_MAGIC_OFFSET + 4)?;
    if magic != b"NCA3" && magic != b"NCA2" {
        return None;
    }
    let program_bytes: [u8; 8] = header
        .get(PROGRAM_ID_OFFSET..PROGRAM_ID_OFFSET + 8)?
        .try_into()
        .ok()?;
    let program_id = u64::from_le_bytes(program_bytes);
    if program_id != 0 {
        return Some(format!("{program_id:016X}"));
    }

    let rights = header.get(RIGHTS_ID_OFFSET..RIGHTS_ID_OFFSET + 8)?;
    if rights.iter().all(|byte| *byte == 0) {
        return None;
    }
    Some(hex::encode_upper(rights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn matches_ieee_vector_for_sector_zero() {
        // XTS-AES-128 vector 1; sector 0 has the same tweak in either byte order
        let encrypted = encrypt_sectors(&[0; 32], &[0; 32], 0, 32).unwrap();
        assert_eq!(
            hex::encode(encrypted),
            "917cf69ebd68b2ec9b9fe9a3eadda692cd43d2f59598ed858c02c2652fbf922e"
        );
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        let key: [u8; 32] = std::array::from_fn(|i| u8::try_from(i).unwrap());
        let plain: Vec<u8> = (0..0x600u32).map(|i| u8::try_from(i % 251).unwrap()).collect();
        let encrypted = encrypt_sectors(&key, &plain, 7, 0x200).unwrap();
        assert_ne!(encrypted, plain);
        assert_eq!(decrypt_sectors(&key, &encrypted, 7, 0x200).unwrap(), plain);
    }

    #[test]
    fn each_sector_depends_only_on_its_index() {
        let key = [0x42; 32];
        let plain = vec![0xAA; 0x400];
        let whole = encrypt_sectors(&key, &plain, 0, 0x200).unwrap();
        let second = encrypt_sectors(&key, &plain[0x200..], 1, 0x200).unwrap();
        assert_eq!(&whole[0x200..], second.as_slice());
        assert_ne!(&whole[..0x200], &whole[0x200..]);
    }

    #[test]
    fn rejects_partial_sectors() {
        let error = encrypt_sectors(&[0; 32], &[0; 0x210], 0, 0x200).unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
        assert!(decrypt_sectors(&[0; 32], &[0; 32], 0, 24).is_err());
    }

    fn header_with(program_id: u64, rights: [u8; 16]) -> Vec<u8> {
        let mut header = vec![0u8; NCA_HEADER_SIZE];
        header[NCA_MAGIC_OFFSET..NCA_MAGIC_OFFSET + 4].copy_from_slice(b"NCA3");
        header[PROGRAM_ID_OFFSET..PROGRAM_ID_OFFSET + 8].copy_from_slice(&program_id.to_le_bytes());
        header[RIGHTS_ID_OFFSET..RIGHTS_ID_OFFSET + 16].copy_from_slice(&rights);
        header
    }

    #[test]
    fn title_id_from_program_id_or_rights_id() {
        let header = header_with(0x0100_ABCD_1234_0000, [0; 16]);
        assert_eq!(nca_title_id(&header).as_deref(), Some("0100ABCD12340000"));

        let mut rights = [0u8; 16];
        rights[..8].copy_from_slice(&[0x01, 0x00, 0x6F, 0x80, 0x02, 0x32, 0x60, 0x00]);
        let header = header_with(0, rights);
        assert_eq!(nca_title_id(&header).as_deref(), Some("01006F8002326000"));

        assert_eq!(nca_title_id(&header_with(0, [0; 16])), None);
        assert_eq!(nca_title_id(&[0u8; 0x100]), None);
    }

    #[test]
    fn encrypted_header_decodes_to_title() {
        let key = [0x11; 32];
        let header = header_with(0x0100_0000_0000_1000, [0; 16]);
        let encrypted = encrypt_sectors(&key, &header, 0, NCA_SECTOR_SIZE).unwrap();
        assert_eq!(nca_title_id(&encrypted), None);

        let decrypted = decrypt_nca_header(&key, &encrypted).unwrap();
        assert_eq!(nca_title_id(&decrypted).as_deref(), Some("0100000000001000"));
    }
}
