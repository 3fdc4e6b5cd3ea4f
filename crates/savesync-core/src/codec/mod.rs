//! Decoders for encrypted console containers

pub mod xts;

pub use xts::{decrypt_nca_header, decrypt_sectors, encrypt_sectors, nca_title_id};
