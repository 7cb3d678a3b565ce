pub mod pii;
pub mod models;

pub use pii::{AesGcmCipher, Masked, PiiCipher, PiiError};
