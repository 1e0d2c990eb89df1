//! The standard security handler.
//!
//! Derives the file encryption key from a password and the `/Encrypt`
//! dictionary, derives per-object keys, and performs the transparent
//! string/stream decryption on load and re-encryption on write.
//! Supported: revisions 2-4 (RC4 40-128 bit, AES-128) and 5-6
//! (AES-256).

mod aes;
mod permissions;
mod rc4;
mod standard;

pub use self::aes::Aes;
pub use self::permissions::Permissions;
pub use self::rc4::{rc4, Rc4};

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, PdfString};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// How strings or streams are transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    Rc4,
    Aes128,
    Aes256,
}

/// Algorithm selection when adding encryption to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    /// RC4 with a 40- or 128-bit key (V1/R2 or V2/R3).
    Rc4 { key_bits: u16 },
    /// AES-128 via crypt filters (V4/R4).
    Aes128,
    /// AES-256 (V5/R6, ISO 32000-2).
    Aes256,
}

/// Options for encrypting a document on write.
#[derive(Debug, Clone)]
pub struct EncryptionOptions {
    pub user_password: String,
    pub owner_password: String,
    pub algorithm: EncryptionAlgorithm,
    pub permissions: Permissions,
}

impl EncryptionOptions {
    pub fn aes_128(user_password: &str, owner_password: &str) -> Self {
        Self {
            user_password: user_password.into(),
            owner_password: owner_password.into(),
            algorithm: EncryptionAlgorithm::Aes128,
            permissions: Permissions::all_allowed(),
        }
    }

    pub fn aes_256(user_password: &str, owner_password: &str) -> Self {
        Self {
            algorithm: EncryptionAlgorithm::Aes256,
            ..Self::aes_128(user_password, owner_password)
        }
    }
}

/// An unlocked standard security handler.
pub struct SecurityHandler {
    revision: u8,
    version: u8,
    file_key: Vec<u8>,
    string_method: CryptMethod,
    stream_method: CryptMethod,
    encrypt_metadata: bool,
    permissions: Permissions,
}

impl SecurityHandler {
    /// Authenticate against an `/Encrypt` dictionary with the given
    /// password (tried as user, then as owner). `id0` is the first
    /// element of the trailer `/ID`.
    pub fn unlock(encrypt: &Dictionary, id0: &[u8], password: &str) -> Result<Self> {
        let filter = encrypt.get_name("Filter").ok_or_else(|| {
            PdfError::Encryption("missing /Filter in encryption dictionary".into())
        })?;
        if filter != "Standard" {
            return Err(PdfError::Encryption(format!(
                "unsupported security handler /{filter}"
            )));
        }
        let version = encrypt.get_integer("V").unwrap_or(0) as u8;
        let revision = encrypt.get_integer("R").unwrap_or(0) as u8;
        let o = string_entry(encrypt, "O")?;
        let u = string_entry(encrypt, "U")?;
        let p = encrypt.get_integer("P").unwrap_or(-1);
        let permissions = Permissions::from_p_value(p);
        let encrypt_metadata = encrypt
            .get("EncryptMetadata")
            .and_then(Object::as_bool)
            .unwrap_or(true);
        let key_length = match encrypt.get_integer("Length") {
            Some(bits) if (40..=256).contains(&bits) && bits % 8 == 0 => bits as usize / 8,
            None => 5,
            Some(bits) => {
                return Err(PdfError::Encryption(format!("invalid /Length {bits}")))
            }
        };
        let password = password.as_bytes();

        let (file_key, string_method, stream_method) = match (version, revision) {
            (1, 2) | (2, 2) | (2, 3) | (4, 4) => {
                let key_length = if version == 1 { 5 } else { key_length };
                let (string_method, stream_method) = if version == 4 {
                    crypt_filter_methods(encrypt)?
                } else {
                    (CryptMethod::Rc4, CryptMethod::Rc4)
                };
                let key = standard::authenticate_user_r2_4(
                    password,
                    &o,
                    p,
                    id0,
                    &u,
                    revision,
                    key_length,
                    encrypt_metadata,
                )
                .or_else(|| {
                    standard::authenticate_owner_r2_4(
                        password,
                        &o,
                        p,
                        id0,
                        &u,
                        revision,
                        key_length,
                        encrypt_metadata,
                    )
                })
                .ok_or_else(|| PdfError::Encryption("wrong password".into()))?;
                (key, string_method, stream_method)
            }
            (5, 5) | (5, 6) => {
                let ue = string_entry(encrypt, "UE")?;
                let oe = string_entry(encrypt, "OE")?;
                let key = standard::authenticate_user_r5_6(password, &u, &ue, revision)?
                    .map(Ok)
                    .unwrap_or_else(|| {
                        standard::authenticate_owner_r5_6(password, &o, &oe, &u, revision)
                            .transpose()
                            .unwrap_or(Err(PdfError::Encryption("wrong password".into())))
                    })?;
                let (string_method, stream_method) = crypt_filter_methods(encrypt)?;
                verify_perms(encrypt, &key);
                (key, string_method, stream_method)
            }
            (v, r) => {
                return Err(PdfError::Encryption(format!(
                    "unsupported encryption V {v} R {r}"
                )))
            }
        };
        debug!(version, revision, "security handler unlocked");

        Ok(Self {
            revision,
            version,
            file_key,
            string_method,
            stream_method,
            encrypt_metadata,
            permissions,
        })
    }

    /// Build a handler and its `/Encrypt` dictionary for writing.
    pub fn setup(options: &EncryptionOptions, id0: &[u8]) -> Result<(Self, Dictionary)> {
        let user = options.user_password.as_bytes();
        let owner = options.owner_password.as_bytes();
        let p = options.permissions.to_p_value();
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("Standard"));
        dict.set("P", p);

        let handler = match options.algorithm {
            EncryptionAlgorithm::Rc4 { key_bits } => {
                let (version, revision, key_length) = match key_bits {
                    40 => (1u8, 2u8, 5usize),
                    128 => (2, 3, 16),
                    other => {
                        return Err(PdfError::Encryption(format!(
                            "RC4 key must be 40 or 128 bits, got {other}"
                        )))
                    }
                };
                let o = standard::compute_o(owner, user, revision, key_length);
                let key = standard::file_key_r2_4(
                    &standard::pad_password(user),
                    &o,
                    p,
                    id0,
                    revision,
                    key_length,
                    true,
                );
                let u = standard::compute_u(&key, id0, revision);
                dict.set("V", version as i64);
                dict.set("R", revision as i64);
                dict.set("Length", (key_length * 8) as i64);
                dict.set("O", Object::String(PdfString::new(o)));
                dict.set("U", Object::String(PdfString::new(u)));
                Self {
                    revision,
                    version,
                    file_key: key,
                    string_method: CryptMethod::Rc4,
                    stream_method: CryptMethod::Rc4,
                    encrypt_metadata: true,
                    permissions: options.permissions,
                }
            }
            EncryptionAlgorithm::Aes128 => {
                let (version, revision, key_length) = (4u8, 4u8, 16usize);
                let o = standard::compute_o(owner, user, revision, key_length);
                let key = standard::file_key_r2_4(
                    &standard::pad_password(user),
                    &o,
                    p,
                    id0,
                    revision,
                    key_length,
                    true,
                );
                let u = standard::compute_u(&key, id0, revision);
                dict.set("V", 4);
                dict.set("R", 4);
                dict.set("Length", 128);
                dict.set("O", Object::String(PdfString::new(o)));
                dict.set("U", Object::String(PdfString::new(u)));
                set_crypt_filter(&mut dict, "AESV2", 16);
                Self {
                    revision,
                    version,
                    file_key: key,
                    string_method: CryptMethod::Aes128,
                    stream_method: CryptMethod::Aes128,
                    encrypt_metadata: true,
                    permissions: options.permissions,
                }
            }
            EncryptionAlgorithm::Aes256 => {
                // The file key and salts are derived deterministically
                // from the passwords and /ID so repeated serialization
                // is byte-identical.
                let file_key = derive_bytes(&[b"key", owner, user, id0]);
                let salts = [
                    derive_salt(&[b"uv", user, id0]),
                    derive_salt(&[b"uk", user, id0]),
                    derive_salt(&[b"ov", owner, id0]),
                    derive_salt(&[b"ok", owner, id0]),
                ];
                let entries =
                    standard::compute_r6_entries(user, owner, &file_key, &salts, p, true)?;
                dict.set("V", 5);
                dict.set("R", 6);
                dict.set("Length", 256);
                dict.set("O", Object::String(PdfString::new(entries.o)));
                dict.set("U", Object::String(PdfString::new(entries.u)));
                dict.set("OE", Object::String(PdfString::new(entries.oe)));
                dict.set("UE", Object::String(PdfString::new(entries.ue)));
                dict.set("Perms", Object::String(PdfString::new(entries.perms)));
                set_crypt_filter(&mut dict, "AESV3", 32);
                Self {
                    revision: 6,
                    version: 5,
                    file_key: file_key.to_vec(),
                    string_method: CryptMethod::Aes256,
                    stream_method: CryptMethod::Aes256,
                    encrypt_metadata: true,
                    permissions: options.permissions,
                }
            }
        };
        Ok((handler, dict))
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn encrypts_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    /// Whether any actual transformation happens.
    pub fn is_identity(&self) -> bool {
        self.string_method == CryptMethod::Identity
            && self.stream_method == CryptMethod::Identity
    }

    fn object_key(&self, id: ObjectId, method: CryptMethod) -> Vec<u8> {
        match method {
            CryptMethod::Aes256 => self.file_key.clone(),
            CryptMethod::Aes128 => standard::object_key_r2_4(&self.file_key, id, true),
            _ => standard::object_key_r2_4(&self.file_key, id, false),
        }
    }

    fn apply(
        &self,
        method: CryptMethod,
        id: ObjectId,
        data: &[u8],
        encrypting: bool,
    ) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(id, method), data)),
            CryptMethod::Aes128 | CryptMethod::Aes256 => {
                let key = self.object_key(id, method);
                let aes = Aes::new(&key)?;
                if encrypting {
                    // Deterministic IV so serialization is reproducible.
                    let mut iv_input = key.clone();
                    iv_input.extend_from_slice(&(data.len() as u64).to_le_bytes());
                    iv_input.extend_from_slice(&data[..data.len().min(16)]);
                    let iv = md5::compute(&iv_input).0;
                    let mut out = iv.to_vec();
                    out.extend(aes.encrypt_cbc(&iv, data, true)?);
                    Ok(out)
                } else {
                    if data.len() < 16 {
                        return Err(PdfError::Encryption(
                            "AES payload shorter than its IV".into(),
                        ));
                    }
                    let iv: [u8; 16] = data[..16].try_into().unwrap();
                    aes.decrypt_cbc(&iv, &data[16..], true)
                }
            }
        }
    }

    pub fn decrypt_string(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.string_method, id, data, false)
    }

    pub fn encrypt_string(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.string_method, id, data, true)
    }

    pub fn decrypt_stream_data(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.stream_method, id, data, false)
    }

    pub fn encrypt_stream_data(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.stream_method, id, data, true)
    }
}

fn string_entry(dict: &Dictionary, key: &str) -> Result<Vec<u8>> {
    dict.get(key)
        .and_then(Object::as_string)
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| PdfError::Encryption(format!("missing /{key} entry")))
}

/// Resolve `/StrF` and `/StmF` through the `/CF` crypt-filter map.
fn crypt_filter_methods(encrypt: &Dictionary) -> Result<(CryptMethod, CryptMethod)> {
    let method_of = |filter_name: Option<&crate::objects::Name>| -> Result<CryptMethod> {
        let name = match filter_name {
            // Absent means Identity.
            None => return Ok(CryptMethod::Identity),
            Some(name) if name == "Identity" => return Ok(CryptMethod::Identity),
            Some(name) => name,
        };
        let cf = encrypt
            .get_dict("CF")
            .and_then(|cf| {
                name.as_str()
                    .and_then(|n| cf.get(n))
                    .and_then(Object::as_dict)
            })
            .ok_or_else(|| PdfError::Encryption(format!("crypt filter /{name} not in /CF")))?;
        match cf.get_name("CFM").map(|n| n.as_bytes()) {
            Some(b"V2") => Ok(CryptMethod::Rc4),
            Some(b"AESV2") => Ok(CryptMethod::Aes128),
            Some(b"AESV3") => Ok(CryptMethod::Aes256),
            Some(b"None") | None => Ok(CryptMethod::Identity),
            Some(other) => Err(PdfError::Encryption(format!(
                "unsupported crypt filter method /{}",
                String::from_utf8_lossy(other)
            ))),
        }
    };
    Ok((
        method_of(encrypt.get_name("StrF"))?,
        method_of(encrypt.get_name("StmF"))?,
    ))
}

fn set_crypt_filter(dict: &mut Dictionary, cfm: &str, length: i64) {
    let mut std_cf = Dictionary::new();
    std_cf.set("CFM", Object::name(cfm));
    std_cf.set("AuthEvent", Object::name("DocOpen"));
    std_cf.set("Length", length);
    let mut cf = Dictionary::new();
    cf.set("StdCF", Object::Dictionary(std_cf));
    dict.set("CF", Object::Dictionary(cf));
    dict.set("StmF", Object::name("StdCF"));
    dict.set("StrF", Object::name("StdCF"));
}

/// Check the `/Perms` entry against the unwrapped key; a mismatch is
/// logged rather than fatal, matching how viewers behave.
fn verify_perms(encrypt: &Dictionary, file_key: &[u8]) {
    let Some(perms) = encrypt.get("Perms").and_then(Object::as_string) else {
        return;
    };
    let bytes = perms.as_bytes();
    if bytes.len() < 16 || file_key.len() != 32 {
        warn!("malformed /Perms entry");
        return;
    }
    let block: [u8; 16] = bytes[..16].try_into().unwrap();
    match Aes::new(file_key) {
        Ok(aes) => {
            let decoded = aes.decrypt_block_ecb(&block);
            if &decoded[9..12] != b"adb" {
                warn!("/Perms entry fails validation, possibly tampered");
            }
        }
        Err(_) => warn!("cannot validate /Perms entry"),
    }
}

fn derive_bytes(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0u8]);
    }
    hasher.finalize().into()
}

fn derive_salt(parts: &[&[u8]]) -> [u8; 8] {
    derive_bytes(parts)[..8].try_into().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(options: EncryptionOptions, password: &str) {
        let id0 = b"document-id-0000";
        let (handler, dict) = SecurityHandler::setup(&options, id0).unwrap();
        let id = ObjectId::new(12, 0);

        let secret = b"attack at dawn";
        let encrypted = handler.encrypt_string(id, secret).unwrap();
        assert_ne!(encrypted.as_slice(), secret.as_slice());
        assert_eq!(handler.decrypt_string(id, &encrypted).unwrap(), secret);

        // A fresh handler unlocked from the dictionary agrees.
        let reopened = SecurityHandler::unlock(&dict, id0, password).unwrap();
        assert_eq!(reopened.decrypt_string(id, &encrypted).unwrap(), secret);
    }

    #[test]
    fn test_rc4_40_round_trip() {
        round_trip(
            EncryptionOptions {
                user_password: "usr".into(),
                owner_password: "own".into(),
                algorithm: EncryptionAlgorithm::Rc4 { key_bits: 40 },
                permissions: Permissions::all_allowed(),
            },
            "usr",
        );
    }

    #[test]
    fn test_rc4_128_owner_unlock() {
        round_trip(
            EncryptionOptions {
                user_password: "usr".into(),
                owner_password: "own".into(),
                algorithm: EncryptionAlgorithm::Rc4 { key_bits: 128 },
                permissions: Permissions::all_allowed(),
            },
            "own",
        );
    }

    #[test]
    fn test_aes_128_round_trip_both_passwords() {
        round_trip(EncryptionOptions::aes_128("usr", "own"), "usr");
        round_trip(EncryptionOptions::aes_128("usr", "own"), "own");
    }

    #[test]
    fn test_aes_256_round_trip_both_passwords() {
        round_trip(EncryptionOptions::aes_256("usr", "own"), "usr");
        round_trip(EncryptionOptions::aes_256("usr", "own"), "own");
    }

    #[test]
    fn test_wrong_password_rejected() {
        let id0 = b"id";
        let (_, dict) =
            SecurityHandler::setup(&EncryptionOptions::aes_128("usr", "own"), id0).unwrap();
        let result = SecurityHandler::unlock(&dict, id0, "nope");
        assert!(matches!(result, Err(PdfError::Encryption(_))));
    }

    #[test]
    fn test_streams_and_strings_use_object_keys() {
        let id0 = b"id";
        let (handler, _) =
            SecurityHandler::setup(&EncryptionOptions::aes_128("u", "o"), id0).unwrap();
        let data = b"same plaintext";
        let a = handler.encrypt_stream_data(ObjectId::new(1, 0), data).unwrap();
        let b = handler.encrypt_stream_data(ObjectId::new(2, 0), data).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_encryption_is_deterministic() {
        let id0 = b"id";
        let (handler, _) =
            SecurityHandler::setup(&EncryptionOptions::aes_256("u", "o"), id0).unwrap();
        let id = ObjectId::new(3, 0);
        let a = handler.encrypt_string(id, b"stable").unwrap();
        let b = handler.encrypt_string(id, b"stable").unwrap();
        assert_eq!(a, b);
    }
}
