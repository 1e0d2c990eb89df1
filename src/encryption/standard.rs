//! The password algorithms of the standard security handler:
//! revisions 2-4 (RC4/AES-128, MD5-based) and 5-6 (AES-256,
//! SHA-2-based key derivation per ISO 32000-2).

use super::aes::Aes;
use super::rc4::rc4;
use crate::error::{PdfError, Result};
use crate::objects::ObjectId;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Password padding defined by the file format.
pub const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

/// Pad or truncate a password to exactly 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Algorithm 2: derive the file encryption key from an already padded
/// password and the `/Encrypt` fields.
#[allow(clippy::too_many_arguments)]
pub fn file_key_r2_4(
    padded_password: &[u8; 32],
    o: &[u8],
    p: i64,
    id0: &[u8],
    revision: u8,
    key_length: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(72 + id0.len());
    input.extend_from_slice(padded_password);
    input.extend_from_slice(o);
    input.extend_from_slice(&(p as i32).to_le_bytes());
    input.extend_from_slice(id0);
    if revision >= 4 && !encrypt_metadata {
        input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut hash = md5::compute(&input).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash[..key_length]).to_vec();
        }
    }
    hash.truncate(key_length);
    hash
}

/// Steps 1-3 of Algorithm 3: the RC4 key derived from the owner
/// password, also used when authenticating the owner.
fn owner_rc4_key(owner_password: &[u8], revision: u8, key_length: usize) -> Vec<u8> {
    let padded = pad_password(owner_password);
    let mut hash = md5::compute(padded).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash).to_vec();
        }
    }
    hash.truncate(if revision == 2 { 5 } else { key_length });
    hash
}

/// Algorithm 3: the `/O` entry. An empty owner password falls back to
/// the user password.
pub fn compute_o(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u8,
    key_length: usize,
) -> Vec<u8> {
    let effective_owner = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let key = owner_rc4_key(effective_owner, revision, key_length);
    let mut value = rc4(&key, &pad_password(user_password));
    if revision >= 3 {
        for pass in 1..=19u8 {
            let pass_key: Vec<u8> = key.iter().map(|&b| b ^ pass).collect();
            value = rc4(&pass_key, &value);
        }
    }
    value
}

/// Algorithms 4 and 5: the `/U` entry from the file key.
pub fn compute_u(file_key: &[u8], id0: &[u8], revision: u8) -> Vec<u8> {
    if revision == 2 {
        return rc4(file_key, &PADDING);
    }
    let mut input = PADDING.to_vec();
    input.extend_from_slice(id0);
    let hash = md5::compute(&input);
    let mut value = rc4(file_key, &hash.0);
    for pass in 1..=19u8 {
        let pass_key: Vec<u8> = file_key.iter().map(|&b| b ^ pass).collect();
        value = rc4(&pass_key, &value);
    }
    value.extend_from_slice(&[0u8; 16]);
    value
}

/// Algorithm 6: authenticate a user password, returning the file key.
#[allow(clippy::too_many_arguments)]
pub fn authenticate_user_r2_4(
    password: &[u8],
    o: &[u8],
    p: i64,
    id0: &[u8],
    u: &[u8],
    revision: u8,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    authenticate_padded_user(
        &pad_password(password),
        o,
        p,
        id0,
        u,
        revision,
        key_length,
        encrypt_metadata,
    )
}

#[allow(clippy::too_many_arguments)]
fn authenticate_padded_user(
    padded: &[u8; 32],
    o: &[u8],
    p: i64,
    id0: &[u8],
    u: &[u8],
    revision: u8,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = file_key_r2_4(padded, o, p, id0, revision, key_length, encrypt_metadata);
    let expected = compute_u(&key, id0, revision);
    let matches = if revision == 2 {
        expected.get(..32) == u.get(..32)
    } else {
        expected.get(..16) == u.get(..16)
    };
    matches.then_some(key)
}

/// Algorithm 7: authenticate an owner password by recovering the
/// padded user password from `/O`, returning the file key.
#[allow(clippy::too_many_arguments)]
pub fn authenticate_owner_r2_4(
    password: &[u8],
    o: &[u8],
    p: i64,
    id0: &[u8],
    u: &[u8],
    revision: u8,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = owner_rc4_key(password, revision, key_length);
    let mut candidate = o.to_vec();
    if revision == 2 {
        candidate = rc4(&key, &candidate);
    } else {
        for pass in (0..=19u8).rev() {
            let pass_key: Vec<u8> = key.iter().map(|&b| b ^ pass).collect();
            candidate = rc4(&pass_key, &candidate);
        }
    }
    let padded: [u8; 32] = candidate.get(..32)?.try_into().ok()?;
    authenticate_padded_user(&padded, o, p, id0, u, revision, key_length, encrypt_metadata)
}

/// Algorithm 1: the per-object key for revisions 2-4. AES mixes in the
/// `sAlT` constant.
pub fn object_key_r2_4(file_key: &[u8], id: ObjectId, aes: bool) -> Vec<u8> {
    let mut input = file_key.to_vec();
    input.extend_from_slice(&id.number().to_le_bytes()[..3]);
    input.extend_from_slice(&id.generation().to_le_bytes()[..2]);
    if aes {
        input.extend_from_slice(b"sAlT");
    }
    let hash = md5::compute(&input);
    let len = (file_key.len() + 5).min(16);
    hash[..len].to_vec()
}

/// Algorithm 2.B: the revision 6 password hash.
pub fn hash_r6(password: &[u8], salt: &[u8], extra: &[u8]) -> Result<[u8; 32]> {
    let mut k: Vec<u8> = {
        let mut h = Sha256::new();
        h.update(password);
        h.update(salt);
        h.update(extra);
        h.finalize().to_vec()
    };
    let mut round = 0usize;
    loop {
        let mut block = Vec::with_capacity((password.len() + k.len() + extra.len()) * 64);
        for _ in 0..64 {
            block.extend_from_slice(password);
            block.extend_from_slice(&k);
            block.extend_from_slice(extra);
        }
        let aes = Aes::new(&k[..16])?;
        let iv: [u8; 16] = k[16..32].try_into().unwrap();
        let encrypted = aes.encrypt_cbc(&iv, &block, false)?;
        let selector: usize = encrypted[..16].iter().map(|&b| b as usize).sum::<usize>() % 3;
        k = match selector {
            0 => Sha256::digest(&encrypted).to_vec(),
            1 => Sha384::digest(&encrypted).to_vec(),
            _ => Sha512::digest(&encrypted).to_vec(),
        };
        round += 1;
        if round >= 64 && (*encrypted.last().unwrap() as usize) <= round - 32 {
            break;
        }
    }
    Ok(k[..32].try_into().unwrap())
}

/// The revision 5 (deprecated Adobe extension) password hash.
fn hash_r5(password: &[u8], salt: &[u8], extra: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(password);
    h.update(salt);
    h.update(extra);
    h.finalize().into()
}

fn hash_r5_6(revision: u8, password: &[u8], salt: &[u8], extra: &[u8]) -> Result<[u8; 32]> {
    if revision >= 6 {
        hash_r6(password, salt, extra)
    } else {
        Ok(hash_r5(password, salt, extra))
    }
}

/// Truncate a password to the 127 UTF-8 bytes revision 5/6 allows.
pub fn truncate_password_r5_6(password: &[u8]) -> &[u8] {
    &password[..password.len().min(127)]
}

/// Authenticate against the 48-byte `/U` entry and unwrap the file key
/// from `/UE`. Returns the 32-byte file key.
pub fn authenticate_user_r5_6(
    password: &[u8],
    u: &[u8],
    ue: &[u8],
    revision: u8,
) -> Result<Option<Vec<u8>>> {
    if u.len() < 48 || ue.len() < 32 {
        return Err(PdfError::Encryption("truncated /U or /UE entry".into()));
    }
    let password = truncate_password_r5_6(password);
    let validation_salt = &u[32..40];
    let key_salt = &u[40..48];
    if hash_r5_6(revision, password, validation_salt, b"")?[..] != u[..32] {
        return Ok(None);
    }
    let intermediate = hash_r5_6(revision, password, key_salt, b"")?;
    let aes = Aes::new(&intermediate)?;
    let file_key = aes.decrypt_cbc(&[0u8; 16], &ue[..32], false)?;
    Ok(Some(file_key))
}

/// Authenticate the owner password against `/O` (which hashes over the
/// full `/U` string) and unwrap the file key from `/OE`.
pub fn authenticate_owner_r5_6(
    password: &[u8],
    o: &[u8],
    oe: &[u8],
    u: &[u8],
    revision: u8,
) -> Result<Option<Vec<u8>>> {
    if o.len() < 48 || oe.len() < 32 || u.len() < 48 {
        return Err(PdfError::Encryption("truncated /O, /OE or /U entry".into()));
    }
    let password = truncate_password_r5_6(password);
    let validation_salt = &o[32..40];
    let key_salt = &o[40..48];
    if hash_r5_6(revision, password, validation_salt, &u[..48])?[..] != o[..32] {
        return Ok(None);
    }
    let intermediate = hash_r5_6(revision, password, key_salt, &u[..48])?;
    let aes = Aes::new(&intermediate)?;
    let file_key = aes.decrypt_cbc(&[0u8; 16], &oe[..32], false)?;
    Ok(Some(file_key))
}

/// Freshly computed revision 6 authentication entries for writing.
pub struct R6Entries {
    pub u: Vec<u8>,
    pub ue: Vec<u8>,
    pub o: Vec<u8>,
    pub oe: Vec<u8>,
    pub perms: Vec<u8>,
}

/// Compute `/U`, `/UE`, `/O`, `/OE` and `/Perms` for a new revision 6
/// encryption dictionary. The salts must be 8 bytes each; callers
/// derive them deterministically so output is reproducible.
pub fn compute_r6_entries(
    user_password: &[u8],
    owner_password: &[u8],
    file_key: &[u8; 32],
    salts: &[[u8; 8]; 4],
    p: i64,
    encrypt_metadata: bool,
) -> Result<R6Entries> {
    let user_password = truncate_password_r5_6(user_password);
    let owner_password = truncate_password_r5_6(owner_password);

    // 32-byte hash, then validation salt, then key salt.
    let mut u = hash_r6(user_password, &salts[0], b"")?.to_vec();
    u.extend_from_slice(&salts[0]);
    u.extend_from_slice(&salts[1]);

    let intermediate_u = hash_r6(user_password, &salts[1], b"")?;
    let ue = Aes::new(&intermediate_u)?.encrypt_cbc(&[0u8; 16], file_key, false)?;

    let mut o = hash_r6(owner_password, &salts[2], &u[..48])?.to_vec();
    o.extend_from_slice(&salts[2]);
    o.extend_from_slice(&salts[3]);

    let intermediate_o = hash_r6(owner_password, &salts[3], &u[..48])?;
    let oe = Aes::new(&intermediate_o)?.encrypt_cbc(&[0u8; 16], file_key, false)?;

    let mut perms_block = [0u8; 16];
    perms_block[..4].copy_from_slice(&(p as i32).to_le_bytes());
    perms_block[4..8].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    perms_block[8] = if encrypt_metadata { b'T' } else { b'F' };
    perms_block[9..12].copy_from_slice(b"adb");
    let perms = Aes::new(&file_key[..])?.encrypt_block_ecb(&perms_block).to_vec();

    Ok(R6Entries { u, ue, o, oe, perms })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_password() {
        let padded = pad_password(b"usr");
        assert_eq!(&padded[..3], b"usr");
        assert_eq!(&padded[3..], &PADDING[..29]);
        assert_eq!(pad_password(b""), PADDING);
    }

    #[test]
    fn test_r3_user_auth_round_trip() {
        let id0 = b"\x01\x02\x03\x04\x05\x06\x07\x08";
        let p = -4i64;
        let o = compute_o(b"owner", b"user", 3, 16);
        let padded_user = pad_password(b"user");
        let key = file_key_r2_4(&padded_user, &o, p, id0, 3, 16, true);
        let u = compute_u(&key, id0, 3);
        assert_eq!(u.len(), 32);

        let recovered =
            authenticate_user_r2_4(b"user", &o, p, id0, &u, 3, 16, true).expect("user auth");
        assert_eq!(recovered, key);
        assert!(authenticate_user_r2_4(b"wrong", &o, p, id0, &u, 3, 16, true).is_none());
    }

    #[test]
    fn test_r3_owner_auth_recovers_key() {
        let id0 = b"idbytes0";
        let p = -4i64;
        let o = compute_o(b"own", b"usr", 3, 16);
        let key = file_key_r2_4(&pad_password(b"usr"), &o, p, id0, 3, 16, true);
        let u = compute_u(&key, id0, 3);

        let via_owner =
            authenticate_owner_r2_4(b"own", &o, p, id0, &u, 3, 16, true).expect("owner auth");
        assert_eq!(via_owner, key);
        assert!(authenticate_owner_r2_4(b"bad", &o, p, id0, &u, 3, 16, true).is_none());
    }

    #[test]
    fn test_r2_round_trip() {
        let id0 = b"abcdefgh";
        let p = -1i64;
        let o = compute_o(b"o", b"u", 2, 5);
        let key = file_key_r2_4(&pad_password(b"u"), &o, p, id0, 2, 5, true);
        assert_eq!(key.len(), 5);
        let u = compute_u(&key, id0, 2);
        assert!(authenticate_user_r2_4(b"u", &o, p, id0, &u, 2, 5, true).is_some());
        assert!(authenticate_owner_r2_4(b"o", &o, p, id0, &u, 2, 5, true).is_some());
    }

    #[test]
    fn test_object_key_lengths() {
        let id = ObjectId::new(7, 0);
        assert_eq!(object_key_r2_4(&[0u8; 5], id, false).len(), 10);
        assert_eq!(object_key_r2_4(&[0u8; 16], id, true).len(), 16);
    }

    #[test]
    fn test_object_key_varies_by_object() {
        let key = [9u8; 16];
        let a = object_key_r2_4(&key, ObjectId::new(1, 0), true);
        let b = object_key_r2_4(&key, ObjectId::new(2, 0), true);
        assert_ne!(a, b);
    }

    #[test]
    fn test_r6_round_trip() {
        let file_key = [0x42u8; 32];
        let salts = [[1u8; 8], [2u8; 8], [3u8; 8], [4u8; 8]];
        let entries =
            compute_r6_entries(b"usr", b"own", &file_key, &salts, -4, true).unwrap();
        assert_eq!(entries.u.len(), 48);
        assert_eq!(entries.o.len(), 48);

        let via_user = authenticate_user_r5_6(b"usr", &entries.u, &entries.ue, 6)
            .unwrap()
            .expect("user auth");
        assert_eq!(via_user, file_key);

        let via_owner =
            authenticate_owner_r5_6(b"own", &entries.o, &entries.oe, &entries.u, 6)
                .unwrap()
                .expect("owner auth");
        assert_eq!(via_owner, file_key);

        assert!(authenticate_user_r5_6(b"nope", &entries.u, &entries.ue, 6)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_hash_r6_is_deterministic() {
        let a = hash_r6(b"pw", b"saltsalt", b"").unwrap();
        let b = hash_r6(b"pw", b"saltsalt", b"").unwrap();
        assert_eq!(a, b);
        let c = hash_r6(b"pw", b"other..s", b"").unwrap();
        assert_ne!(a, c);
    }
}
