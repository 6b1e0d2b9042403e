//! Password protection with the PDF standard security handler
//!
//! Output documents are encrypted with revision 3 of the standard handler
//! (128-bit RC4). Input documents protected with revision 2 or 3 are
//! decrypted here as well; newer handlers (AES) are handed to lopdf.

use std::collections::{BTreeMap, HashSet};

use lopdf::xref::XrefEntry;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, ObjectStream, Reader, StringFormat};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Password padding string from the PDF specification
const PAD_BYTES: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// All permissions granted
const ALL_PERMISSIONS: i32 = -4;

/// Something that can protect a finished document before it is written
pub trait Encryptor {
    fn encrypt(&self, doc: &mut Document) -> Result<()>;
}

/// RC4 stream cipher
pub struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (i, slot) in state.iter_mut().enumerate() {
            *slot = i as u8;
        }
        if !key.is_empty() {
            let mut j = 0u8;
            for i in 0..256 {
                j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
                state.swap(i, j as usize);
            }
        }
        Self { state, i: 0, j: 0 }
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let k = self.state
                [self.state[self.i as usize].wrapping_add(self.state[self.j as usize]) as usize];
            *byte ^= k;
        }
    }

    /// One-shot transform (encryption and decryption are the same operation)
    pub fn transform(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        Rc4::new(key).apply(&mut out);
        out
    }
}

/// Parameters of a standard security handler, revision 2 or 3
#[derive(Debug, Clone)]
pub struct StandardSecurity {
    pub revision: i64,
    /// Key length in bytes
    pub key_length: usize,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    pub permissions: i32,
    pub file_id: Vec<u8>,
}

impl StandardSecurity {
    /// Derive O and U for a new document (algorithms 3 and 5)
    pub fn create(user_password: &str, owner_password: &str, file_id: &[u8]) -> Self {
        let mut security = Self {
            revision: 3,
            key_length: 16,
            owner_hash: Vec::new(),
            user_hash: Vec::new(),
            permissions: ALL_PERMISSIONS,
            file_id: file_id.to_vec(),
        };

        let owner = if owner_password.is_empty() { user_password } else { owner_password };
        let owner_key = security.owner_key(owner.as_bytes());
        let mut owner_hash = Rc4::transform(&owner_key, &pad_password(user_password.as_bytes()));
        if security.revision >= 3 {
            for round in 1..=19u8 {
                let key: Vec<u8> = owner_key.iter().map(|b| b ^ round).collect();
                owner_hash = Rc4::transform(&key, &owner_hash);
            }
        }
        security.owner_hash = owner_hash;

        let file_key = security.file_key(user_password.as_bytes());
        security.user_hash = security.user_hash_for(&file_key);
        security
    }

    /// Read the handler parameters from an encryption dictionary
    pub fn from_dict(dict: &Dictionary, file_id: &[u8]) -> Result<Self> {
        let malformed = |what: &str| Error::Encryption(format!("encryption dictionary: {what}"));

        let version = dict.get(b"V").and_then(Object::as_i64).unwrap_or(0);
        let revision = dict
            .get(b"R")
            .and_then(Object::as_i64)
            .map_err(|_| malformed("missing /R"))?;
        let key_bits = match version {
            1 => 40,
            _ => dict.get(b"Length").and_then(Object::as_i64).unwrap_or(40),
        };
        if !(40..=128).contains(&key_bits) || key_bits % 8 != 0 {
            return Err(malformed("unsupported key length"));
        }
        let owner_hash = dict
            .get(b"O")
            .and_then(Object::as_str)
            .map_err(|_| malformed("missing /O"))?
            .to_vec();
        let user_hash = dict
            .get(b"U")
            .and_then(Object::as_str)
            .map_err(|_| malformed("missing /U"))?
            .to_vec();
        if owner_hash.len() < 32 || user_hash.len() < 32 {
            return Err(malformed("short /O or /U"));
        }
        let permissions = dict
            .get(b"P")
            .and_then(Object::as_i64)
            .map_err(|_| malformed("missing /P"))? as i32;

        Ok(Self {
            revision,
            key_length: (key_bits / 8) as usize,
            owner_hash: owner_hash[..32].to_vec(),
            user_hash: user_hash[..32].to_vec(),
            permissions,
            file_id: file_id.to_vec(),
        })
    }

    /// Encryption dictionary describing this handler
    pub fn to_dict(&self) -> Dictionary {
        dictionary! {
            "Filter" => "Standard",
            "V" => if self.revision >= 3 { 2i64 } else { 1i64 },
            "R" => self.revision,
            "Length" => (self.key_length * 8) as i64,
            "O" => Object::String(self.owner_hash.clone(), StringFormat::Hexadecimal),
            "U" => Object::String(self.user_hash.clone(), StringFormat::Hexadecimal),
            "P" => self.permissions as i64,
        }
    }

    /// File encryption key for a user password (algorithm 2)
    pub fn file_key(&self, user_password: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(100);
        input.extend_from_slice(&pad_password(user_password));
        input.extend_from_slice(&self.owner_hash);
        input.extend_from_slice(&(self.permissions as u32).to_le_bytes());
        input.extend_from_slice(&self.file_id);

        let mut digest = md5::compute(&input).0;
        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5::compute(&digest[..self.key_length]).0;
            }
        }
        digest[..self.key_length].to_vec()
    }

    /// Key that wraps the user password into /O (algorithm 3, steps 1 to 4)
    fn owner_key(&self, owner_password: &[u8]) -> Vec<u8> {
        let mut digest = md5::compute(pad_password(owner_password)).0;
        if self.revision >= 3 {
            for _ in 0..50 {
                digest = md5::compute(digest).0;
            }
        }
        digest[..self.key_length].to_vec()
    }

    /// Expected /U value for a file key (algorithms 4 and 5)
    fn user_hash_for(&self, file_key: &[u8]) -> Vec<u8> {
        if self.revision < 3 {
            return Rc4::transform(file_key, &PAD_BYTES);
        }

        let mut input = PAD_BYTES.to_vec();
        input.extend_from_slice(&self.file_id);
        let mut hash = Rc4::transform(file_key, &md5::compute(&input).0);
        for round in 1..=19u8 {
            let key: Vec<u8> = file_key.iter().map(|b| b ^ round).collect();
            hash = Rc4::transform(&key, &hash);
        }
        hash.extend_from_slice(&PAD_BYTES[..16]);
        hash
    }

    /// Check a user password and return the file key (algorithm 6)
    pub fn authenticate_user(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = self.file_key(password);
        let expected = self.user_hash_for(&key);
        let compared = if self.revision >= 3 { 16 } else { 32 };
        (expected[..compared] == self.user_hash[..compared]).then_some(key)
    }

    /// Check an owner password and return the file key (algorithm 7)
    pub fn authenticate_owner(&self, password: &[u8]) -> Option<Vec<u8>> {
        let owner_key = self.owner_key(password);
        let mut user_password = self.owner_hash.clone();
        if self.revision >= 3 {
            for round in (0..=19u8).rev() {
                let key: Vec<u8> = owner_key.iter().map(|b| b ^ round).collect();
                user_password = Rc4::transform(&key, &user_password);
            }
        } else {
            user_password = Rc4::transform(&owner_key, &user_password);
        }
        self.authenticate_user(&user_password)
    }

    /// Accept either the user or the owner password
    pub fn authenticate(&self, password: &[u8]) -> Option<Vec<u8>> {
        self.authenticate_user(password)
            .or_else(|| self.authenticate_owner(password))
    }
}

/// Per-object RC4 key
pub fn object_key(file_key: &[u8], id: ObjectId) -> Vec<u8> {
    let mut input = file_key.to_vec();
    input.extend_from_slice(&id.0.to_le_bytes()[..3]);
    input.extend_from_slice(&id.1.to_le_bytes()[..2]);
    let digest = md5::compute(&input).0;
    let length = (file_key.len() + 5).min(16);
    digest[..length].to_vec()
}

/// Encrypts every string and stream of a document with a password
#[derive(Debug, Clone)]
pub struct StandardEncryptor {
    user_password: String,
    owner_password: String,
}

impl StandardEncryptor {
    /// The owner password is the user password
    pub fn new(password: impl Into<String>) -> Self {
        let password = password.into();
        Self {
            owner_password: password.clone(),
            user_password: password,
        }
    }

    pub fn with_owner_password(mut self, owner_password: impl Into<String>) -> Self {
        self.owner_password = owner_password.into();
        self
    }
}

impl Encryptor for StandardEncryptor {
    fn encrypt(&self, doc: &mut Document) -> Result<()> {
        if doc.trailer.has(b"Encrypt") {
            return Err(Error::Encryption("document is already encrypted".to_string()));
        }
        let file_id = first_file_id(&doc.trailer)
            .ok_or_else(|| Error::Encryption("document has no file identifier".to_string()))?;

        let security = StandardSecurity::create(&self.user_password, &self.owner_password, &file_id);
        let file_key = security.file_key(self.user_password.as_bytes());

        for (&id, object) in doc.objects.iter_mut() {
            crypt_object(&object_key(&file_key, id), object);
        }

        let encrypt_id = doc.add_object(Object::Dictionary(security.to_dict()));
        doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
        debug!(objects = doc.objects.len(), "encrypted document with RC4-128");
        Ok(())
    }
}

/// Load a document and open it with `password`
pub fn load_document(bytes: &[u8], password: &str) -> Result<Document> {
    let mut doc = read_objects(bytes)?;
    decrypt_document(&mut doc, password)?;
    Ok(doc)
}

/// Load every object of a document without asking for a password
///
/// lopdf only builds the objects of a protected file when the empty password
/// opens it, in which case they come back already decrypted. Otherwise it
/// keeps just the /Encrypt dictionary, so the remaining objects are read
/// here from the cross-reference table and stay encrypted.
pub fn read_objects(bytes: &[u8]) -> Result<Document> {
    let doc = Document::load_mem(bytes).map_err(|e| Error::Parse(e.to_string()))?;
    if !doc.trailer.has(b"Encrypt") || doc.encryption_state.is_some() {
        return Ok(doc);
    }

    let start = bytes.windows(5).position(|w| w == b"%PDF-").unwrap_or(0);
    let reader = Reader {
        buffer: &bytes[start..],
        document: doc,
        encryption_state: None,
        raw_objects: BTreeMap::new(),
    };

    let mut loaded = BTreeMap::new();
    for (&number, entry) in &reader.document.reference_table.entries {
        let XrefEntry::Normal { generation, .. } = *entry else {
            continue;
        };
        let id = (number, generation);
        if reader.document.objects.contains_key(&id) {
            continue;
        }
        match reader.get_object(id, &mut HashSet::new()) {
            Ok(object) => {
                loaded.insert(id, object);
            }
            Err(e) => warn!("skipping object {} {}: {}", id.0, id.1, e),
        }
    }

    let mut doc = reader.document;
    debug!(objects = loaded.len(), "read encrypted objects");
    doc.objects.extend(loaded);
    Ok(doc)
}

/// Remove standard security from a loaded document
///
/// Documents without an /Encrypt entry are left alone, as are documents
/// lopdf already decrypted while loading (only the /Encrypt entry is
/// dropped). A password that opens neither the user nor the owner side is an
/// authorization error.
pub fn decrypt_document(doc: &mut Document, password: &str) -> Result<()> {
    if doc.encryption_state.is_some() {
        if let Some(Object::Reference(id)) = doc.trailer.remove(b"Encrypt") {
            doc.objects.remove(&id);
        }
        return Ok(());
    }

    let (encrypt_id, dict) = match doc.trailer.get(b"Encrypt") {
        Err(_) => return Ok(()),
        Ok(Object::Reference(id)) => {
            let dict = doc
                .get_dictionary(*id)
                .map_err(|_| Error::Encryption("encryption dictionary is missing".to_string()))?
                .clone();
            (Some(*id), dict)
        }
        Ok(Object::Dictionary(dict)) => (None, dict.clone()),
        Ok(_) => return Err(Error::Encryption("malformed /Encrypt entry".to_string())),
    };

    let filter = dict.get(b"Filter").and_then(Object::as_name).unwrap_or(b"");
    let version = dict.get(b"V").and_then(Object::as_i64).unwrap_or(0);
    if filter != b"Standard" || !(1..=2).contains(&version) {
        debug!(version, "delegating decryption to lopdf");
        return doc.decrypt(password).map_err(|e| match e {
            lopdf::Error::Decryption(lopdf::encryption::DecryptionError::IncorrectPassword) => {
                Error::Authorization
            }
            other => Error::Encryption(other.to_string()),
        });
    }

    let file_id = first_file_id(&doc.trailer).unwrap_or_default();
    let security = StandardSecurity::from_dict(&dict, &file_id)?;
    let file_key = security
        .authenticate(password.as_bytes())
        .ok_or(Error::Authorization)?;

    for (&id, object) in doc.objects.iter_mut() {
        if Some(id) == encrypt_id || is_xref_stream(object) {
            continue;
        }
        crypt_object(&object_key(&file_key, id), object);
    }

    if let Some(id) = encrypt_id {
        doc.objects.remove(&id);
    }
    doc.trailer.remove(b"Encrypt");
    unpack_object_streams(doc);
    debug!(revision = security.revision, "decrypted input document");
    Ok(())
}

/// Add the objects held in object streams, which can only be parsed once
/// their container is decrypted
fn unpack_object_streams(doc: &mut Document) {
    let mut unpacked = BTreeMap::new();
    for object in doc.objects.values_mut() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !stream.dict.has_type(b"ObjStm") {
            continue;
        }
        match ObjectStream::new(stream) {
            Ok(objects) => unpacked.extend(objects.objects),
            Err(e) => warn!("unreadable object stream: {}", e),
        }
    }
    for (id, object) in unpacked {
        doc.objects.entry(id).or_insert(object);
    }
}

/// Apply RC4 to every string and stream body inside an object
fn crypt_object(key: &[u8], object: &mut Object) {
    match object {
        Object::String(bytes, _) => Rc4::new(key).apply(bytes),
        Object::Array(items) => items.iter_mut().for_each(|item| crypt_object(key, item)),
        Object::Dictionary(dict) => crypt_dictionary(key, dict),
        Object::Stream(stream) => {
            crypt_dictionary(key, &mut stream.dict);
            let content = Rc4::transform(key, &stream.content);
            stream.set_content(content);
        }
        _ => {}
    }
}

fn crypt_dictionary(key: &[u8], dict: &mut Dictionary) {
    for (_, value) in dict.iter_mut() {
        crypt_object(key, value);
    }
}

fn is_xref_stream(object: &Object) -> bool {
    match object {
        Object::Stream(stream) => {
            matches!(stream.dict.get(b"Type").and_then(Object::as_name), Ok(b"XRef"))
        }
        _ => false,
    }
}

fn first_file_id(trailer: &Dictionary) -> Option<Vec<u8>> {
    trailer
        .get(b"ID")
        .and_then(Object::as_array)
        .ok()
        .and_then(|ids| ids.first())
        .and_then(|id| id.as_str().ok())
        .map(|id| id.to_vec())
}

/// Pad or truncate a password to 32 bytes
fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PAD_BYTES[..32 - len]);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Stream;

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_rc4_known_vectors() {
        assert_eq!(to_hex(&Rc4::transform(b"Key", b"Plaintext")), "bbf316e8d940af0ad3");
        assert_eq!(to_hex(&Rc4::transform(b"Wiki", b"pedia")), "1021bf0420");
        assert_eq!(
            to_hex(&Rc4::transform(b"Secret", b"Attack at dawn")),
            "45a01f645fc35b383552544b9bf5"
        );
    }

    #[test]
    fn test_rc4_is_symmetric() {
        let data = b"stream content".to_vec();
        let once = Rc4::transform(b"k", &data);
        assert_ne!(once, data);
        assert_eq!(Rc4::transform(b"k", &once), data);
    }

    #[test]
    fn test_pad_password() {
        assert_eq!(pad_password(b""), PAD_BYTES);
        let padded = pad_password(b"abc");
        assert_eq!(&padded[..3], b"abc");
        assert_eq!(&padded[3..], &PAD_BYTES[..29]);
        assert_eq!(pad_password(&[b'x'; 40]), [b'x'; 32]);
    }

    #[test]
    fn test_user_and_owner_authentication() {
        let security = StandardSecurity::create("user", "owner", b"0123456789abcdef");
        let key = security.file_key(b"user");

        assert_eq!(security.authenticate_user(b"user"), Some(key.clone()));
        assert_eq!(security.authenticate_owner(b"owner"), Some(key.clone()));
        assert_eq!(security.authenticate(b"owner"), Some(key));
        assert!(security.authenticate(b"wrong").is_none());
        assert!(security.authenticate(b"").is_none());
    }

    #[test]
    fn test_dictionary_round_trip() {
        let security = StandardSecurity::create("pw", "", b"id");
        let parsed = StandardSecurity::from_dict(&security.to_dict(), b"id").unwrap();
        assert_eq!(parsed.revision, 3);
        assert_eq!(parsed.key_length, 16);
        assert!(parsed.authenticate(b"pw").is_some());
    }

    #[test]
    fn test_encrypt_then_decrypt_document() {
        let mut doc = Document::with_version("1.5");
        let stream_id = doc.add_object(Stream::new(dictionary! {}, b"0 0 m 10 10 l S".to_vec()));
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Quarterly report"),
        });
        doc.trailer.set(
            "ID",
            Object::Array(vec![
                Object::String(b"fileid0123456789".to_vec(), StringFormat::Hexadecimal),
                Object::String(b"fileid0123456789".to_vec(), StringFormat::Hexadecimal),
            ]),
        );

        StandardEncryptor::new("secret").encrypt(&mut doc).unwrap();
        let stream = doc.get_object(stream_id).unwrap().as_stream().unwrap();
        assert_ne!(stream.content, b"0 0 m 10 10 l S".to_vec());

        let mut wrong = doc.clone();
        assert!(matches!(
            decrypt_document(&mut wrong, "nope"),
            Err(Error::Authorization)
        ));

        decrypt_document(&mut doc, "secret").unwrap();
        assert!(!doc.trailer.has(b"Encrypt"));
        let stream = doc.get_object(stream_id).unwrap().as_stream().unwrap();
        assert_eq!(stream.content, b"0 0 m 10 10 l S".to_vec());
        let title = doc.get_dictionary(info_id).unwrap().get(b"Title").unwrap();
        assert_eq!(title.as_str().unwrap(), b"Quarterly report");
    }

    #[test]
    fn test_encrypt_requires_file_id() {
        let mut doc = Document::with_version("1.5");
        let err = StandardEncryptor::new("pw").encrypt(&mut doc).unwrap_err();
        assert!(matches!(err, Error::Encryption(_)));
    }

    #[test]
    fn test_object_key_length() {
        assert_eq!(object_key(&[0u8; 5], (1, 0)).len(), 10);
        assert_eq!(object_key(&[0u8; 16], (7, 0)).len(), 16);
    }
}
