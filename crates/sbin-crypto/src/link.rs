//! Share links: `<base_url>/<secret_id>#<base64url(key material)>`
//!
//! Fragment payload (binary, then base64url without padding):
//! ```text
//! [1: format version][1: kdf id][32: link key]
//! [kdf id != 0: 16-byte salt][kdf params]
//! ```
//!
//! The key lives only in the fragment, which browsers and HTTP clients never
//! send to the server.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{KdfAlgorithm, KdfRecord, KeyMaterial, KDF_ID_NONE};
use crate::wire::Reader;
use crate::KEY_SIZE;

pub const LINK_FORMAT_VERSION: u8 = 1;

/// A share link. `Display` renders the full URL including the key, `Debug`
/// does not.
#[derive(Clone)]
pub struct Link {
    base_url: String,
    secret_id: String,
    key_material: KeyMaterial,
}

impl Link {
    /// Combine a server-issued id with the key material from `build`.
    pub fn encode(
        secret_id: &str,
        key_material: KeyMaterial,
        base_url: &str,
    ) -> CryptoResult<Self> {
        validate_secret_id(secret_id)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_id: secret_id.to_string(),
            key_material,
        })
    }

    /// Parse a link back into its id and key material.
    ///
    /// Accepts `https://host/path/<id>#<fragment>` (a `?query` on the path is
    /// ignored) and the bare form `<id>#<fragment>`.
    pub fn decode(url: &str) -> CryptoResult<Self> {
        let (location, fragment) = url
            .trim()
            .split_once('#')
            .ok_or_else(|| invalid("missing fragment"))?;
        if fragment.is_empty() {
            return Err(invalid("empty fragment"));
        }

        let path = location.split_once('?').map_or(location, |(p, _)| p);
        let path = path.trim_end_matches('/');

        let (base_url, secret_id) = match path.find("://") {
            Some(scheme_end) => {
                let after_scheme = &path[scheme_end + 3..];
                if !after_scheme.contains('/') {
                    return Err(invalid("missing secret id in path"));
                }
                path.rsplit_once('/')
                    .ok_or_else(|| invalid("missing secret id in path"))?
            }
            None => match path.rsplit_once('/') {
                Some(parts) => parts,
                None => ("", path),
            },
        };
        validate_secret_id(secret_id)?;

        Ok(Self {
            base_url: base_url.to_string(),
            secret_id: secret_id.to_string(),
            key_material: decode_key_material(fragment)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    pub fn key_material(&self) -> &KeyMaterial {
        &self.key_material
    }

    /// The link without its fragment: safe to log or send to a server.
    pub fn location(&self) -> String {
        if self.base_url.is_empty() {
            self.secret_id.clone()
        } else {
            format!("{}/{}", self.base_url, self.secret_id)
        }
    }

    /// base64url fragment carrying the key material.
    pub fn fragment(&self) -> String {
        encode_key_material(&self.key_material)
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.location(), self.fragment())
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("base_url", &self.base_url)
            .field("secret_id", &self.secret_id)
            .field("fragment", &"[REDACTED]")
            .finish()
    }
}

impl std::str::FromStr for Link {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Link::decode(s)
    }
}

/// Pack key material into its fragment form.
pub fn encode_key_material(material: &KeyMaterial) -> String {
    let mut buf = Zeroizing::new(Vec::with_capacity(
        2 + KEY_SIZE + KdfRecord::encoded_len(KdfAlgorithm::Argon2id),
    ));
    buf.push(LINK_FORMAT_VERSION);
    buf.push(material.kdf().map_or(KDF_ID_NONE, |r| r.algorithm().id()));
    buf.extend_from_slice(material.key());
    if let Some(record) = material.kdf() {
        record.write(&mut buf);
    }
    URL_SAFE_NO_PAD.encode(buf.as_slice())
}

/// Unpack a fragment. The decoded length must match the encoding for its
/// KDF id exactly.
pub fn decode_key_material(fragment: &str) -> CryptoResult<KeyMaterial> {
    let bytes = Zeroizing::new(
        URL_SAFE_NO_PAD
            .decode(fragment)
            .map_err(|_| invalid("fragment is not base64url"))?,
    );
    let mut r = Reader::new(&bytes);

    let version = r.u8().ok_or_else(|| invalid("empty fragment"))?;
    if version != LINK_FORMAT_VERSION {
        return Err(invalid(format!("unsupported link format version {version}")));
    }

    let kdf_id = r.u8().ok_or_else(|| invalid("truncated fragment"))?;
    let algorithm = match kdf_id {
        KDF_ID_NONE => None,
        id => Some(KdfAlgorithm::from_id(id).ok_or_else(|| invalid(format!("unknown kdf id {id}")))?),
    };

    let expected = 2 + KEY_SIZE + algorithm.map_or(0, KdfRecord::encoded_len);
    if bytes.len() != expected {
        return Err(invalid(format!(
            "fragment decodes to {} bytes, expected {expected}",
            bytes.len()
        )));
    }

    let key = r
        .take_array::<KEY_SIZE>()
        .ok_or_else(|| invalid("truncated key"))?;
    let kdf = match algorithm {
        None => None,
        Some(algorithm) => Some(
            KdfRecord::read(algorithm, &mut r)
                .ok_or_else(|| invalid("out-of-range kdf params"))?,
        ),
    };

    Ok(KeyMaterial::from_parts(key, kdf))
}

fn validate_secret_id(id: &str) -> CryptoResult<()> {
    if id.is_empty() {
        return Err(invalid("empty secret id"));
    }
    if id
        .chars()
        .any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace() || c.is_control())
    {
        return Err(invalid("secret id contains reserved characters"));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> CryptoError {
    CryptoError::InvalidLink(msg.into())
}
