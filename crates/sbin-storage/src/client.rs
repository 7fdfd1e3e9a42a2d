//! Submit/retrieve orchestration: options → envelope → store → link, and back.

use sbin_core::config::ClientConfig;
use sbin_core::{SbinConfig, SbinResult, SubmitOptions};
use sbin_crypto::{CryptoError, Envelope, EnvelopeBuilder, Link, Secret};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::store::{unix_now, SecretStore, StoredMeta};

pub struct SecretClient<S> {
    store: S,
    builder: EnvelopeBuilder,
    client: ClientConfig,
}

impl<S: SecretStore> SecretClient<S> {
    /// KDF parameters come from `[crypto]`, size limit and link base from
    /// `[client]`.
    pub fn new(store: S, config: &SbinConfig) -> SbinResult<Self> {
        let builder = EnvelopeBuilder::new()
            .with_kdf_params(config.crypto.kdf_params()?)
            .with_max_frame_bytes(config.client.max_secret_bytes);
        Ok(Self::with_builder(store, config.client.clone(), builder))
    }

    pub fn with_builder(store: S, client: ClientConfig, builder: EnvelopeBuilder) -> Self {
        Self {
            store,
            builder,
            client,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Encrypt `secret`, upload the envelope and return its share link.
    ///
    /// Options are validated before any key derivation or upload.
    pub async fn submit(&self, secret: &Secret, options: &SubmitOptions) -> SbinResult<Link> {
        let resolved = options.resolve(&self.client)?;
        let (envelope, material) = self.builder.build(secret, options.password())?;

        let bytes = envelope.to_bytes();
        let meta = StoredMeta::new(&resolved, bytes.len(), unix_now());
        let id = self.store.put(bytes, &meta).await?;
        let link = Link::encode(&id, material, &self.client.base_url())?;

        info!(
            secret_id = %id,
            expires = %resolved.expires,
            burn_after = ?resolved.burn_after,
            password = resolved.password_protected,
            attachments = secret.attachments.len(),
            "secret submitted"
        );
        Ok(link)
    }

    /// Fetch and decrypt the secret behind `link`. Counts as one read.
    pub async fn retrieve(
        &self,
        link: &Link,
        password: Option<&SecretString>,
    ) -> SbinResult<Secret> {
        let password = password.filter(|p| !p.expose_secret().is_empty());
        // fail before the fetch so a missing password does not burn a read
        if link.key_material().is_password_protected() && password.is_none() {
            return Err(CryptoError::PasswordRequired.into());
        }

        let bytes = self.store.get(link.secret_id()).await?;
        let envelope = Envelope::from_bytes(&bytes)?;
        let secret = self.builder.open(&envelope, link.key_material(), password)?;

        info!(
            secret_id = %link.secret_id(),
            attachments = secret.attachments.len(),
            "secret retrieved"
        );
        Ok(secret)
    }

    /// [`retrieve`](Self::retrieve) from a link string.
    pub async fn retrieve_url(
        &self,
        url: &str,
        password: Option<&SecretString>,
    ) -> SbinResult<Secret> {
        let link = Link::decode(url)?;
        self.retrieve(&link, password).await
    }
}
