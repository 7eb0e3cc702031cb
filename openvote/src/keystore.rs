use crate::*;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use indexmap::IndexMap;
use std::path::Path;
use std::str::FromStr;

/// Signing credential for a single ledger account
pub struct Credential {
    address: Address,
    secret: SecretKey,
    public: PublicKey,
}

impl Credential {
    pub fn new(secret: SecretKey) -> Self {
        let public: PublicKey = (&secret).into();
        Credential {
            address: Address::from_public_key(&public),
            secret,
            public,
        }
    }

    /// Create a credential for a fresh random account
    pub fn generate() -> Self {
        let (secret, _public) = generate_keypair();
        Credential::new(secret)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        // SecretKey is deliberately not Clone, so go through its bytes
        let secret = SecretKey::from_bytes(self.secret.as_bytes())
            .expect("openvote: secret key bytes are always valid");
        Credential::new(secret)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address)
            .finish()
    }
}

/// On-disk shape of the account key file
#[derive(Serialize, Deserialize, Default)]
struct KeyFile {
    addresses: IndexMap<String, serde_json::Value>,
    private_keys: IndexMap<String, String>,
}

/// Resolves participant addresses to signing credentials.
///
/// Pure lookup; insertion order of the source file is preserved so the voter
/// roster derived from it is stable.
#[derive(Default, Clone)]
pub struct KeyStore {
    inner: IndexMap<Address, Credential>,
}

impl KeyStore {
    pub fn insert(&mut self, credential: Credential) {
        self.inner.insert(credential.address(), credential);
    }

    /// Load an `accountKeys.json` style file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        KeyStore::from_json(&contents)
    }

    /// Parse `{ "addresses": { "<address>": .. }, "private_keys": { "<address>": "<hex secret>" } }`
    ///
    /// Addresses are taken in file order and each needs exactly one private
    /// key deriving to it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: KeyFile = serde_json::from_str(json)?;
        if file.addresses.len() != file.private_keys.len() {
            return Err(ConfigError::KeyCountMismatch {
                addresses: file.addresses.len(),
                keys: file.private_keys.len(),
            });
        }

        let mut secrets = IndexMap::with_capacity(file.private_keys.len());
        for (address, secret_hex) in file.private_keys {
            secrets.insert(Address::from_str(&address)?, secret_hex);
        }

        let mut store = KeyStore::default();
        for address in file.addresses.keys() {
            let address = Address::from_str(address)?;
            let secret_hex = secrets
                .get(&address)
                .ok_or(ConfigError::MissingPrivateKey(address))?;
            let secret_hex = secret_hex.trim();
            let secret_hex = secret_hex.strip_prefix("0x").unwrap_or(secret_hex);
            let bytes =
                hex::decode(secret_hex).map_err(|_| ConfigError::InvalidPrivateKey(address))?;
            let secret = SecretKey::from_bytes(&bytes)
                .map_err(|_| ConfigError::InvalidPrivateKey(address))?;

            let credential = Credential::new(secret);
            if credential.address() != address {
                return Err(ConfigError::AddressKeyMismatch(address));
            }
            store.insert(credential);
        }

        Ok(store)
    }

    /// Serialize back into the `accountKeys.json` shape
    pub fn to_json(&self) -> String {
        let mut file = KeyFile::default();
        for (address, credential) in self.inner.iter() {
            let public = hex::encode(credential.public_key().as_bytes());
            file.addresses
                .insert(address.to_string(), serde_json::Value::String(public));
            file.private_keys.insert(
                address.to_string(),
                hex::encode(credential.secret_key().as_bytes()),
            );
        }
        serde_json::to_string_pretty(&file).expect("openvote: key file serialization is infallible")
    }

    pub fn resolve(&self, address: &Address) -> Option<&Credential> {
        self.inner.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.inner.contains_key(address)
    }

    /// All known addresses, in file order
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.inner.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
