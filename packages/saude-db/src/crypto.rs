//! Módulo de criptografia para identificadores pessoais
//!
//! CPF, telefone, e-mail e endereço são gravados cifrados com AES-256-GCM.
//! A chave de dados fica na tabela `master_keys`, embrulhada com
//! ChaCha20-Poly1305 sob uma chave derivada da frase do administrador
//! (Argon2id). A unicidade do CPF usa um índice cego HMAC-SHA256, derivado
//! da mesma chave de dados.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng as RandOsRng, RngCore};
use sha2::Sha256;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::DbError;

type HmacSha256 = Hmac<Sha256>;

/// Erros específicos para operações de criptografia
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Falha na criptografia: {0}")]
    EncryptionFailed(String),

    #[error("Falha na descriptografia: {0}")]
    DecryptionFailed(String),

    #[error("Dados inválidos: {0}")]
    InvalidData(String),

    #[error("Configuração de criptografia inválida: {0}")]
    InvalidConfiguration(String),
}

/// Tamanho do nonce em bytes (AES-GCM e ChaCha20-Poly1305)
const NONCE_SIZE: usize = 12;

/// Tamanho do sal da derivação Argon2id
const SALT_SIZE: usize = 16;

/// Rótulo da derivação da chave do índice cego
const ROTULO_INDICE: &[u8] = b"saude:indice-cego:v1";

/// Chave AES-256 (com zeroização automática)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Cria uma nova chave aleatória
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        RandOsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Cria uma chave a partir de bytes existentes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidData(format!(
                "A chave deve ter 32 bytes, recebeu {}",
                bytes.len()
            )));
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(***)")
    }
}

/// Dados cifrados e seu nonce, gravados em duas colunas BLOB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Cifra dados usando AES-256-GCM
pub fn encrypt(data: &[u8], key: &EncryptionKey) -> Result<EncryptedData, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(EncryptedData {
        ciphertext,
        nonce: nonce.to_vec(),
    })
}

/// Decifra dados usando AES-256-GCM
pub fn decrypt(encrypted: &EncryptedData, key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    if encrypted.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidData(format!(
            "Nonce inválido: esperado {} bytes, recebido {}",
            NONCE_SIZE,
            encrypted.nonce.len()
        )));
    }

    cipher
        .decrypt(Nonce::from_slice(&encrypted.nonce), encrypted.ciphertext.as_ref())
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Deriva a chave de embrulho a partir da frase do administrador (Argon2id)
pub fn derive_wrapping_key(password: &str, salt: &[u8]) -> Result<EncryptionKey, CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::InvalidConfiguration(
            "Frase da chave mestra não pode ser vazia".to_string(),
        ));
    }

    let params = Params::new(19 * 1024, 2, 1, Some(32))
        .map_err(|e| CryptoError::InvalidConfiguration(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::InvalidConfiguration(e.to_string()))?;

    let derived = EncryptionKey(key);
    key.zeroize();
    Ok(derived)
}

/// Chave de dados embrulhada, como fica na tabela `master_keys`
#[derive(Debug, Clone)]
pub struct WrappedKey {
    pub salt: Vec<u8>,
    pub encrypted: EncryptedData,
}

/// Embrulha uma chave com ChaCha20-Poly1305 sob uma chave derivada da frase
pub fn wrap_key(key: &EncryptionKey, password: &str) -> Result<WrappedKey, CryptoError> {
    let mut salt = vec![0u8; SALT_SIZE];
    RandOsRng.fill_bytes(&mut salt);
    let wrapping_key = derive_wrapping_key(password, &salt)?;

    let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(wrapping_key.as_bytes()));
    let mut nonce = [0u8; NONCE_SIZE];
    RandOsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(ChaChaNonce::from_slice(&nonce), key.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(WrappedKey {
        salt,
        encrypted: EncryptedData {
            ciphertext,
            nonce: nonce.to_vec(),
        },
    })
}

/// Desembrulha uma chave; frase errada resulta em `DecryptionFailed`
pub fn unwrap_key(wrapped: &WrappedKey, password: &str) -> Result<EncryptionKey, CryptoError> {
    if wrapped.encrypted.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidData(format!(
            "Nonce inválido: esperado {} bytes, recebido {}",
            NONCE_SIZE,
            wrapped.encrypted.nonce.len()
        )));
    }

    let wrapping_key = derive_wrapping_key(password, &wrapped.salt)?;
    let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(wrapping_key.as_bytes()));

    let mut plaintext = cipher
        .decrypt(
            ChaChaNonce::from_slice(&wrapped.encrypted.nonce),
            wrapped.encrypted.ciphertext.as_ref(),
        )
        .map_err(|_| CryptoError::DecryptionFailed("Frase da chave mestra incorreta".to_string()))?;

    let key = EncryptionKey::from_bytes(&plaintext);
    plaintext.zeroize();
    key
}

/// HMAC-SHA256 em hexadecimal
fn hmac_hex(key: &[u8], data: &[u8]) -> Result<String, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidConfiguration(e.to_string()))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Cofre com as chaves em uso pelos repositórios
#[derive(Clone)]
pub struct Cofre {
    chave_dados: EncryptionKey,
    chave_indice: EncryptionKey,
}

impl std::fmt::Debug for Cofre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cofre").finish_non_exhaustive()
    }
}

impl Cofre {
    pub fn new(chave_dados: EncryptionKey) -> Result<Self, CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(chave_dados.as_bytes())
            .map_err(|e| CryptoError::InvalidConfiguration(e.to_string()))?;
        mac.update(ROTULO_INDICE);
        let chave_indice = EncryptionKey::from_bytes(&mac.finalize().into_bytes())?;

        Ok(Self {
            chave_dados,
            chave_indice,
        })
    }

    pub fn cifrar(&self, texto: &str) -> Result<EncryptedData, CryptoError> {
        encrypt(texto.as_bytes(), &self.chave_dados)
    }

    pub fn decifrar(&self, dados: &EncryptedData) -> Result<String, CryptoError> {
        let bytes = decrypt(dados, &self.chave_dados)?;
        String::from_utf8(bytes).map_err(|e| CryptoError::InvalidData(e.to_string()))
    }

    /// Índice determinístico para buscas por igualdade sem expor o valor
    pub fn indice_cego(&self, valor: &str) -> Result<String, CryptoError> {
        hmac_hex(self.chave_indice.as_bytes(), valor.as_bytes())
    }
}

/// Abre o cofre com a chave mestra ativa, criando uma na primeira execução
pub async fn abrir_cofre(pool: &SqlitePool, key_phrase: &str) -> Result<Cofre, DbError> {
    let linha = sqlx::query(
        "SELECT salt, wrapped_key_ciphertext, wrapped_key_nonce, key_version
         FROM master_keys WHERE active = 1 ORDER BY key_version DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    let chave = match linha {
        Some(linha) => {
            let versao: i64 = linha.try_get("key_version")?;
            let wrapped = WrappedKey {
                salt: linha.try_get("salt")?,
                encrypted: EncryptedData {
                    ciphertext: linha.try_get("wrapped_key_ciphertext")?,
                    nonce: linha.try_get("wrapped_key_nonce")?,
                },
            };
            let chave = unwrap_key(&wrapped, key_phrase).map_err(|e| {
                warn!(versao, "Falha ao desembrulhar chave mestra");
                e
            })?;
            info!(versao, "Chave mestra carregada");
            chave
        }
        None => {
            let chave = EncryptionKey::generate();
            let wrapped = wrap_key(&chave, key_phrase)?;
            sqlx::query(
                "INSERT INTO master_keys (active, salt, wrapped_key_ciphertext, wrapped_key_nonce, key_version)
                 VALUES (1, ?, ?, ?, 1)",
            )
            .bind(&wrapped.salt)
            .bind(&wrapped.encrypted.ciphertext)
            .bind(&wrapped.encrypted.nonce)
            .execute(pool)
            .await?;
            info!("Nova chave mestra gerada (versão 1)");
            chave
        }
    };

    Ok(Cofre::new(chave)?)
}
