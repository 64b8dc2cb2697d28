use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn sign_bytes(password: &str, bytes: &[u8]) -> String {
    // HMAC accepts keys of any length, including empty ones.
    let mut mac =
        HmacSha256::new_from_slice(password.as_bytes()).expect("hmac accepts any key length");
    mac.update(bytes);
    general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

pub fn verify_signature(password: &str, bytes: &[u8], signature_b64: &str) -> bool {
    let sig_bytes = match general_purpose::STANDARD.decode(signature_b64) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(password.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(bytes);
    mac.verify_slice(&sig_bytes).is_ok()
}
