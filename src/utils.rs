use sha2::{Digest, Sha256};

/// Short, salted fingerprint of a secret (session token, email) for logs.
///
/// Two log lines about the same session carry the same fingerprint, while the
/// token itself never reaches the log sink.
pub fn log_safe_id(secret: &str, salt: &str) -> String {
    let digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(secret.as_bytes())
        .finalize();

    hex::encode(&digest[..4])
}

/// `scheme://host:port` of a URL with the scheme's default port filled in.
pub fn origin_of(url: &reqwest::Url) -> Option<(String, String, u16)> {
    let host = url.host_str()?.to_ascii_lowercase();
    let port = url.port_or_known_default()?;
    Some((url.scheme().to_string(), host, port))
}
