//! HTTP Basic (RFC 7617) and Digest (RFC 7616) authentication.

use base64::Engine;
use rand::Rng;
use std::collections::HashMap;

/// Digest state negotiated from a `WWW-Authenticate` challenge.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    /// Defaults to MD5.
    pub algorithm: String,
    nc: u32,
}

impl DigestAuth {
    /// Reads a `Digest ...` challenge. Returns `None` for other schemes or
    /// when realm or nonce is missing.
    pub fn parse(header: &str) -> Option<Self> {
        let content = header.strip_prefix("Digest ")?.trim();
        let params = parse_auth_params(content);

        Some(Self {
            realm: params.get("realm")?.to_string(),
            nonce: params.get("nonce")?.to_string(),
            opaque: params.get("opaque").cloned(),
            qop: params.get("qop").cloned(),
            algorithm: params
                .get("algorithm")
                .cloned()
                .unwrap_or_else(|| "MD5".to_string()),
            nc: 0,
        })
    }

    /// Builds the `Authorization` value for one request.
    pub fn authorize(&mut self, method: &str, uri: &str, username: &str, password: &str) -> String {
        self.nc += 1;
        let nc = format!("{:08x}", self.nc);
        let cnonce = generate_cnonce();

        let ha1 = md5_hex(&format!("{username}:{}:{password}", self.realm));
        let ha2 = md5_hex(&format!("{method}:{uri}"));

        let with_qop = self.qop.as_deref().is_some_and(|q| q.contains("auth"));
        let response = if with_qop {
            md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            // RFC 2069
            md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut parts = vec![
            format!("username=\"{username}\""),
            format!("realm=\"{}\"", self.realm),
            format!("nonce=\"{}\"", self.nonce),
            format!("uri=\"{uri}\""),
            format!("response=\"{response}\""),
            format!("algorithm={}", self.algorithm),
        ];
        if with_qop {
            parts.push("qop=auth".to_string());
            parts.push(format!("nc={nc}"));
            parts.push(format!("cnonce=\"{cnonce}\""));
        }
        if let Some(ref opaque) = self.opaque {
            parts.push(format!("opaque=\"{opaque}\""));
        }

        format!("Digest {}", parts.join(", "))
    }
}

/// `Basic base64(user:password)`.
pub fn basic_auth(username: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}

/// Splits `key=value, key="quoted, value"` pairs; keys are lowercased.
fn parse_auth_params(content: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = content.chars().peekable();

    while chars.peek().is_some() {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let key: String = chars
            .by_ref()
            .take_while(|c| *c != '=')
            .collect::<String>()
            .trim()
            .to_lowercase();
        if key.is_empty() {
            break;
        }

        let value = if chars.peek() == Some(&'"') {
            chars.next();
            let mut val = String::new();
            let mut escaped = false;
            for c in chars.by_ref() {
                match (escaped, c) {
                    (true, c) => {
                        val.push(c);
                        escaped = false;
                    }
                    (false, '\\') => escaped = true,
                    (false, '"') => break,
                    (false, c) => val.push(c),
                }
            }
            val
        } else {
            chars
                .by_ref()
                .take_while(|c| *c != ',' && !c.is_whitespace())
                .collect()
        };

        params.insert(key, value);
    }

    params
}

fn generate_cnonce() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
