//! HTTP Signatures
//!
//! Signing and verification of federation requests over a canonicalized
//! subset of headers, RSA-SHA256 over the signing string.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{pkcs1v15::Signature as Pkcs1v15Signature, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Raw fields of a Signature header, before required-field checks.
#[derive(Debug, Clone, Default)]
pub struct SignatureFields {
    pub key_id: Option<String>,
    pub algorithm: Option<String>,
    pub headers: Vec<String>,
    pub signature: Option<String>,
}

/// A signature descriptor with every required field present.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Algorithm (usually rsa-sha256)
    pub algorithm: Option<String>,
    /// Signed header names
    pub headers: Vec<String>,
    /// Base64-encoded signature
    pub signature: String,
}

/// Parse a Signature header value into its raw fields.
///
/// # Format
/// ```text
/// keyId="...",algorithm="...",headers="...",signature="..."
/// ```
///
/// Missing fields are left unset; `validate_signature_model` decides which
/// of them are required. Only a header with no `key="value"` structure at
/// all is rejected here.
pub fn parse_signature_header(header: &str) -> Result<SignatureFields, AppError> {
    let mut fields = SignatureFields::default();
    let mut any_pair = false;

    for part in header.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            any_pair = true;
            let key = key.trim();
            let value = value.trim().trim_matches('"');

            match key {
                "keyId" => fields.key_id = Some(value.to_string()),
                "algorithm" => fields.algorithm = Some(value.to_string()),
                "headers" => {
                    fields.headers = value
                        .split_whitespace()
                        .map(|s| s.to_ascii_lowercase())
                        .collect()
                }
                "signature" => fields.signature = Some(value.to_string()),
                _ => {} // Ignore unknown fields
            }
        }
    }

    if !any_pair {
        return Err(AppError::InvalidSignatureHeader(
            "No key=\"value\" pairs".to_string(),
        ));
    }

    Ok(fields)
}

/// Validate required fields of a signature descriptor.
///
/// The key id and signature must be present and non-empty, at least one
/// header must be covered, and the algorithm (when named) must be one we
/// can verify.
pub fn validate_signature_model(fields: SignatureFields) -> Result<ParsedSignature, AppError> {
    let key_id = fields.key_id.filter(|k| !k.is_empty()).ok_or_else(|| {
        AppError::InvalidSignatureModel("Signature keyId is required".to_string())
    })?;

    let signature = fields.signature.filter(|s| !s.is_empty()).ok_or_else(|| {
        AppError::InvalidSignatureModel("Signature value is required".to_string())
    })?;

    if fields.headers.is_empty() {
        return Err(AppError::InvalidSignatureModel(
            "Signature must cover at least one header".to_string(),
        ));
    }

    if let Some(algorithm) = &fields.algorithm {
        if algorithm != "rsa-sha256" && algorithm != "hs2019" {
            return Err(AppError::InvalidSignatureModel(format!(
                "Unsupported signature algorithm: {}",
                algorithm
            )));
        }
    }

    Ok(ParsedSignature {
        key_id,
        algorithm: fields.algorithm,
        headers: fields.headers,
        signature,
    })
}

/// Headers to add for a signed outbound request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value (RFC 2822)
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
}

/// Sign an HTTP request
///
/// Builds the signing string over (request-target), host, date and digest
/// (when a body is present) and signs it with the local RSA key.
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key_pem: &str,
    key_id: &str,
) -> Result<SignatureHeaders, AppError> {
    let parsed_url = url::Url::parse(url)
        .map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?;
    // The signed host must match the Host header the client will send,
    // which carries the port when it is non-default.
    let host = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path = parsed_url.path();
    let path_and_query = if let Some(query) = parsed_url.query() {
        format!("{}?{}", path, query)
    } else {
        path.to_string()
    };

    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let digest = body.map(generate_digest);

    let request_target = format!("{} {}", method.to_lowercase(), path_and_query);

    let mut signing_parts = vec![
        format!("(request-target): {}", request_target),
        format!("host: {}", host),
        format!("date: {}", date),
    ];
    let mut headers_list = vec!["(request-target)", "host", "date"];

    if let Some(ref digest_value) = digest {
        signing_parts.push(format!("digest: {}", digest_value));
        headers_list.push("digest");
    }

    let signing_string = signing_parts.join("\n");

    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};

    let private_key = rsa::RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| AppError::Config(format!("Invalid private key: {}", e)))?;

    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new_unprefixed(private_key);
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_string.as_bytes());
    let signature_b64 = BASE64.encode(signature.to_bytes());

    let signature_header = format!(
        "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
        key_id,
        headers_list.join(" "),
        signature_b64
    );

    Ok(SignatureHeaders {
        signature: signature_header,
        date,
        digest,
    })
}

fn verification_failure(reason: &str) -> AppError {
    tracing::warn!(reason, "Signature verification failed");
    AppError::SignatureVerificationFailed
}

/// Verify an HTTP request signature
///
/// Reconstructs the signing string from the covered headers and checks the
/// RSA signature, the Date window and the body digest.
///
/// # Errors
/// Any verification failure maps to `SignatureVerificationFailed`; the
/// detailed reason is logged at warning level.
pub fn verify_signature(
    method: &str,
    path: &str,
    headers: &http::HeaderMap,
    body: Option<&[u8]>,
    parsed: &ParsedSignature,
    public_key_pem: &str,
) -> Result<(), AppError> {
    // 1. Required covered headers.
    for required in ["(request-target)", "host", "date"] {
        if !parsed.headers.iter().any(|h| h == required) {
            return Err(verification_failure("required header not covered"));
        }
    }

    if body.is_some() && !parsed.headers.iter().any(|h| h == "digest") {
        return Err(verification_failure("digest not covered for signed body"));
    }

    // 2. Verify Date is recent (within 5 minutes).
    let date_str = header_value(headers, "date")
        .ok_or_else(|| verification_failure("missing Date header"))?;
    let date = DateTime::parse_from_rfc2822(&date_str)
        .map_err(|_| verification_failure("invalid Date format"))?;

    let diff = (Utc::now().timestamp() - date.timestamp()).abs();
    if diff > 300 {
        return Err(verification_failure("Date header too old or in future"));
    }

    // 3. If body present, verify Digest.
    if let Some(body_data) = body {
        let digest_str = header_value(headers, "digest")
            .ok_or_else(|| verification_failure("missing Digest header"))?;
        if !digest_matches(&digest_str, body_data) {
            return Err(verification_failure("digest mismatch"));
        }
    }

    // 4. Reconstruct the signing string.
    let mut signing_parts = Vec::new();
    for header_name in &parsed.headers {
        let value = match header_name.as_str() {
            "(request-target)" => format!("{} {}", method.to_lowercase(), path),
            name => header_value(headers, name)
                .ok_or_else(|| verification_failure("covered header absent from request"))?,
        };
        signing_parts.push(format!("{}: {}", header_name, value));
    }
    let signing_string = signing_parts.join("\n");

    // 5. Verify the RSA signature.
    let signature_bytes = BASE64
        .decode(&parsed.signature)
        .map_err(|_| verification_failure("invalid signature encoding"))?;

    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|_| verification_failure("invalid public key"))?;

    let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new_unprefixed(public_key);
    let signature = Pkcs1v15Signature::try_from(signature_bytes.as_slice())
        .map_err(|_| verification_failure("invalid signature format"))?;

    verifier
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| verification_failure("signature does not match"))?;

    Ok(())
}

fn header_value(headers: &http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Generate the SHA-256 content digest for a body
///
/// # Returns
/// `sha-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    let hash = Sha256::digest(body);
    format!("sha-256={}", BASE64.encode(hash))
}

/// Compare a received Digest header against the body, tolerating the
/// uppercase `SHA-256=` prefix some implementations send.
fn digest_matches(received: &str, body: &[u8]) -> bool {
    let expected = generate_digest(body);
    let (received_algo, received_value) = match received.split_once('=') {
        Some(parts) => parts,
        None => return false,
    };
    let (_, expected_value) = expected.split_once('=').unwrap_or(("", ""));

    received_algo.eq_ignore_ascii_case("sha-256") && received_value == expected_value
}
