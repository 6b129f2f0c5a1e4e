//! Component C: resolving the calling client's name from a request, per the
//! `cn:` sources a policy was compiled with. Grounded on the `Cn`/`CnJWT`
//! extraction flow in `sdk/policy/checker.go`: a header is tried before a
//! JWT, and a JWT's token is read from whichever of its own header or
//! cookie was configured, then its signature is verified only if the source
//! carries a key.

use std::collections::HashMap;

use base64::Engine;
use cookie::Cookie;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::compiler::{ClientSource, JwtSource, TokenSource};
use crate::error::InvalidClientName;

/// Request headers, keyed by lower-cased header name. Callers own mapping
/// their transport's header representation into this form.
pub type Headers = HashMap<String, String>;

/// Resolve the client name for a request against a policy's `cn:` sources,
/// in order. The first source to yield a value wins; a source with a header
/// that's missing from the request falls through to its own JWT half (if
/// any) before the next source is tried.
pub fn resolve(sources: &[ClientSource], headers: &Headers) -> Result<String, InvalidClientName> {
	for source in sources {
		if let Some(header_name) = &source.header {
			if let Some(value) = headers.get(header_name) {
				return Ok(format!("{}{}", source.prefix, value));
			}
		}

		if let Some(jwt) = &source.jwt {
			if let Some(name) = resolve_jwt(jwt, headers)? {
				return Ok(format!("{}{}", source.prefix, name));
			}
		}
	}
	Err(InvalidClientName::Undefined)
}

fn resolve_jwt(jwt: &JwtSource, headers: &Headers) -> Result<Option<String>, InvalidClientName> {
	let Some(token) = extract_token(jwt, headers)? else {
		return Ok(None);
	};

	let claims = match &jwt.key {
		Some(key) => verify_and_decode(&token, key.expose_secret())
			.map_err(|e| InvalidClientName::ParseJwtToken(e.to_string()))?,
		None => decode_unverified(&token).map_err(InvalidClientName::ParseJwtToken)?,
	};

	match claims.get(&jwt.payload_field) {
		None => Err(InvalidClientName::PayloadFieldMissing { field: jwt.payload_field.clone() }),
		Some(Value::String(s)) => Ok(Some(s.clone())),
		Some(_) => Err(InvalidClientName::PayloadFieldNotString { field: jwt.payload_field.clone() }),
	}
}

fn extract_token(jwt: &JwtSource, headers: &Headers) -> Result<Option<String>, InvalidClientName> {
	match &jwt.token_source {
		None => Ok(None),
		Some(TokenSource::Header(name)) => Ok(headers.get(name).cloned()),
		Some(TokenSource::Cookie(name)) => {
			let Some(raw) = headers.get("cookie") else {
				return Ok(None);
			};
			for part in raw.split(';') {
				match Cookie::parse(part.trim().to_string()) {
					Ok(cookie) if cookie.name() == name => return Ok(Some(cookie.value().to_string())),
					Ok(_) => continue,
					Err(e) => return Err(InvalidClientName::ParseCookie(e.to_string())),
				}
			}
			Ok(None)
		},
	}
}

fn verify_and_decode(token: &str, key: &[u8]) -> Result<Value, jsonwebtoken::errors::Error> {
	let decoding_key = jsonwebtoken::DecodingKey::from_secret(key);
	let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
	validation.validate_exp = false;
	validation.required_spec_claims.clear();
	validation.algorithms =
		vec![jsonwebtoken::Algorithm::HS256, jsonwebtoken::Algorithm::HS384, jsonwebtoken::Algorithm::HS512];
	let data: jsonwebtoken::TokenData<Value> = jsonwebtoken::decode(token, &decoding_key, &validation)?;
	Ok(data.claims)
}

/// Decode a JWT's payload segment without checking its signature, for
/// sources configured with no key — mirrors the "trust the token's shape,
/// not its signer" mode `jwt.go`'s `decode_iss` helper uses for issuer
/// discovery.
fn decode_unverified(token: &str) -> Result<Value, String> {
	let mut parts = token.split('.');
	let _header = parts.next().ok_or("malformed jwt: missing header segment")?;
	let payload = parts.next().ok_or("malformed jwt: missing payload segment")?;
	let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
		.decode(payload)
		.map_err(|e| format!("base64: {e}"))?;
	serde_json::from_slice(&bytes).map_err(|e| format!("json: {e}"))
}
