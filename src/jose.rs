//! JOSE seam: payload peeking, JWS verification, JWE decryption, ID-token checks.
//!
//! The rest of the crate never touches josekit types outside this module (key sets
//! excepted). Algorithms are always taken from configuration or verified expectations,
//! never from the unauthenticated token header, so a token cannot downgrade its own
//! verification.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use josekit::{
	jwe::JweDecrypter,
	jwk::{Jwk, JwkSet},
	jws::JwsVerifier,
};
// self
use crate::{_prelude::*, auth::Claims};

const JWS_PART_COUNT: usize = 3;
const JWE_PART_COUNT: usize = 5;

/// Failure modes of JOSE assertion handling.
#[derive(Debug, ThisError)]
pub enum AssertionError {
	/// Underlying josekit failure (bad key material, signature mismatch, ...).
	#[error("{0}")]
	Backend(#[from] josekit::JoseError),
	/// The compact serialization is malformed for the expected token form.
	#[error("The compact serialization is malformed.")]
	Malformed,
	/// No key in the key set could process the assertion.
	#[error("No key in the key set matched the assertion.")]
	NoMatchingKey,
	/// The declared algorithm is not supported by the custodian.
	#[error("Algorithm `{alg}` is not supported.")]
	UnsupportedAlgorithm {
		/// The declared algorithm name.
		alg: String,
	},
	/// The JWE content encryption differs from the configured expectation.
	#[error("Content encryption `{enc}` does not match the expected `{expected}`.")]
	ContentEncryptionMismatch {
		/// Algorithm found in the JWE header.
		enc: String,
		/// Algorithm the client configuration declares.
		expected: String,
	},
	/// The decrypted payload is not valid UTF-8.
	#[error("The decrypted payload is not valid UTF-8.")]
	NotUtf8,
	/// A verified claim does not carry the expected value.
	#[error("The `{claim}` claim does not match the expected value.")]
	ClaimMismatch {
		/// Name of the offending claim.
		claim: &'static str,
	},
}

/// Decodes the payload of a compact JWS without verifying its signature.
///
/// Registration of third-party ID tokens trusts the caller; tokens arriving from the
/// token endpoint are verified before this is used. A five-part (JWE) input is rejected.
pub fn peek_payload(compact: &str) -> Result<Claims, AssertionError> {
	if compact.split('.').count() != JWS_PART_COUNT {
		return Err(AssertionError::Malformed);
	}

	decode_part(compact, 1)
}

/// Verifies a compact JWS against the key set using the declared algorithm and returns
/// its payload claims.
pub fn verify_jws(compact: &str, keys: &JwkSet, alg: &str) -> Result<Claims, AssertionError> {
	if compact.split('.').count() != JWS_PART_COUNT {
		return Err(AssertionError::Malformed);
	}

	let header = decode_part(compact, 0)?;
	let kid = header.get("kid").and_then(Value::as_str);
	let mut last_failure = None;

	for jwk in signing_candidates(keys, kid) {
		let verifier = match verifier_for(alg, jwk) {
			Ok(verifier) => verifier,
			Err(error @ AssertionError::UnsupportedAlgorithm { .. }) => return Err(error),
			Err(error) => {
				last_failure = Some(error);

				continue;
			},
		};

		match josekit::jwt::decode_with_verifier(compact, verifier.as_ref()) {
			Ok((payload, _)) => return Ok(payload.claims_set().clone()),
			Err(error) => last_failure = Some(AssertionError::Backend(error)),
		}
	}

	Err(last_failure.unwrap_or(AssertionError::NoMatchingKey))
}

/// Decrypts a compact JWE with the client's private key set and returns the inner
/// payload as text (for userinfo, a nested compact JWS).
pub fn decrypt_jwe(
	compact: &str,
	keys: &JwkSet,
	alg: &str,
	expected_enc: &str,
) -> Result<String, AssertionError> {
	if compact.split('.').count() != JWE_PART_COUNT {
		return Err(AssertionError::Malformed);
	}

	let header = decode_part(compact, 0)?;
	let kid = header.get("kid").and_then(Value::as_str);
	let mut last_failure = None;

	for jwk in decryption_candidates(keys, kid) {
		let decrypter = match decrypter_for(alg, jwk) {
			Ok(decrypter) => decrypter,
			Err(error @ AssertionError::UnsupportedAlgorithm { .. }) => return Err(error),
			Err(error) => {
				last_failure = Some(error);

				continue;
			},
		};

		match josekit::jwe::deserialize_compact(compact, decrypter.as_ref()) {
			Ok((payload, header)) => {
				let enc = header.content_encryption().unwrap_or_default();

				if enc != expected_enc {
					return Err(AssertionError::ContentEncryptionMismatch {
						enc: enc.to_owned(),
						expected: expected_enc.to_owned(),
					});
				}

				return String::from_utf8(payload).map_err(|_| AssertionError::NotUtf8);
			},
			Err(error) => last_failure = Some(AssertionError::Backend(error)),
		}
	}

	Err(last_failure.unwrap_or(AssertionError::NoMatchingKey))
}

/// Verifies an ID token per OIDC Core §3.1.3.7 essentials: signature against the
/// issuer's key set, `iss` equality, and `aud` containment of the client identifier.
pub fn verify_id_token(
	compact: &str,
	issuer: &Url,
	client_id: &str,
	keys: &JwkSet,
) -> Result<Claims, AssertionError> {
	let header = decode_part(compact, 0)?;
	let alg = header
		.get("alg")
		.and_then(Value::as_str)
		.ok_or(AssertionError::Malformed)?
		.to_owned();
	let claims = verify_jws(compact, keys, &alg)?;
	let expected_issuer = issuer.as_str();
	let issuer_matches = claims.get("iss").and_then(Value::as_str).is_some_and(|iss| {
		iss == expected_issuer || iss == expected_issuer.trim_end_matches('/')
	});

	if !issuer_matches {
		return Err(AssertionError::ClaimMismatch { claim: "iss" });
	}

	let audience_matches = match claims.get("aud") {
		Some(Value::String(aud)) => aud == client_id,
		Some(Value::Array(auds)) =>
			auds.iter().filter_map(Value::as_str).any(|aud| aud == client_id),
		_ => false,
	};

	if !audience_matches {
		return Err(AssertionError::ClaimMismatch { claim: "aud" });
	}

	Ok(claims)
}

fn decode_part(compact: &str, index: usize) -> Result<Claims, AssertionError> {
	let part = compact.split('.').nth(index).ok_or(AssertionError::Malformed)?;
	let bytes = URL_SAFE_NO_PAD.decode(part).map_err(|_| AssertionError::Malformed)?;

	match serde_json::from_slice(&bytes) {
		Ok(Value::Object(map)) => Ok(map),
		_ => Err(AssertionError::Malformed),
	}
}

fn signing_candidates<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Vec<&'a Jwk> {
	match kid {
		Some(kid) => keys.get(kid),
		None => keys
			.keys()
			.into_iter()
			.filter(|jwk| jwk.key_use().unwrap_or("sig") == "sig")
			.collect(),
	}
}

fn decryption_candidates<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Vec<&'a Jwk> {
	match kid {
		Some(kid) => keys.get(kid),
		None => keys
			.keys()
			.into_iter()
			.filter(|jwk| jwk.key_use().unwrap_or("enc") == "enc")
			.collect(),
	}
}

fn verifier_for(alg: &str, jwk: &Jwk) -> Result<Box<dyn JwsVerifier>, AssertionError> {
	use josekit::jws::{
		ES256, ES384, ES512, EdDSA, HS256, HS384, HS512, PS256, PS384, PS512, RS256, RS384, RS512,
	};

	Ok(match alg {
		"RS256" => Box::new(RS256.verifier_from_jwk(jwk)?),
		"RS384" => Box::new(RS384.verifier_from_jwk(jwk)?),
		"RS512" => Box::new(RS512.verifier_from_jwk(jwk)?),
		"PS256" => Box::new(PS256.verifier_from_jwk(jwk)?),
		"PS384" => Box::new(PS384.verifier_from_jwk(jwk)?),
		"PS512" => Box::new(PS512.verifier_from_jwk(jwk)?),
		"ES256" => Box::new(ES256.verifier_from_jwk(jwk)?),
		"ES384" => Box::new(ES384.verifier_from_jwk(jwk)?),
		"ES512" => Box::new(ES512.verifier_from_jwk(jwk)?),
		"EdDSA" => Box::new(EdDSA.verifier_from_jwk(jwk)?),
		"HS256" => Box::new(HS256.verifier_from_jwk(jwk)?),
		"HS384" => Box::new(HS384.verifier_from_jwk(jwk)?),
		"HS512" => Box::new(HS512.verifier_from_jwk(jwk)?),
		_ => return Err(AssertionError::UnsupportedAlgorithm { alg: alg.to_owned() }),
	})
}

fn decrypter_for(alg: &str, jwk: &Jwk) -> Result<Box<dyn JweDecrypter>, AssertionError> {
	use josekit::jwe::{A128KW, A192KW, A256KW, Dir, ECDH_ES, RSA_OAEP, RSA_OAEP_256};

	Ok(match alg {
		"RSA-OAEP" => Box::new(RSA_OAEP.decrypter_from_jwk(jwk)?),
		"RSA-OAEP-256" => Box::new(RSA_OAEP_256.decrypter_from_jwk(jwk)?),
		"dir" => Box::new(Dir.decrypter_from_jwk(jwk)?),
		"A128KW" => Box::new(A128KW.decrypter_from_jwk(jwk)?),
		"A192KW" => Box::new(A192KW.decrypter_from_jwk(jwk)?),
		"A256KW" => Box::new(A256KW.decrypter_from_jwk(jwk)?),
		"ECDH-ES" => Box::new(ECDH_ES.decrypter_from_jwk(jwk)?),
		_ => return Err(AssertionError::UnsupportedAlgorithm { alg: alg.to_owned() }),
	})
}
