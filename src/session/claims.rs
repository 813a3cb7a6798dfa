use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

/// Claims read out of a provider-issued access token.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Read claims without verifying the signature.
///
/// The provider signs its tokens with a key this client never holds; the
/// backend is the verifier of record. This peek only recovers identity
/// fields for display and profile bootstrap.
pub fn peek_claims(token: &str) -> Option<AccessClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    #[test]
    fn reads_identity_fields_without_the_signing_key() {
        let token = encode(
            &Header::default(),
            &json!({ "sub": "user-9", "email": "pat@example.com", "exp": 4102444800i64 }),
            &EncodingKey::from_secret(b"provider-held-secret"),
        )
        .unwrap();

        let claims = peek_claims(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user-9"));
        assert_eq!(claims.email.as_deref(), Some("pat@example.com"));
    }

    #[test]
    fn tolerates_missing_exp() {
        let token = encode(
            &Header::default(),
            &json!({ "sub": "user-9" }),
            &EncodingKey::from_secret(b"k"),
        )
        .unwrap();

        let claims = peek_claims(&token).unwrap();
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn garbage_token_yields_none() {
        assert!(peek_claims("not-a-jwt").is_none());
    }
}
