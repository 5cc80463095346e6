//! Signed amenity-booking passes (the QR payload)
//!
//! A pass binds a booking to its resident, amenity and tenant. Issuing one has no side effect;
//! consuming it is the booking's check-in transition, so a pass is single-use only because a
//! checked-in booking no longer accepts check-in.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Booking, TenantId};
use crate::infra::{GateError, Result};

pub const BOOKING_PASS_KID: &str = "amenity-booking";
pub const BOOKING_PASS_TYPE: &str = "amenity-booking";
pub const BOOKING_PASS_AUDIENCE: &str = "gatehouse-gate";

/// How long after the booking day a pass still verifies, for late checkouts
pub const CHECKOUT_GRACE_HOURS: i64 = 6;

#[derive(Debug, Serialize, Deserialize)]
struct PassClaims {
    #[serde(rename = "type")]
    kind: String,
    booking_id: Uuid,
    amenity_id: Uuid,
    resident_id: Uuid,
    tenant_id: TenantId,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Verified content of a booking pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingPass {
    pub booking_id: Uuid,
    pub amenity_id: Uuid,
    pub resident_id: Uuid,
    pub tenant_id: TenantId,
}

/// Signed pass and the instant it stops verifying
#[derive(Debug, Clone)]
pub struct IssuedPass {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct BookingPassIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl BookingPassIssuer {
    pub fn new(secret: &[u8], issuer: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            ttl,
        }
    }

    /// Sign a pass for `booking`. `day_end` is the last instant of the booking day on the site
    /// calendar; the pass lives for the configured TTL or until the grace period after that day
    /// ends, whichever is later, so a pass generated days ahead still scans on the day.
    pub fn issue(&self, booking: &Booking, day_end: DateTime<Utc>) -> Result<IssuedPass> {
        let now = Utc::now();
        let expires_at = (now + self.ttl).max(day_end + Duration::hours(CHECKOUT_GRACE_HOURS));
        let claims = PassClaims {
            kind: BOOKING_PASS_TYPE.to_string(),
            booking_id: booking.id,
            amenity_id: booking.amenity_id,
            resident_id: booking.resident_id,
            tenant_id: booking.tenant_id,
            iss: self.issuer.clone(),
            aud: BOOKING_PASS_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(BOOKING_PASS_KID.to_string());

        let token = encode(&header, &claims, &self.encoding)
            .map_err(|e| GateError::Internal(format!("failed to sign booking pass: {e}")))?;
        Ok(IssuedPass { token, expires_at })
    }

    /// Check signature, expiry and declared type. Booking state is checked by the engine.
    pub fn verify(&self, token: &str) -> Result<BookingPass> {
        let header = decode_header(token.trim())
            .map_err(|_| GateError::InvalidCredential("malformed credential".to_string()))?;
        if header.kid.as_deref() != Some(BOOKING_PASS_KID) {
            return Err(GateError::InvalidCredential(
                "credential is not a booking pass".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[BOOKING_PASS_AUDIENCE]);

        let data = decode::<PassClaims>(token.trim(), &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    GateError::InvalidCredential("booking pass expired".to_string())
                }
                _ => GateError::InvalidCredential("booking pass signature invalid".to_string()),
            }
        })?;

        let claims = data.claims;
        if claims.kind != BOOKING_PASS_TYPE {
            return Err(GateError::InvalidCredential(format!(
                "unexpected credential type {:?}",
                claims.kind
            )));
        }

        Ok(BookingPass {
            booking_id: claims.booking_id,
            amenity_id: claims.amenity_id,
            resident_id: claims.resident_id,
            tenant_id: claims.tenant_id,
        })
    }
}
