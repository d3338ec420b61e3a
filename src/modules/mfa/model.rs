use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
pub struct EnableTwoFactorResponse {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// otpauth:// provisioning URI.
    pub otpauth_url: String,
    /// PNG QR code as a data URI, ready for an <img> tag.
    pub qr_code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmTwoFactorRequest {
    #[validate(length(equal = 6))]
    #[schema(example = "123456")]
    pub code: String,
}

/// Backup codes are returned exactly once, here.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmTwoFactorResponse {
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DisableTwoFactorRequest {
    #[validate(length(min = 1))]
    pub password: String,
    /// A current TOTP or an unused backup code.
    #[validate(length(min = 6))]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TwoFactorStatusResponse {
    pub enabled: bool,
}
