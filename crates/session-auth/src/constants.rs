//! Remote authentication service endpoints
//!
//! Paths are relative to the configured API base URL. The service owns these
//! routes; the client only consumes them.

/// Exchange a refresh token for a new credential pair
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

/// Ask the service to email a one-time code
pub const OTP_REQUEST_PATH: &str = "/api/v1/auth/otp/request";

/// Trade an emailed one-time code for a credential pair
pub const OTP_VERIFY_PATH: &str = "/api/v1/auth/otp/verify";

/// Profile of the currently authenticated user
pub const ME_PATH: &str = "/api/v1/auth/me";

/// Number of digits in an emailed one-time code
pub const OTP_CODE_LENGTH: usize = 6;
