use crate::AppError;

/// Canonical text form of the zero address, the "no delegate" sentinel.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Normalise a user-supplied address to the lowercase `0x`-prefixed form
/// used as a storage key.
pub fn normalize_address(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| AppError::InvalidAddress(raw.to_string()))?;

    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AppError::InvalidAddress(raw.to_string()));
    }

    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}
