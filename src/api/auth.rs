use base64::{engine::general_purpose::STANDARD, Engine as _};
use constant_time_eq::constant_time_eq;

use crate::config::AdminConfig;

pub const REALM: &str = "Basic realm=\"Teacher Area\"";

/// Checks an `Authorization: Basic ...` header against the admin credentials.
pub fn authorize(header: Option<&str>, admin: &AdminConfig) -> bool {
    let Some((user, password)) = header.and_then(decode_basic) else {
        return false;
    };

    // Evaluate both so timing does not reveal which one matched
    let user_ok = constant_time_eq(user.as_bytes(), admin.username.as_bytes());
    let password_ok = constant_time_eq(password.as_bytes(), admin.password.as_bytes());
    user_ok & password_ok
}

fn decode_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
