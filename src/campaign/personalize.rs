use crate::models::Contact;
use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

// E.164: leading + then up to 15 digits, no leading zero.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").unwrap());

const DEFAULT_COMPANY: &str = "your company";

/// Substitute `{{placeholder}}` tokens from contact fields. Unknown
/// placeholders resolve to `missing_default` so no literal `{{...}}` ever
/// reaches the provider.
pub fn render_template(template: &str, contact: &Contact, missing_default: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match key {
                "contact_name" => contact.name.clone(),
                "first_name" => contact
                    .name
                    .split_whitespace()
                    .next()
                    .unwrap_or(contact.name.as_str())
                    .to_string(),
                "company_name" => contact
                    .company_name
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| DEFAULT_COMPANY.to_string()),
                "email" => contact
                    .email
                    .clone()
                    .unwrap_or_else(|| missing_default.to_string()),
                _ => contact
                    .custom_fields
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| missing_default.to_string()),
            }
        })
        .into_owned()
}

/// Normalize a raw phone number to E.164. Bare 10-digit numbers are
/// assumed domestic; 11-digit numbers starting with the country digit get
/// a `+`; numbers already carrying `+` pass through unchanged.
pub fn normalize_phone(raw: &str, country_code: &str) -> Option<String> {
    let has_plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let candidate = if has_plus {
        format!("+{}", digits)
    } else if digits.len() == 10 {
        format!("+{}{}", country_code, digits)
    } else if digits.len() == 10 + country_code.len() && digits.starts_with(country_code) {
        format!("+{}", digits)
    } else {
        digits
    };

    if PHONE_RE.is_match(&candidate) {
        Some(candidate)
    } else {
        None
    }
}
