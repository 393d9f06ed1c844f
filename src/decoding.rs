//! Decoders that turn obfuscated or encoded content back into recognizable text.

use crate::error::{AppError, Result};
use crate::models::EmailSet;
use crate::recognizer;
use crate::validator;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

/// Named and zero-padded entities seen around email addresses, applied in order.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&#64;", "@"),
    ("&#46;", "."),
    ("&#45;", "-"),
    ("&#95;", "_"),
    ("&period;", "."),
    ("&commat;", "@"),
    ("&hyphen;", "-"),
    ("&lowbar;", "_"),
    ("&dot;", "."),
    ("&at;", "@"),
    ("&#064;", "@"),
    ("&#0064;", "@"),
    ("&#00064;", "@"),
    ("&#000064;", "@"),
    ("&#x40;", "@"),
    ("&#x064;", "@"),
    ("&#x0040;", "@"),
    ("&colon;", ":"),
    ("&#58;", ":"),
    ("&#x3a;", ":"),
];

static DECIMAL_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(\d+);").expect("Failed to compile DECIMAL_ENTITY"));

static HEX_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#[xX]([0-9a-fA-F]+);").expect("Failed to compile HEX_ENTITY"));

static MAILTO_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(at\)|\[at\]|<at>|\{at\}|\(a\)|\[a\]|<a>|\{a\}|\(et\)|\[et\]|<et>|\{et\}|\s+at\s+")
        .expect("Failed to compile MAILTO_MARKERS")
});

/// Decodes the entity table above plus any decimal or hex numeric entity.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut decoded = text.to_string();
    for (entity, replacement) in NAMED_ENTITIES {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }

    let decoded = DECIMAL_ENTITY.replace_all(&decoded, |caps: &regex::Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    HEX_ENTITY
        .replace_all(&decoded, |caps: &regex::Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Caesar shift by 13 over ASCII letters; everything else is kept.
pub fn rot13(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
            _ => c,
        })
        .collect()
}

/// Lenient base64 decoding: whitespace is ignored and missing `=` padding added.
pub fn try_decode_base64(text: &str) -> Result<String> {
    let mut cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(AppError::Decode("empty base64 input".to_string()));
    }
    let rem = cleaned.len() % 4;
    if rem != 0 {
        cleaned.push_str(&"=".repeat(4 - rem));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| AppError::Decode(format!("invalid base64 '{}': {}", text, e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Like [`try_decode_base64`], but yields an empty string on failure.
pub fn decode_base64(text: &str) -> String {
    try_decode_base64(text).unwrap_or_else(|e| {
        tracing::debug!(target: "page_task", "{}", e);
        String::new()
    })
}

/// XORs every character code with `key`. Codes that leave the valid char range are dropped.
pub fn xor_decode(text: &str, key: u32) -> String {
    text.chars()
        .filter_map(|c| char::from_u32(c as u32 ^ key))
        .collect()
}

pub fn reverse_text(text: &str) -> String {
    text.chars().rev().collect()
}

/// Replaces obfuscation markers with `@` and removes spaces.
pub fn deobfuscate_email(text: &str) -> String {
    MAILTO_MARKERS.replace_all(text, "@").replace(' ', "")
}

/// Decodes a `data-enc-email` attribute.
///
/// ROT13 is tried first. If that does not yield a valid address, the first 26
/// characters are taken as a substitution alphabet for `a`..`z`. Anything else
/// is rejected.
pub fn decode_data_enc_email(encoded: &str) -> Option<String> {
    if encoded.is_empty() {
        return None;
    }
    let encoded = encoded.replace("[at]", "@");

    let decoded = rot13(&encoded);
    if decoded.contains('@') && validator::is_valid(&decoded) {
        return Some(decoded);
    }

    let chars: Vec<char> = encoded.chars().collect();
    if chars.len() < 26 {
        tracing::debug!("data-enc-email value too short for substitution: {}", encoded);
        return None;
    }
    let mut alphabet = std::collections::HashMap::new();
    for (i, c) in chars.iter().take(26).enumerate() {
        alphabet.insert(*c, (b'a' + i as u8) as char);
    }
    let decoded: String = chars
        .iter()
        .map(|c| alphabet.get(c).copied().unwrap_or(*c))
        .collect();
    if decoded.contains('@') && validator::is_valid(&decoded) {
        return Some(decoded);
    }

    tracing::debug!("Could not decode data-enc-email value: {}", encoded);
    None
}

const JS_NAME: &str = r"[A-Za-z_][A-Za-z0-9_]*";
const JS_LITERAL: &str = r#"(?:'[^']*'|"[^"]*")"#;

/// `[var|let|const] name (=|+=) [other +] 'lit' + "lit" ...`
static JS_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"(?:\b(?:var|let|const)\s+)?\b({name})\s*(\+?=)\s*(?:({name})\s*\+\s*)?({lit}(?:\s*\+\s*{lit})*)",
        name = JS_NAME,
        lit = JS_LITERAL,
    );
    Regex::new(&pattern).expect("Failed to compile JS_STATEMENT")
});

static JS_LITERAL_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'([^']*)'|"([^"]*)""#).expect("Failed to compile JS_LITERAL_VALUE")
});

static JS_EMAIL_PARTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"['"]([A-Za-z0-9._%+\-]+)['"]\s*\+\s*['"]@['"]"#)
        .expect("Failed to compile JS_EMAIL_PARTS")
});

static JS_EMAIL_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"['"]([A-Za-z0-9.\-]+)['"]\s*\+\s*['"]\.['"]\s*\+\s*['"]([A-Za-z]{2,})['"]"#)
        .expect("Failed to compile JS_EMAIL_DOMAIN")
});

/// `var addy = 'user' + '@'; addy = addy + 'host' + '.' + 'tld';`
static JS_ADDY_IDIOM: Lazy<fancy_regex::Regex> = Lazy::new(|| {
    fancy_regex::Regex::new(
        r#"var\s+([A-Za-z0-9_]+)\s*=\s*['"]([^'"]+)['"]\s*\+\s*['"]@['"];\s*\1\s*=\s*\1\s*\+\s*['"]([^'"]+)['"]\s*\+\s*['"]\.['"]\s*\+\s*['"]([^'"]+)['"];"#,
    )
    .expect("Failed to compile JS_ADDY_IDIOM")
});

/// Cloaking plugins write the address into `#cloak…` from three concatenated variables.
static JS_CLOAK_IDIOM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"document\.getElementById\(['"]cloak[A-Za-z0-9]+['"]\)\.innerHTML\s*=\s*['"][^'"]*['"];\s*var\s+[A-Za-z0-9_]+\s*=\s*['"][^'"]+['"](?:\s*\+\s*['"][^'"]+['"])+;\s*var\s+[A-Za-z0-9_]+\s*=\s*['"][^'"]+['"](?:\s*\+\s*['"][^'"]+['"])+;\s*var\s+([A-Za-z0-9_]+)\s*=\s*['"]([^'"]+)['"]\s*\+\s*['"]@['"];"#,
    )
    .expect("Failed to compile JS_CLOAK_IDIOM")
});

fn concat_literals(literals: &str) -> String {
    JS_LITERAL_VALUE
        .captures_iter(literals)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
        .collect()
}

/// Replays string assignments of a script in source order and returns the
/// final value of every variable, in order of first assignment.
fn track_js_variables(js: &str) -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = Vec::new();

    for caps in JS_STATEMENT.captures_iter(js) {
        let name = &caps[1];
        let appending = &caps[2] == "+=";
        let source = caps.get(3).map(|m| m.as_str());
        let literal = concat_literals(&caps[4]);

        let current = vars.iter().position(|(n, _)| n == name);
        let base = if appending || source == Some(name) {
            current.map(|i| vars[i].1.clone()).unwrap_or_default()
        } else if let Some(other) = source {
            vars.iter()
                .find(|(n, _)| n == other)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        } else {
            String::new()
        };

        let value = base + &literal;
        match current {
            Some(i) => vars[i].1 = value,
            None => vars.push((name.to_string(), value)),
        }
    }

    vars
}

/// Rebuilds email addresses assembled through string concatenation in a script.
pub fn extract_js_emails(js: &str) -> EmailSet {
    let mut emails = EmailSet::new();
    if js.is_empty() {
        return emails;
    }
    let js = decode_entities(js);

    for (name, value) in track_js_variables(&js) {
        let found = recognizer::find_emails(&value);
        if !found.is_empty() {
            tracing::debug!("Reconstructed email from script variable '{}'", name);
        }
        emails.extend(found);
    }

    for caps in JS_EMAIL_PARTS.captures_iter(&js) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(domain) = JS_EMAIL_DOMAIN.captures(&js[whole.end()..]) {
            let email = format!("{}@{}.{}", &caps[1], &domain[1], &domain[2]);
            if validator::is_valid(&email) {
                emails.insert(email);
            }
        }
    }

    for caps in JS_ADDY_IDIOM.captures_iter(&js) {
        let Ok(caps) = caps else { break };
        if let (Some(user), Some(host), Some(tld)) = (caps.get(2), caps.get(3), caps.get(4)) {
            let email = format!("{}@{}.{}", user.as_str(), host.as_str(), tld.as_str());
            if validator::is_valid(&email) {
                emails.insert(email);
            }
        }
    }

    for caps in JS_CLOAK_IDIOM.captures_iter(&js) {
        let Some(whole) = caps.get(0) else { continue };
        let var = regex::escape(&caps[1]);
        let domain_pattern = format!(
            r#"{var}\s*=\s*{var}\s*\+\s*['"]([^'"]+)['"]\s*\+\s*['"]\.['"]\s*\+\s*['"]([^'"]+)['"];"#,
            var = var
        );
        let Ok(domain_regex) = Regex::new(&domain_pattern) else {
            continue;
        };
        if let Some(domain) = domain_regex.captures(&js[whole.end()..]) {
            let email = format!("{}@{}.{}", &caps[2], &domain[1], &domain[2]);
            if validator::is_valid(&email) {
                emails.insert(email);
            }
        }
    }

    emails
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("info&#64;acme&#46;io"), "info@acme.io");
        assert_eq!(decode_entities("info&commat;acme&period;io"), "info@acme.io");
        assert_eq!(decode_entities("&#105;&#x6E;fo&#x40;acme.io"), "info@acme.io");
        assert_eq!(decode_entities("a &amp;#64; b"), "a @ b");
        assert_eq!(decode_entities("&#99999999999; stays"), "&#99999999999; stays");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn test_rot13_is_self_inverse() {
        for s in ["", "Hello, World!", "info@acme.io", "ÄÖÜ 123 xyzXYZ", "[at](et)"] {
            assert_eq!(rot13(&rot13(s)), s);
        }
        assert_eq!(rot13("vasb@npzr.vb"), "info@acme.io");
    }

    #[test]
    fn test_decode_base64_is_lenient() {
        assert_eq!(decode_base64("aW5mb0BhY21lLmlv"), "info@acme.io");
        assert_eq!(decode_base64("aW5mb0BhY21lLmlvLg"), "info@acme.io.");
        assert_eq!(decode_base64("!!not base64!!"), "");
        assert_eq!(decode_base64(""), "");
        assert!(matches!(try_decode_base64("%%%"), Err(AppError::Decode(_))));
    }

    #[test]
    fn test_xor_decode_round_trip() {
        let encoded = xor_decode("info@acme.io", 42);
        assert_ne!(encoded, "info@acme.io");
        assert_eq!(xor_decode(&encoded, 42), "info@acme.io");
    }

    #[test]
    fn test_deobfuscate_email() {
        assert_eq!(deobfuscate_email("info(at)acme.io"), "info@acme.io");
        assert_eq!(deobfuscate_email("info [AT] acme.io"), "info@acme.io");
        assert_eq!(deobfuscate_email("info at acme.io"), "info@acme.io");
        assert_eq!(deobfuscate_email("info@acme.at"), "info@acme.at");
    }

    #[test]
    fn test_data_enc_email_prefers_rot13() {
        assert_eq!(
            decode_data_enc_email("vasb[at]npzr.vb").as_deref(),
            Some("info@acme.io")
        );
    }

    #[test]
    fn test_data_enc_email_substitution_fallback() {
        let encoded = "0123456789klmnopqrstuvwxyz@acme.01";
        assert_eq!(
            decode_data_enc_email(encoded).as_deref(),
            Some("abcdefghijklmnopqrstuvwxyz@acme.ab")
        );
    }

    #[test]
    fn test_data_enc_email_gives_up() {
        assert_eq!(decode_data_enc_email("short"), None);
        assert_eq!(decode_data_enc_email(""), None);
    }

    #[test]
    fn test_js_variable_concatenation() {
        let js = "var a = 'info'; a = a + '@' + 'acme'; a += '.io'; var b = 'x';";
        assert_eq!(extract_js_emails(js).into_vec(), vec!["info@acme.io"]);
    }

    #[test]
    fn test_js_assignment_from_other_variable() {
        let js = r#"let user = "sales"; const mail = user + "&#64;" + "acme-corp" + "&#46;io";"#;
        assert_eq!(extract_js_emails(js).into_vec(), vec!["sales@acme-corp.io"]);
    }

    #[test]
    fn test_js_inline_parts() {
        let js = r#"document.write('<a>' + 'jobs' + '@' + '</a>' + 'acme' + '.' + 'org');"#;
        assert!(extract_js_emails(js).contains("jobs@acme.org"));
    }

    #[test]
    fn test_js_cloak_idiom() {
        let js = "document.getElementById('cloak4f2a').innerHTML = '';\n\
                  var prefix = '&#109;a' + 'i&#108;' + '&#116;o';\n\
                  var path = 'hr' + 'ef' + '=';\n\
                  var addy4f2a = 'office' + '&#64;';\n\
                  addy4f2a = addy4f2a + 'acme-corp' + '&#46;' + 'de';";
        assert_eq!(extract_js_emails(js).into_vec(), vec!["office@acme-corp.de"]);
    }

    #[test]
    fn test_js_without_emails() {
        assert!(extract_js_emails("var x = 1 + 2; console.log('hi');").is_empty());
        assert!(extract_js_emails("").is_empty());
    }
}
