//! Helpers shared by collectors that scrape HTML forms and relay session cookies.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::form_urlencoded;

static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid input regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.$]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Attributes of an HTML start tag, keyed by lowercase name.
#[must_use]
pub fn attributes(tag: &str) -> BTreeMap<String, String> {
    ATTRIBUTE
        .captures_iter(tag)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
            Some((name, decode_entities(value)))
        })
        .collect()
}

/// Value of the first `<input>` whose `name` equals `name`.
#[must_use]
pub fn input_value(html: &str, name: &str) -> Option<String> {
    INPUT_TAG.find_iter(html).find_map(|tag| {
        let mut attrs = attributes(tag.as_str());
        if attrs.get("name").map(String::as_str) == Some(name) {
            Some(attrs.remove("value").unwrap_or_default())
        } else {
            None
        }
    })
}

/// Cookie name/value pairs from a `Set-Cookie` header. Multiple cookies are
/// expected on separate lines.
#[must_use]
pub fn set_cookies(header: &str) -> Vec<(String, String)> {
    header
        .lines()
        .filter_map(|line| {
            let pair = line.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                None
            } else {
                Some((name.to_owned(), value.trim().to_owned()))
            }
        })
        .collect()
}

/// Value of a named cookie inside a `Set-Cookie` header.
#[must_use]
pub fn set_cookie_value(header: &str, name: &str) -> Option<String> {
    set_cookies(header)
        .into_iter()
        .find(|(cookie, _value)| cookie == name)
        .map(|(_cookie, value)| value)
}

/// Percent-decoded value of a named cookie, for echoing into a form field.
#[must_use]
pub fn decoded_cookie_value(header: &str, name: &str) -> Option<String> {
    set_cookie_value(header, name)
        .map(|value| percent_decode_str(&value).decode_utf8_lossy().into_owned())
}

/// Assemble a `Cookie` request header.
#[must_use]
pub fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// URL-encoded form body, keeping field order.
#[must_use]
pub fn form_body<K, V>(fields: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key.as_ref(), value.as_ref());
    }
    serializer.finish()
}

/// Decode the handful of entities that appear in council markup.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Visible text of an HTML fragment with tags removed and whitespace collapsed.
#[must_use]
pub fn clean_text(fragment: &str) -> String {
    let without_tags = TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn finds_hidden_inputs_regardless_of_attribute_order() {
        let html = r#"
            <form>
              <input type="hidden" value="abc123" name="_token">
              <input name='__VIEWSTATE' id="__VIEWSTATE" type='hidden' value='dDw+&amp;x' />
              <input type="hidden" name="empty">
            </form>"#;

        assert_eq!(input_value(html, "_token").as_deref(), Some("abc123"));
        assert_eq!(input_value(html, "__VIEWSTATE").as_deref(), Some("dDw+&x"));
        assert_eq!(input_value(html, "empty").as_deref(), Some(""));
        assert_eq!(input_value(html, "missing"), None);
    }

    #[test]
    fn parses_set_cookie_lines() {
        let header = "ASP.NET_SessionId=xyz; path=/; HttpOnly\nXSRF-TOKEN=tok%3D; Secure";

        assert_eq!(
            set_cookies(header),
            vec![
                ("ASP.NET_SessionId".to_owned(), "xyz".to_owned()),
                ("XSRF-TOKEN".to_owned(), "tok%3D".to_owned()),
            ]
        );
        assert_eq!(set_cookie_value(header, "XSRF-TOKEN").as_deref(), Some("tok%3D"));
        assert_eq!(decoded_cookie_value(header, "XSRF-TOKEN").as_deref(), Some("tok="));
        assert_eq!(
            cookie_header(&set_cookies(header)),
            "ASP.NET_SessionId=xyz; XSRF-TOKEN=tok%3D"
        );
    }

    #[test]
    fn form_bodies_are_encoded_in_order() {
        let body = form_body(&[("postcode", "SW1A 0AA"), ("ctl00$btn", "Find & go")]);
        assert_eq!(body, "postcode=SW1A+0AA&ctl00%24btn=Find+%26+go");
    }

    #[test]
    fn clean_text_strips_markup() {
        assert_eq!(
            clean_text("<td>\n  <b>Green&nbsp;bin</b> &amp; caddy </td>"),
            "Green bin & caddy"
        );
    }
}
