use std::fmt;

/// Checks conventional address syntax: a local part, `@`, and a dotted domain,
/// with no whitespace anywhere.
pub fn is_valid(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = candidate.rsplit_once('@') else {
        return false;
    };

    if local.is_empty() || !domain.contains('.') {
        return false;
    }
    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return false;
    }

    email_address::EmailAddress::is_valid(candidate)
}

/// A mailbox address that has passed [`is_valid`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    pub fn parse(candidate: &str) -> Option<Self> {
        is_valid(candidate).then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
