//! Shape of the credentials callback a Git transport invokes when a remote
//! challenges it. The negotiation core never sees these types; the suppliers in
//! [`super::http`] and [`super::ssh`] translate between the two.

use std::fmt;

/// Kind of a requested field, independent of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    Username,
    Password,
    YesNo,
    Text,
}

/// One slot the transport asks to be filled.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialItem {
    Username(Option<String>),
    Password(Option<String>),
    YesNo { prompt: String, value: Option<bool> },
    Text { prompt: String, value: Option<String> },
}

impl CredentialItem {
    pub fn username() -> Self {
        CredentialItem::Username(None)
    }

    pub fn password() -> Self {
        CredentialItem::Password(None)
    }

    pub fn field(&self) -> CredentialField {
        match self {
            CredentialItem::Username(_) => CredentialField::Username,
            CredentialItem::Password(_) => CredentialField::Password,
            CredentialItem::YesNo { .. } => CredentialField::YesNo,
            CredentialItem::Text { .. } => CredentialField::Text,
        }
    }

    /// Value of a `Username`, `Password` or `Text` slot.
    pub fn value(&self) -> Option<&str> {
        match self {
            CredentialItem::Username(value)
            | CredentialItem::Password(value)
            | CredentialItem::Text { value, .. } => value.as_deref(),
            CredentialItem::YesNo { .. } => None,
        }
    }

    /// Fill a `Username`, `Password` or `Text` slot. Returns `false` for other slots.
    pub fn set_value(&mut self, new_value: &str) -> bool {
        match self {
            CredentialItem::Username(value)
            | CredentialItem::Password(value)
            | CredentialItem::Text { value, .. } => {
                *value = Some(new_value.to_string());
                true
            }
            CredentialItem::YesNo { .. } => false,
        }
    }
}

impl fmt::Debug for CredentialItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialItem::Username(value) => f.debug_tuple("Username").field(value).finish(),
            CredentialItem::Password(value) => f
                .debug_tuple("Password")
                .field(&value.as_ref().map(|_| "<redacted>"))
                .finish(),
            CredentialItem::YesNo { prompt, value } => f
                .debug_struct("YesNo")
                .field("prompt", prompt)
                .field("value", value)
                .finish(),
            CredentialItem::Text { prompt, value } => f
                .debug_struct("Text")
                .field("prompt", prompt)
                .field("value", value)
                .finish(),
        }
    }
}

/// Credentials callback as seen by the transport.
///
/// `get` is a blocking call: it may wait on the interactive layer, so the
/// transport must invoke it from a worker thread.
pub trait CredentialsProvider: Send + Sync {
    fn is_interactive(&self) -> bool;

    fn supports(&self, items: &[CredentialItem]) -> bool;

    /// Fill `items` for `uri`. Returning `false` aborts the operation.
    fn get(&self, uri: &str, items: &mut [CredentialItem]) -> bool;

    /// Called once the operation authenticated, to remember what worked.
    fn cache_credentials_if_needed(&self) {}

    /// Called when the server refused what the last `get` for `uri` returned.
    fn reject_credentials(&self, _uri: &str) {}
}

pub(crate) fn find_slot(items: &[CredentialItem], field: CredentialField) -> Option<usize> {
    items.iter().position(|item| item.field() == field)
}
