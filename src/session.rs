//! Per-client session state.

use crate::types::Identity;

/// Current identity and channel selection of one client.
///
/// Owned by the event loop and lent to the router for each call. Only the
/// router mutates it: on a successful sign-in and on `ChangeChannel`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionContext {
    identity: Option<Identity>,
    selected_channel: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }

    /// Key of the channel whose track is being followed.
    pub fn selected_channel(&self) -> Option<&str> {
        self.selected_channel.as_deref()
    }

    pub(crate) fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    pub(crate) fn select_channel(&mut self, channel_key: impl Into<String>) {
        self.selected_channel = Some(channel_key.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let session = SessionContext::new();
        assert!(!session.is_signed_in());
        assert!(session.identity().is_none());
        assert!(session.selected_channel().is_none());
    }

    #[test]
    fn test_sign_in_replaces_identity() {
        let mut session = SessionContext::new();
        session.set_identity(Identity::new("alice"));
        session.set_identity(Identity::new("bob"));
        assert_eq!(session.identity().unwrap().user_id, "bob");
    }

    #[test]
    fn test_select_channel() {
        let mut session = SessionContext::new();
        session.select_channel("alice");
        assert_eq!(session.selected_channel(), Some("alice"));
    }
}
