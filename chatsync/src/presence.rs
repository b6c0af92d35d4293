//! Online-user tracking from server presence snapshots.

use chatsync_proto::message::Identity;

/// The set of identities the server last reported as online.
///
/// Membership is only ever replaced wholesale: the server pushes a complete
/// snapshot and decides the deltas itself.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    users: Vec<Identity>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub const fn new() -> Self {
        Self { users: Vec::new() }
    }

    /// Replace the presence set with exactly `users`.
    ///
    /// Server order is kept for display; repeated names collapse to their
    /// first occurrence so the view is a set.
    pub fn replace(&mut self, users: Vec<Identity>) {
        let mut deduped: Vec<Identity> = Vec::with_capacity(users.len());
        for user in users {
            if !deduped.contains(&user) {
                deduped.push(user);
            }
        }
        self.users = deduped;
    }

    /// Online identities in the order the server listed them.
    #[must_use]
    pub fn users(&self) -> &[Identity] {
        &self.users
    }

    /// Whether `user` is in the latest snapshot.
    #[must_use]
    pub fn contains(&self, user: &Identity) -> bool {
        self.users.contains(user)
    }

    /// Number of online identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
