use crate::identity::Identity;

/// A reusable record for one in-flight receive. Bound to a connection for
/// its whole lifetime: exactly one outstanding receive per connection,
/// never shared, returned to the read pool on teardown.
pub(crate) struct ReadOpRecord {
    pub(crate) owner: Identity,
}

/// A reusable record for one in-flight send burst. Checked out when a
/// connection's outbound backlog goes from empty to non-empty, and
/// returned once the backlog fully drains.
pub(crate) struct WriteOpRecord {
    pub(crate) owner: Identity,
}
