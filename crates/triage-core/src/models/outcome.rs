/// Result of a tolerant mutation.
///
/// Lookup misses and softened input are reported here instead of as errors;
/// callers are free to ignore the value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MutationOutcome {
    Applied,
    /// Target resolved but already in the requested state.
    Unchanged,
    NotFound,
    Rejected,
}

impl MutationOutcome {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}
