use parse_display::Display;

/// How the node is catching up with the network.
///
/// Derived by the [`Blockchain`](crate::Blockchain) from the state it has available.
/// Payloads received during snap sync are never executed directly.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Display)]
#[display(style = "lowercase")]
pub enum SyncMode {
    #[default]
    Full,
    Snap,
}

impl SyncMode {
    #[must_use]
    pub const fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }
}
