//! World configuration.

/// When stale entity handles are rejected instead of ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrictMode {
    /// Operations on stale handles are silent no-ops.
    #[default]
    Off,
    /// Reject stale handles in debug builds only.
    DebugOnly,
    /// Always reject stale handles.
    Always,
}

impl StrictMode {
    /// Returns true if stale handles should raise `StaleEntity`.
    #[must_use]
    pub const fn is_active(self) -> bool {
        match self {
            Self::Off => false,
            Self::DebugOnly => cfg!(debug_assertions),
            Self::Always => true,
        }
    }
}

/// Configuration for a single world.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldConfig {
    /// Ceiling on live user entities. `None` means unbounded.
    pub max_entities: Option<u32>,
    /// Stale-handle policy.
    pub strict: StrictMode,
    /// Entity index slots to reserve up front.
    pub initial_capacity: usize,
}

impl WorldConfig {
    /// No entity ceiling, stale handles ignored.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Stale handles always rejected.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict: StrictMode::Always,
            ..Self::default()
        }
    }

    /// Sets the live entity ceiling.
    #[must_use]
    pub fn with_max_entities(mut self, max: u32) -> Self {
        self.max_entities = Some(max);
        self
    }

    /// Sets the stale-handle policy.
    #[must_use]
    pub fn with_strict(mut self, strict: StrictMode) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the number of entity slots reserved at creation.
    #[must_use]
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
