/// Outcome of an insert guarded by an external-reference uniqueness
/// constraint. A conflict is an explicit variant, not an error — it means a
/// redelivery or the other writer already produced the row.
#[derive(Debug)]
pub enum InsertOutcome<T> {
    Inserted(T),
    AlreadyExists(T),
}

impl<T> InsertOutcome<T> {
    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    /// Converts a storage-level conflict into the correct business outcome:
    /// the existing row, with the duplicate noted.
    pub fn resolve(self, entity: &str, reference: &str) -> T {
        match self {
            Self::Inserted(row) => row,
            Self::AlreadyExists(row) => {
                tracing::info!(entity, reference, "duplicate suppressed");
                row
            }
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Inserted(row) | Self::AlreadyExists(row) => row,
        }
    }
}
