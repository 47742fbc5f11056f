use crate::types::ChangeUnitKey;

/// Default name of the shared lock record.
pub const DEFAULT_LOCK_NAME: &str = "changeward_lock";

/// Common key-construction helpers used by the Redis adapters.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    pub fn lock(&self, lock_name: &str) -> String {
        format!("{}:lock:{}", self.prefix, lock_name)
    }

    /// Hash holding the latest entry per change unit.
    pub fn change_state(&self) -> String {
        format!("{}:changes:state", self.prefix)
    }

    /// List holding every entry ever written, oldest first.
    pub fn change_log(&self) -> String {
        format!("{}:changes:log", self.prefix)
    }

    pub fn change_schema(&self) -> String {
        format!("{}:changes:schema", self.prefix)
    }
}

/// Hash field for a change unit. Length-prefixed so ids containing `:` cannot collide.
pub fn entry_field(key: &ChangeUnitKey) -> String {
    format!("{}:{}:{}", key.change_id.len(), key.change_id, key.author)
}
