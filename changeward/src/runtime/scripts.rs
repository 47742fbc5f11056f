use redis::Script;
use std::sync::LazyLock;

pub const LOCK_ACQUIRE_SCRIPT_BODY: &str = include_str!("../../lua/lock_acquire.lua");
pub const LOCK_EXTEND_SCRIPT_BODY: &str = include_str!("../../lua/lock_extend.lua");
pub const LOCK_RELEASE_SCRIPT_BODY: &str = include_str!("../../lua/lock_release.lua");
pub const LOCK_HELD_BY_OTHER_SCRIPT_BODY: &str = include_str!("../../lua/lock_held_by_other.lua");
pub const CHANGE_ENTRY_SAVE_SCRIPT_BODY: &str = include_str!("../../lua/change_entry_save.lua");

pub static LOCK_ACQUIRE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(LOCK_ACQUIRE_SCRIPT_BODY));
pub static LOCK_EXTEND_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(LOCK_EXTEND_SCRIPT_BODY));
pub static LOCK_RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(LOCK_RELEASE_SCRIPT_BODY));
pub static LOCK_HELD_BY_OTHER_SCRIPT: LazyLock<Script> =
    LazyLock::new(|| Script::new(LOCK_HELD_BY_OTHER_SCRIPT_BODY));
pub static CHANGE_ENTRY_SAVE_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(CHANGE_ENTRY_SAVE_SCRIPT_BODY));

/// Lock scripts, preloaded when the lock store initializes.
pub fn lock_scripts() -> [&'static str; 4] {
    [
        LOCK_ACQUIRE_SCRIPT_BODY,
        LOCK_EXTEND_SCRIPT_BODY,
        LOCK_RELEASE_SCRIPT_BODY,
        LOCK_HELD_BY_OTHER_SCRIPT_BODY,
    ]
}
