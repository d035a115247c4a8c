//! Backend action bitmask.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Combinable flags naming the backend actions a plugin (or the native
/// implementation) can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Actions(u32);

impl Actions {
    /// No actions.
    pub const NONE: Actions = Actions(0);
    pub const CHECK_PASSWORD: Actions = Actions(1 << 0);
    pub const GET_HOME: Actions = Actions(1 << 1);
    pub const GET_DISPLAYNAME: Actions = Actions(1 << 2);
    pub const SET_DISPLAYNAME: Actions = Actions(1 << 3);
    pub const SET_PASSWORD: Actions = Actions(1 << 4);
    pub const CREATE_USER: Actions = Actions(1 << 5);
    pub const COUNT_USERS: Actions = Actions(1 << 6);
    pub const PROVIDE_AVATAR: Actions = Actions(1 << 7);

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits; unknown bits are kept (forward compatibility
    /// with plugin-declared masks).
    pub const fn from_bits(bits: u32) -> Self {
        Actions(bits)
    }

    /// Whether every flag in `other` is set in `self`.
    pub const fn contains(self, other: Actions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any flag in `other` is set in `self`.
    pub const fn intersects(self, other: Actions) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two masks.
    pub const fn union(self, other: Actions) -> Actions {
        Actions(self.0 | other.0)
    }
}

impl BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Actions) -> Actions {
        self.union(rhs)
    }
}

impl BitOrAssign for Actions {
    fn bitor_assign(&mut self, rhs: Actions) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Actions {
    type Output = Actions;

    fn bitand(self, rhs: Actions) -> Actions {
        Actions(self.0 & rhs.0)
    }
}

impl fmt::Display for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Actions, &str); 8] = [
            (Actions::CHECK_PASSWORD, "CHECK_PASSWORD"),
            (Actions::GET_HOME, "GET_HOME"),
            (Actions::GET_DISPLAYNAME, "GET_DISPLAYNAME"),
            (Actions::SET_DISPLAYNAME, "SET_DISPLAYNAME"),
            (Actions::SET_PASSWORD, "SET_PASSWORD"),
            (Actions::CREATE_USER, "CREATE_USER"),
            (Actions::COUNT_USERS, "COUNT_USERS"),
            (Actions::PROVIDE_AVATAR, "PROVIDE_AVATAR"),
        ];

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "NONE")?;
        }
        Ok(())
    }
}
