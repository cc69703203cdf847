//! Hierarchical ordinals: task groups render as `N.0`, subtasks as `N.M`.
//!
//! Both serialize as their display string so batch records and emitted
//! documents use the same spelling.

use crate::error::{Result, TaskforgeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupOrdinal(pub u32);

impl GroupOrdinal {
    pub fn subtask(self, index: u32) -> SubtaskOrdinal {
        SubtaskOrdinal {
            group: self.0,
            index,
        }
    }
}

impl fmt::Display for GroupOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.0", self.0)
    }
}

impl FromStr for GroupOrdinal {
    type Err = TaskforgeError;

    /// Accepts `2.0` and the shorthand `2`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let head = match s.split_once('.') {
            Some((head, "0")) => head,
            Some(_) => return Err(TaskforgeError::InvalidOrdinal(s.to_string())),
            None => s,
        };
        match head.parse::<u32>() {
            Ok(n) if n > 0 => Ok(GroupOrdinal(n)),
            _ => Err(TaskforgeError::InvalidOrdinal(s.to_string())),
        }
    }
}

impl TryFrom<String> for GroupOrdinal {
    type Error = TaskforgeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<GroupOrdinal> for String {
    fn from(o: GroupOrdinal) -> Self {
        o.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubtaskOrdinal {
    pub group: u32,
    pub index: u32,
}

impl SubtaskOrdinal {
    pub fn group_ordinal(self) -> GroupOrdinal {
        GroupOrdinal(self.group)
    }
}

impl fmt::Display for SubtaskOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.index)
    }
}

impl FromStr for SubtaskOrdinal {
    type Err = TaskforgeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || TaskforgeError::InvalidOrdinal(s.to_string());
        let (group, index) = s.split_once('.').ok_or_else(invalid)?;
        let group: u32 = group.parse().map_err(|_| invalid())?;
        let index: u32 = index.parse().map_err(|_| invalid())?;
        if group == 0 || index == 0 {
            return Err(invalid());
        }
        Ok(SubtaskOrdinal { group, index })
    }
}

impl TryFrom<String> for SubtaskOrdinal {
    type Error = TaskforgeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SubtaskOrdinal> for String {
    fn from(o: SubtaskOrdinal) -> Self {
        o.to_string()
    }
}
