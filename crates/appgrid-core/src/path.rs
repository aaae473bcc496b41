//! Path algebra for group and application ids.
//!
//! The canonical form of every id is an absolute path rooted at the
//! appset name: `/<appset>/<group>/.../<leaf>`. Ids supplied by callers
//! may also be relative (`web`, `db/mysql`), in which case they are
//! resolved against the owning group.
//!
//! The scheduler names tasks `<appset>[_<group>]_<app>.<uuid>`;
//! [`app_id_from_task_id`] inverts that encoding.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Separator the scheduler uses between segments inside a task id.
const TASK_SEGMENT_SEPARATOR: char = '_';

static APPSET_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$")
        .expect("appset name pattern is valid")
});

/// Errors raised while parsing or resolving ids.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("id is empty")]
    Empty,

    #[error("id {0:?} has no root group")]
    NoRootGroup(String),

    #[error("invalid appset name: {0:?}")]
    InvalidName(String),

    #[error("invalid task id: {0:?}")]
    InvalidTaskId(String),
}

/// A parsed id: absolute flag plus its non-empty segments.
///
/// Parsing once and recursing over `segments()` keeps the tree code free
/// of repeated prefix checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPath<'a> {
    absolute: bool,
    segments: Vec<&'a str>,
}

impl<'a> AppPath<'a> {
    /// Parse an id. Empty segments (`//`, trailing `/`) are dropped.
    pub fn parse(id: &'a str) -> Result<Self, PathError> {
        let segments: Vec<&str> = id.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self {
            absolute: is_absolute(id),
            segments,
        })
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segments(&self) -> &[&'a str] {
        &self.segments
    }

    /// Last segment of the path.
    pub fn leaf(&self) -> &'a str {
        // parse() guarantees at least one segment.
        self.segments[self.segments.len() - 1]
    }
}

impl fmt::Display for AppPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "{SEPARATOR}")?;
        }
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Whether `id` is written in absolute form.
pub fn is_absolute(id: &str) -> bool {
    id.starts_with(SEPARATOR)
}

/// Resolve `id` against `parent`.
///
/// Absolute ids are returned unchanged, so applying this twice is the
/// same as applying it once.
pub fn to_absolute(id: &str, parent: &str) -> String {
    let id = id.trim_end_matches(SEPARATOR);
    if is_absolute(id) {
        return id.to_string();
    }
    join(&root_form(parent), id)
}

/// Join a parent id and a relative child id with exactly one separator.
pub fn join(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches(SEPARATOR);
    let child = child.trim_start_matches(SEPARATOR);
    if child.is_empty() {
        return parent.to_string();
    }
    format!("{parent}{SEPARATOR}{child}")
}

/// All but the last segment. `/shop/web` → `/shop`, `/shop` → `/`,
/// `web` → ``.
pub fn parent(id: &str) -> String {
    let id = id.trim_end_matches(SEPARATOR);
    match id.rsplit_once(SEPARATOR) {
        Some(("", _)) => SEPARATOR.to_string(),
        Some((head, _)) => head.to_string(),
        None => String::new(),
    }
}

/// Last segment of an id, or the id itself when it has no separator.
pub fn last_segment(id: &str) -> &str {
    let id = id.trim_end_matches(SEPARATOR);
    id.rsplit(SEPARATOR).next().unwrap_or(id)
}

/// First segment of an absolute id: the appset the id belongs to.
pub fn root_group_name(id: &str) -> Result<&str, PathError> {
    let mut parts = id.split(SEPARATOR);
    let (Some(""), Some(root)) = (parts.next(), parts.next()) else {
        return Err(PathError::NoRootGroup(id.to_string()));
    };
    if root.is_empty() {
        return Err(PathError::NoRootGroup(id.to_string()));
    }
    Ok(root)
}

/// Whether `id` lies strictly below `ancestor`.
pub fn is_descendant(id: &str, ancestor: &str) -> bool {
    let ancestor = ancestor.trim_end_matches(SEPARATOR);
    id.strip_prefix(ancestor)
        .is_some_and(|rest| rest.len() > 1 && rest.starts_with(SEPARATOR))
}

/// Decode the owning application id from a scheduler task id.
///
/// `iot_server_web.9f2a…` → `/iot/server/web`.
pub fn app_id_from_task_id(task_id: &str) -> Result<String, PathError> {
    let Some((encoded, suffix)) = task_id.rsplit_once('.') else {
        return Err(PathError::InvalidTaskId(task_id.to_string()));
    };
    if suffix.is_empty() {
        return Err(PathError::InvalidTaskId(task_id.to_string()));
    }
    let segments: Vec<&str> = encoded
        .split(TASK_SEGMENT_SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(PathError::InvalidTaskId(task_id.to_string()));
    }
    Ok(format!("{SEPARATOR}{}", segments.join("/")))
}

/// Check an appset name against the DNS-label style grammar.
pub fn validate_appset_name(name: &str) -> Result<(), PathError> {
    if APPSET_NAME.is_match(name) {
        Ok(())
    } else {
        Err(PathError::InvalidName(name.to_string()))
    }
}

fn root_form(parent: &str) -> String {
    let trimmed = parent.trim_matches(SEPARATOR);
    format!("{SEPARATOR}{trimmed}")
}
