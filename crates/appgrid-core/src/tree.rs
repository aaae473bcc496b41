//! Path-addressed operations over a [`Group`] tree.
//!
//! Two addressing modes are supported:
//!
//! - **absolute** (`/shop/db/mysql`): the first segment must name the group
//!   the operation starts from; intermediate groups must already exist.
//! - **relative** (`db/mysql`): segments are resolved from the starting
//!   group's children. [`Group::insert_relative`] creates missing
//!   intermediate groups, which is how nested documents are imported.
//!
//! At every level a child group matches a segment when its id equals the
//! segment or its last path segment does.

use thiserror::Error;
use tracing::debug;

use crate::path::{self, AppPath, PathError};
use crate::types::{Application, Group};

/// Errors raised by tree operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("{id} is outside group {group}")]
    OutsideGroup { id: String, group: String },
}

pub type TreeResult<T> = Result<T, TreeError>;

impl Group {
    /// Insert `app`, dispatching on whether its id is absolute.
    ///
    /// Returns the id the application was stored under.
    pub fn insert(&mut self, app: Application) -> TreeResult<String> {
        if path::is_absolute(&app.id) {
            self.insert_absolute(app)
        } else {
            self.insert_relative(app)
        }
    }

    /// Insert an application addressed relative to this group, creating
    /// intermediate groups as needed.
    pub fn insert_relative(&mut self, mut app: Application) -> TreeResult<String> {
        let id = app.id.clone();
        let parsed = AppPath::parse(&id)?;
        let (dirs, leaf) = split_leaf(parsed.segments());
        let owner = locate_or_create(self, dirs);
        if owner_position(owner, &id, leaf).is_some() {
            return Err(TreeError::AlreadyExists(id.clone()));
        }
        app.id = if path::is_absolute(&owner.id) {
            path::join(&owner.id, leaf)
        } else {
            leaf.to_string()
        };
        debug!(group = %owner.id, app = %app.id, "application inserted");
        let stored = app.id.clone();
        owner.apps.push(app);
        Ok(stored)
    }

    /// Insert an application by absolute id. Never creates groups.
    pub fn insert_absolute(&mut self, app: Application) -> TreeResult<String> {
        let id = app.id.clone();
        let parsed = AppPath::parse(&id)?;
        let dirs = self.absolute_dirs(&parsed, &id)?;
        let owner = locate_mut(self, dirs).ok_or_else(|| TreeError::NotFound(id.clone()))?;
        if owner_position(owner, &id, parsed.leaf()).is_some() {
            return Err(TreeError::AlreadyExists(id.clone()));
        }
        debug!(group = %owner.id, app = %id, "application inserted");
        owner.apps.push(app);
        Ok(id)
    }

    /// Find an application by absolute or relative id.
    pub fn find_app(&self, id: &str) -> TreeResult<&Application> {
        let parsed = AppPath::parse(id)?;
        let dirs = self.dirs_for(&parsed, id)?;
        let owner = locate(self, dirs).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        owner_position(owner, id, parsed.leaf())
            .map(|i| &owner.apps[i])
            .ok_or_else(|| TreeError::NotFound(id.to_string()))
    }

    /// Mutable lookup, same addressing as [`Group::find_app`].
    pub fn find_app_mut(&mut self, id: &str) -> TreeResult<&mut Application> {
        let parsed = AppPath::parse(id)?;
        let dirs = self.dirs_for(&parsed, id)?;
        let owner = locate_mut(self, dirs).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        match owner_position(owner, id, parsed.leaf()) {
            Some(i) => Ok(&mut owner.apps[i]),
            None => Err(TreeError::NotFound(id.to_string())),
        }
    }

    /// Replace the application addressed by `app.id`, keeping its stored id.
    ///
    /// Returns the previous definition.
    pub fn update_app(&mut self, mut app: Application) -> TreeResult<Application> {
        let id = app.id.clone();
        let slot = self.find_app_mut(&id)?;
        app.id = slot.id.clone();
        Ok(std::mem::replace(slot, app))
    }

    /// Remove the application addressed by `id` and return it.
    pub fn delete_app(&mut self, id: &str) -> TreeResult<Application> {
        let parsed = AppPath::parse(id)?;
        let dirs = self.dirs_for(&parsed, id)?;
        let owner = locate_mut(self, dirs).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        let index = owner_position(owner, id, parsed.leaf())
            .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        debug!(group = %owner.id, app = %id, "application deleted");
        Ok(owner.apps.remove(index))
    }

    /// Rewrite every group id, application id and dependency into absolute
    /// form below `parent` (use `""` for an appset root).
    ///
    /// Fails if a child group or application does not resolve to a direct
    /// child of its owner, since lookups descend one segment per group.
    pub fn canonicalize(&mut self, parent: &str) -> TreeResult<()> {
        if self.id.is_empty() {
            return Err(TreeError::Path(PathError::Empty));
        }
        self.id = path::to_absolute(&self.id, parent);
        if !parent.is_empty() && path::parent(&self.id) != parent.trim_end_matches('/') {
            return Err(TreeError::OutsideGroup {
                id: self.id.clone(),
                group: parent.to_string(),
            });
        }
        let own_id = self.id.clone();
        self.dependencies = self
            .dependencies
            .iter()
            .map(|dep| path::to_absolute(dep, &path::parent(&own_id)))
            .collect();

        for app in &mut self.apps {
            if app.id.is_empty() {
                return Err(TreeError::Path(PathError::Empty));
            }
            app.id = path::to_absolute(&app.id, &own_id);
            if path::parent(&app.id) != own_id {
                return Err(TreeError::OutsideGroup {
                    id: app.id.clone(),
                    group: own_id.clone(),
                });
            }
            app.dependencies = app
                .dependencies
                .iter()
                .map(|dep| path::to_absolute(dep, &own_id))
                .collect();
        }
        for child in &mut self.groups {
            child.canonicalize(&own_id)?;
        }
        Ok(())
    }

    /// All applications in desired-state order: this group's own
    /// applications, then each child group depth-first.
    pub fn applications(&self) -> Vec<&Application> {
        let mut out = Vec::new();
        collect_apps(self, &mut out);
        out
    }

    /// Number of applications anywhere in the tree.
    pub fn app_count(&self) -> usize {
        self.apps.len() + self.groups.iter().map(Group::app_count).sum::<usize>()
    }

    /// Whether the tree holds no applications at all.
    pub fn is_empty(&self) -> bool {
        self.app_count() == 0
    }

    /// Visit every application in desired-state order, stopping at the
    /// first error.
    pub fn visit_apps<E>(
        &self,
        f: &mut impl FnMut(&Application) -> Result<(), E>,
    ) -> Result<(), E> {
        for app in &self.apps {
            f(app)?;
        }
        for child in &self.groups {
            child.visit_apps(f)?;
        }
        Ok(())
    }

    /// Mutable counterpart of [`Group::visit_apps`].
    pub fn visit_apps_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut Application) -> Result<(), E>,
    ) -> Result<(), E> {
        for app in &mut self.apps {
            f(app)?;
        }
        for child in &mut self.groups {
            child.visit_apps_mut(f)?;
        }
        Ok(())
    }

    /// Directory segments below this group for an id in either mode.
    fn dirs_for<'p>(&self, parsed: &'p AppPath<'p>, id: &str) -> TreeResult<&'p [&'p str]> {
        if parsed.is_absolute() {
            self.absolute_dirs(parsed, id)
        } else {
            Ok(split_leaf(parsed.segments()).0)
        }
    }

    /// For an absolute id, check the root segment names this group and
    /// return the segments between it and the leaf.
    fn absolute_dirs<'p>(&self, parsed: &'p AppPath<'p>, id: &str) -> TreeResult<&'p [&'p str]> {
        let segments = parsed.segments();
        if segments.len() < 2 || !segment_matches(&self.id, segments[0]) {
            return Err(TreeError::OutsideGroup {
                id: id.to_string(),
                group: self.id.clone(),
            });
        }
        Ok(&segments[1..segments.len() - 1])
    }
}

fn split_leaf<'a, 'b>(segments: &'b [&'a str]) -> (&'b [&'a str], &'a str) {
    match segments.split_last() {
        Some((leaf, dirs)) => (dirs, leaf),
        None => (&[], ""),
    }
}

fn segment_matches(id: &str, segment: &str) -> bool {
    id == segment || path::last_segment(id) == segment
}

fn owner_position(owner: &Group, id: &str, leaf: &str) -> Option<usize> {
    owner
        .apps
        .iter()
        .position(|app| app.id == id || path::last_segment(&app.id) == leaf)
}

fn locate<'g>(group: &'g Group, dirs: &[&str]) -> Option<&'g Group> {
    match dirs {
        [] => Some(group),
        [head, rest @ ..] => {
            let child = group.groups.iter().find(|g| segment_matches(&g.id, head))?;
            locate(child, rest)
        }
    }
}

fn locate_mut<'g>(group: &'g mut Group, dirs: &[&str]) -> Option<&'g mut Group> {
    match dirs {
        [] => Some(group),
        [head, rest @ ..] => {
            let child = group
                .groups
                .iter_mut()
                .find(|g| segment_matches(&g.id, head))?;
            locate_mut(child, rest)
        }
    }
}

fn locate_or_create<'g>(group: &'g mut Group, dirs: &[&str]) -> &'g mut Group {
    match dirs {
        [] => group,
        [head, rest @ ..] => {
            let index = match group.groups.iter().position(|g| segment_matches(&g.id, head)) {
                Some(i) => i,
                None => {
                    let id = if path::is_absolute(&group.id) {
                        path::join(&group.id, head)
                    } else {
                        head.to_string()
                    };
                    debug!(parent = %group.id, group = %id, "intermediate group created");
                    group.groups.push(Group::new(id));
                    group.groups.len() - 1
                }
            };
            locate_or_create(&mut group.groups[index], rest)
        }
    }
}

fn collect_apps<'g>(group: &'g Group, out: &mut Vec<&'g Application>) {
    out.extend(group.apps.iter());
    for child in &group.groups {
        collect_apps(child, out);
    }
}
