use std::ops::{Deref, DerefMut};

use crate::errors::Result;
use crate::vector::{Defn, FieldDefn, GeomFieldDefn, LayerAccess};

/// Kind of schema mutation recorded in a [`FieldChangeLog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldChangeKind {
    Add,
    Alter,
    Delete,
}

/// One schema mutation made inside a transaction.
///
/// `defn` is the definition to restore: the field as it was before an
/// `Alter` or `Delete`, the added field for an `Add`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldChange<D> {
    kind: FieldChangeKind,
    index: usize,
    defn: D,
    savepoint: String,
}

impl<D> FieldChange<D> {
    pub fn kind(&self) -> FieldChangeKind {
        self.kind
    }

    /// Index of the field when the change was made.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn defn(&self) -> &D {
        &self.defn
    }

    /// Savepoint active when the change was made, empty outside of one.
    pub fn savepoint(&self) -> &str {
        &self.savepoint
    }
}

/// Schema changes made since the start of the current transaction, used to
/// put the layer definition back on rollback.
#[derive(Clone, Debug, Default)]
pub struct FieldChangeLog {
    fields: Vec<FieldChange<FieldDefn>>,
    geom_fields: Vec<FieldChange<GeomFieldDefn>>,
}

/// A position in a [`FieldChangeLog`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeLogMark {
    fields: usize,
    geom_fields: usize,
}

/// Whether entry `change_savepoint` is undone when rolling back to
/// `savepoint`, walking the log newest first.
fn in_rollback_scope(savepoint: Option<&str>, change_savepoint: &str, found: &mut bool) -> bool {
    match savepoint {
        None | Some("") => true,
        Some(name) if name == change_savepoint => {
            *found = true;
            true
        }
        Some(_) => !*found,
    }
}

impl FieldChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.geom_fields.is_empty()
    }

    pub fn field_changes(&self) -> &[FieldChange<FieldDefn>] {
        &self.fields
    }

    pub fn geom_field_changes(&self) -> &[FieldChange<GeomFieldDefn>] {
        &self.geom_fields
    }

    /// Forgets every recorded change, at transaction start or commit.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.geom_fields.clear();
    }

    pub fn record_field(
        &mut self,
        kind: FieldChangeKind,
        index: usize,
        defn: FieldDefn,
        savepoint: &str,
    ) {
        self.fields.push(FieldChange {
            kind,
            index,
            defn,
            savepoint: savepoint.to_string(),
        });
    }

    pub fn record_geom_field(
        &mut self,
        kind: FieldChangeKind,
        index: usize,
        defn: GeomFieldDefn,
        savepoint: &str,
    ) {
        self.geom_fields.push(FieldChange {
            kind,
            index,
            defn,
            savepoint: savepoint.to_string(),
        });
    }

    /// Position of the end of the log, for [`FieldChangeLog::truncate`].
    pub fn mark(&self) -> ChangeLogMark {
        ChangeLogMark {
            fields: self.fields.len(),
            geom_fields: self.geom_fields.len(),
        }
    }

    /// Drops the entries recorded after `mark` was taken.
    pub fn truncate(&mut self, mark: ChangeLogMark) {
        self.fields.truncate(mark.fields);
        self.geom_fields.truncate(mark.geom_fields);
    }

    /// Undoes the recorded changes on `defn`, newest first.
    ///
    /// With a `savepoint`, only the changes made since that savepoint are
    /// undone. Entries that cannot be undone are logged and kept. Undone
    /// deletions and alterations leave the log; undone additions stay in it
    /// holding the removed definition.
    pub fn finish_rollback(&mut self, defn: &mut Defn, savepoint: Option<&str>) {
        let mut found = false;
        self.undo_fields(defn, |_, change| {
            in_rollback_scope(savepoint, change, &mut found)
        });
        let mut found = false;
        self.undo_geom_fields(defn, |_, change| {
            in_rollback_scope(savepoint, change, &mut found)
        });
    }

    /// Like [`finish_rollback`](FieldChangeLog::finish_rollback), for the
    /// changes recorded after `mark` was taken.
    pub fn finish_rollback_since(&mut self, defn: &mut Defn, mark: ChangeLogMark) {
        self.undo_fields(defn, |i, _| i >= mark.fields);
        self.undo_geom_fields(defn, |i, _| i >= mark.geom_fields);
    }

    fn undo_fields(&mut self, defn: &mut Defn, mut in_scope: impl FnMut(usize, &str) -> bool) {
        let mut undone = Vec::new();
        for i in (0..self.fields.len()).rev() {
            let change = &mut self.fields[i];
            if !in_scope(i, &change.savepoint) {
                continue;
            }
            let index = change.index;
            match change.kind {
                FieldChangeKind::Delete => {
                    let count = defn.field_count();
                    if index > count {
                        tracing::error!(
                            "Failed to restore deleted field {} (field not found at index {index})",
                            change.defn.name()
                        );
                        continue;
                    }
                    defn.add_field_defn(change.defn.clone());
                    // move the appended field from the end back to `index`
                    let order: Vec<usize> = (0..=count)
                        .map(|j| match j.cmp(&index) {
                            std::cmp::Ordering::Less => j,
                            std::cmp::Ordering::Equal => count,
                            std::cmp::Ordering::Greater => j - 1,
                        })
                        .collect();
                    match defn.reorder_field_defns(&order) {
                        Ok(()) => undone.push(i),
                        Err(e) => tracing::error!(
                            "Failed to restore deleted field {}: {e}",
                            change.defn.name()
                        ),
                    }
                }
                FieldChangeKind::Alter => match defn.field_mut(index) {
                    Some(field) => {
                        *field = change.defn.clone();
                        undone.push(i);
                    }
                    None => tracing::error!(
                        "Failed to restore altered field {}",
                        change.defn.name()
                    ),
                },
                FieldChangeKind::Add => match defn.steal_field_defn(index) {
                    Ok(field) => change.defn = field,
                    Err(_) => {
                        tracing::error!("Failed to delete added field {}", change.defn.name())
                    }
                },
            }
        }
        // indices were collected in descending order
        for i in undone {
            self.fields.remove(i);
        }
    }

    fn undo_geom_fields(&mut self, defn: &mut Defn, mut in_scope: impl FnMut(usize, &str) -> bool) {
        for i in (0..self.geom_fields.len()).rev() {
            let change = &mut self.geom_fields[i];
            if !in_scope(i, &change.savepoint) {
                continue;
            }
            match change.kind {
                // not restorable for geometry fields
                FieldChangeKind::Delete | FieldChangeKind::Alter => {}
                FieldChangeKind::Add => match defn.steal_geom_field_defn(change.index) {
                    Ok(field) => change.defn = field,
                    Err(_) => tracing::error!(
                        "Failed to delete added geometry field {}",
                        change.defn.name()
                    ),
                },
            }
        }
    }
}

/// Represents an in-flight transaction on a layer.
///
/// It can either be committed by calling [`commit`](Transaction::commit) or rolled back by calling
/// [`rollback`](Transaction::rollback).
///
/// If the transaction is not explicitly committed when it is dropped, it is implicitly rolled
/// back.
///
/// The transaction holds a mutable borrow on the layer it was created from, so during the
/// lifetime of the transaction you access the layer by dereferencing the `Transaction`.
#[derive(Debug)]
pub struct Transaction<'a, L: LayerAccess> {
    layer: &'a mut L,
    rollback_on_drop: bool,
}

impl<'a, L: LayerAccess> Transaction<'a, L> {
    pub(crate) fn new(layer: &'a mut L) -> Result<Self> {
        layer.start_transaction()?;
        Ok(Transaction {
            layer,
            rollback_on_drop: true,
        })
    }

    /// Commits this transaction.
    pub fn commit(mut self) -> Result<()> {
        self.rollback_on_drop = false;
        self.layer.commit_transaction()
    }

    /// Rolls back the layer to its state before the start of this transaction.
    pub fn rollback(mut self) -> Result<()> {
        self.rollback_on_drop = false;
        self.layer.rollback_transaction()
    }
}

impl<L: LayerAccess> Deref for Transaction<'_, L> {
    type Target = L;

    fn deref(&self) -> &Self::Target {
        self.layer
    }
}

impl<L: LayerAccess> DerefMut for Transaction<'_, L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.layer
    }
}

impl<L: LayerAccess> Drop for Transaction<'_, L> {
    fn drop(&mut self) {
        if self.rollback_on_drop {
            if let Err(e) = self.layer.rollback_transaction() {
                tracing::debug!("Implicit rollback failed: {e}");
            }
        }
    }
}
