//! Cells
//!
//! A Cell is single-slot reactive storage for values that property
//! interception cannot reach (primitives in particular). It comes in three
//! internal shapes behind one public type:
//!
//! - a **slot** cell owns one storage slot with its own fixed dependency
//!   key (the `box` operation),
//! - a **field** cell projects one record field, passing reads and writes
//!   through to the source record,
//! - a **derived** cell memoizes a getter (see `derived.rs`).
//!
//! Slot writes trigger unconditionally: unlike ordinary wrapper writes
//! there is no change-comparison short-circuit, so hosts can use a cell as
//! an event-ish signal as well as state.

use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use tracing::warn;

use crate::error::ReactiveError;
use crate::observe::{Handle, Key};
use crate::value::{Structured, TargetId, Value};

use super::derived::DerivedState;
use super::graph::{ChangeKind, DepKey};
use super::runtime::Runtime;

pub(crate) struct CellInner {
    pub(crate) id: TargetId,
    pub(crate) runtime: Runtime,
    pub(crate) kind: CellKind,
}

pub(crate) enum CellKind {
    Slot(RwLock<Value>),
    Field { source: Handle, key: Key },
    Derived(DerivedState),
}

/// Single-slot reactive storage. Cloning shares the slot.
#[derive(Clone)]
pub struct Cell(pub(crate) Arc<CellInner>);

impl Cell {
    pub fn id(&self) -> TargetId {
        self.0.id
    }

    /// Read the cell, recording a dependency for the active computation.
    ///
    /// Reading never auto-unwraps a nested cell; auto-unwrap happens only
    /// when a cell is read through a containing wrapper.
    pub fn get(&self) -> Value {
        match &self.0.kind {
            CellKind::Slot(slot) => {
                self.0.runtime.track(self.0.id, DepKey::CellValue);
                slot.read().expect("cell slot lock poisoned").clone()
            }
            CellKind::Field { source, key } => source.get(key.clone()),
            CellKind::Derived(state) => state.read(self.0.id, &self.0.runtime, true),
        }
    }

    /// Read the cell without recording a dependency.
    pub fn get_untracked(&self) -> Value {
        match &self.0.kind {
            CellKind::Slot(slot) => slot.read().expect("cell slot lock poisoned").clone(),
            CellKind::Field { source, key } => match source.raw_get(key) {
                Some(Value::Cell(cell)) => cell.get_untracked(),
                Some(value) => value,
                None => Value::Null,
            },
            CellKind::Derived(state) => state.read(self.0.id, &self.0.runtime, false),
        }
    }

    /// Write the cell.
    ///
    /// Slot cells deep-wrap structured values before storing and always
    /// notify subscribers. Field cells pass the write through to their
    /// source record. Writing a derived cell without a setter is the
    /// [`ReactiveError::MissingSetter`] hard error.
    pub fn set(&self, value: Value) -> Result<(), ReactiveError> {
        match &self.0.kind {
            CellKind::Slot(slot) => {
                let stored = self.0.runtime.deep_wrap(value);
                *slot.write().expect("cell slot lock poisoned") = stored;
                self.0
                    .runtime
                    .trigger(self.0.id, DepKey::CellValue, ChangeKind::Set);
                Ok(())
            }
            CellKind::Field { source, key } => source.set(key.clone(), value).map(|_| ()),
            CellKind::Derived(state) => state.write(value),
        }
    }

    /// Read-modify-write convenience over `get_untracked` + `set`.
    pub fn update<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.get_untracked());
        self.set(next)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.kind {
            CellKind::Slot(_) => "slot",
            CellKind::Field { .. } => "field",
            CellKind::Derived(_) => "derived",
        };
        write!(f, "cell#{}({})", self.0.id.raw(), kind)
    }
}

impl Runtime {
    /// Box a value into a slot cell.
    ///
    /// Boxing an existing cell returns it unchanged; cells never nest by
    /// construction. A structured value is wrapped via the identity
    /// registry before being stored.
    pub fn cell(&self, value: Value) -> Cell {
        if let Value::Cell(cell) = value {
            return cell;
        }
        let stored = self.deep_wrap(value);
        Cell(Arc::new(CellInner {
            id: TargetId::new(),
            runtime: self.clone(),
            kind: CellKind::Slot(RwLock::new(stored)),
        }))
    }

    /// Wrap structured values, pass everything else through untouched.
    pub(crate) fn deep_wrap(&self, value: Value) -> Value {
        if value.is_structured() {
            self.wrap(value)
        } else {
            value
        }
    }
}

/// Whether a value is a cell of any shape.
pub fn is_cell(value: &Value) -> bool {
    matches!(value, Value::Cell(_))
}

/// Project every field of a wrapped record into its own cell.
///
/// Each field cell reads and writes through the source record, so a
/// computation reading a field cell re-runs when the source field changes,
/// and writing a field cell mutates the source.
pub fn cells_from_record(handle: &Handle) -> IndexMap<Arc<str>, Cell> {
    let Structured::Record(record) = handle.target() else {
        warn!("cells_from_record expects a record handle, got {:?}", handle);
        return IndexMap::new();
    };

    record
        .keys()
        .into_iter()
        .map(|name| {
            let cell = Cell(Arc::new(CellInner {
                id: TargetId::new(),
                runtime: handle.0.runtime.clone(),
                kind: CellKind::Field {
                    source: handle.clone(),
                    key: Key::Prop(Arc::clone(&name)),
                },
            }));
            (name, cell)
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ComputationOptions;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn cell_get_and_set() {
        let runtime = Runtime::new();
        let cell = runtime.cell(Value::number(1.0));

        assert_eq!(cell.get(), Value::number(1.0));
        cell.set(Value::number(2.0)).expect("slot write");
        assert_eq!(cell.get(), Value::number(2.0));
    }

    #[test]
    fn boxing_a_cell_does_not_nest() {
        let runtime = Runtime::new();
        let cell = runtime.cell(Value::number(1.0));
        let rebox = runtime.cell(Value::Cell(cell.clone()));

        assert_eq!(rebox.id(), cell.id());
        assert_eq!(rebox.get(), Value::number(1.0));
    }

    #[test]
    fn structured_values_are_wrapped_on_store() {
        let runtime = Runtime::new();
        let cell = runtime.cell(Value::record([("x", Value::number(1.0))]));

        let stored = cell.get();
        assert!(matches!(stored, Value::Handle(_)));

        cell.set(Value::list([Value::number(1.0)])).expect("slot write");
        assert!(matches!(cell.get(), Value::Handle(_)));
    }

    #[test]
    fn computations_rerun_on_cell_writes() {
        let runtime = Runtime::new();
        let cell = runtime.cell(Value::number(0.0));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let cell_clone = cell.clone();
        let _computation = runtime.create_computation(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                cell_clone.get()
            },
            ComputationOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        cell.set(Value::number(1.0)).expect("slot write");
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // No change-comparison short-circuit: an equal write still fires.
        cell.set(Value::number(1.0)).expect("slot write");
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn untracked_reads_record_nothing() {
        let runtime = Runtime::new();
        let cell = runtime.cell(Value::number(0.0));

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let cell_clone = cell.clone();
        let _computation = runtime.create_computation(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                cell_clone.get_untracked()
            },
            ComputationOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        cell.set(Value::number(1.0)).expect("slot write");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_reads_then_writes() {
        let runtime = Runtime::new();
        let cell = runtime.cell(Value::number(10.0));

        cell.update(|value| Value::number(value.as_number().unwrap_or(0.0) + 5.0))
            .expect("slot write");
        assert_eq!(cell.get(), Value::number(15.0));
    }

    #[test]
    fn field_cells_pass_reads_and_writes_through() {
        let runtime = Runtime::new();
        let source = runtime.wrap(Value::record([
            ("x", Value::number(1.0)),
            ("y", Value::number(2.0)),
        ]));
        let source = source.as_handle().expect("wrapped");
        let fields = cells_from_record(source);

        assert_eq!(fields.len(), 2);
        assert_eq!(fields["x"].get(), Value::number(1.0));

        source.set("x", Value::number(5.0)).expect("write");
        assert_eq!(fields["x"].get(), Value::number(5.0));

        fields["y"].set(Value::number(9.0)).expect("field write");
        assert_eq!(source.get("y"), Value::number(9.0));
    }

    #[test]
    fn field_cells_track_the_source_field() {
        let runtime = Runtime::new();
        let source = runtime.wrap(Value::record([("x", Value::number(1.0))]));
        let source = source.as_handle().expect("wrapped");
        let fields = cells_from_record(source);

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let x = fields["x"].clone();
        let _computation = runtime.create_computation(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                x.get()
            },
            ComputationOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        source.set("x", Value::number(2.0)).expect("write");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cells_from_record_rejects_non_records() {
        let runtime = Runtime::new();
        let value = runtime.wrap(Value::list([Value::number(1.0)]));
        let handle = value.as_handle().expect("wrapped");

        assert!(cells_from_record(handle).is_empty());
    }
}
